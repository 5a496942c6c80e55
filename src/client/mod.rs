//! Client side of the session: holds the bearer token, persists it, and
//! attaches it to every call against the protected endpoints.

pub mod api;
pub mod session;

pub use api::{ApiClient, ClientError, SourceMetadata};
pub use session::{FileTokenStore, MemoryTokenStore, SessionHolder, TokenStore, View};
