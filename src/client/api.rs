use std::sync::Arc;

use reqwest::{multipart, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::session::SessionHolder;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No token is held; the request was not sent.
    #[error("not logged in")]
    NotAuthenticated,
    /// The server rejected the token; the session has been cleared.
    #[error("session expired, please log in again")]
    Unauthorized,
    #[error("request failed with {status}: {detail}")]
    Api { status: StatusCode, detail: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Session(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TokenReply {
    access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub filename: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileList {
    pub files: Vec<RemoteFile>,
    pub total_files: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Uploaded {
    pub filename: String,
    pub content_length: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: SourceMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Answer {
    pub response: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    message: &'a str,
    chat_history: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<usize>,
}

/// HTTP client for the chat backend. Every protected call carries the
/// session's bearer token; a 401 logs the session out.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    session: Arc<SessionHolder>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Arc<SessionHolder>) -> anyhow::Result<Self> {
        Ok(Self {
            base: Url::parse(base_url)?,
            http: reqwest::Client::new(),
            session,
        })
    }

    pub fn session(&self) -> &SessionHolder {
        &self.session
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<(), ClientError> {
        let req = self.http.post(self.url(&["register"])?).json(&Credentials {
            email,
            password,
            full_name,
        });
        self.authenticate(req).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<(), ClientError> {
        let req = self.http.post(self.url(&["login"])?).json(&Credentials {
            email,
            password,
            full_name: None,
        });
        self.authenticate(req).await
    }

    /// Client-side only: tokens are stateless, so the server is not told.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.clear().await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<Profile, ClientError> {
        let res = self.send_authed(self.http.get(self.url(&["me"])?)).await?;
        Ok(res.json().await?)
    }

    pub async fn list_files(&self) -> Result<FileList, ClientError> {
        let res = self.send_authed(self.http.get(self.url(&["files"])?)).await?;
        Ok(res.json().await?)
    }

    pub async fn delete_file(&self, name: &str) -> Result<(), ClientError> {
        self.send_authed(self.http.delete(self.url(&["files", name])?))
            .await?;
        Ok(())
    }

    pub async fn upload(&self, filename: &str, body: Vec<u8>) -> Result<Uploaded, ClientError> {
        let part = multipart::Part::bytes(body).file_name(filename.to_string());
        let form = multipart::Form::new().part("file", part);
        let res = self
            .send_authed(self.http.post(self.url(&["upload"])?).multipart(form))
            .await?;
        Ok(res.json().await?)
    }

    pub async fn query(&self, query: &str, top_k: Option<usize>) -> Result<Answer, ClientError> {
        let mut req = self.http.get(self.url(&["query"])?).query(&[("query", query)]);
        if let Some(k) = top_k {
            req = req.query(&[("top_k", k)]);
        }
        let res = self.send_authed(req).await?;
        Ok(res.json().await?)
    }

    pub async fn chat(
        &self,
        message: &str,
        history: &[Turn],
        top_k: Option<usize>,
    ) -> Result<Answer, ClientError> {
        let req = self.http.post(self.url(&["chat"])?).json(&ChatBody {
            message,
            chat_history: history,
            top_k,
        });
        let res = self.send_authed(req).await?;
        Ok(res.json().await?)
    }

    async fn authenticate(&self, req: RequestBuilder) -> Result<(), ClientError> {
        let res = check(req.send().await?).await?;
        let reply: TokenReply = res.json().await?;
        self.session.establish(reply.access_token).await?;
        Ok(())
    }

    async fn send_authed(&self, req: RequestBuilder) -> Result<Response, ClientError> {
        let token = self
            .session
            .token()
            .await
            .ok_or(ClientError::NotAuthenticated)?;
        let res = req.bearer_auth(&token).send().await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            // A newer login may have replaced the token while this was in flight.
            match self.session.clear_if(&token).await {
                Ok(true) => warn!("token rejected by server, logged out"),
                Ok(false) => debug!("rejected token already replaced"),
                Err(e) => warn!(error = %e, "logged out but token store not updated"),
            }
            return Err(ClientError::Unauthorized);
        }
        check(res).await
    }
}

async fn check(res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let detail = match res.json::<Value>().await {
        Ok(body) => body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => "request failed".to_string(),
    };
    debug!(%status, %detail, "api error");
    Err(ClientError::Api { status, detail })
}
