pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod state;
