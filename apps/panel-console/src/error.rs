use panel_stream::{ResolveError, SessionError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("no access token; pass --token, set PANEL_TOKEN or write it to {0}")]
    MissingToken(String),
    #[error("site listing failed: {0}")]
    Sites(String),
    #[error("no sites found; create a site before tailing its logs")]
    NoSites,
    #[error("logging initialization failed: {0}")]
    Logging(String),
}
