use crate::auth::AuthError;
use crate::session::SessionError;
use crate::transport::ChannelError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Session(#[from] SessionError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Channel(#[from] ChannelError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("{message}; run `cove login` to sign in again")]
    LoginRequired { message: String },
    #[error("logging initialization failed: {0}")]
    Logging(String),
}
