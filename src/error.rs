use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::resolve::ResolveError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
