use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("engine gave no move within {0:?}")]
    Timeout(Duration),
    #[error("unexpected engine output {0:?}")]
    Protocol(String),
    #[error("io error")]
    Io(#[source] Arc<std::io::Error>),
    #[error("engine unexpectedly exited")]
    UnexpectedTermination,
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}
