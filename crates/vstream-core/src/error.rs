//! Tagged error taxonomy shared by every node and the pipeline controller.
//!
//! Hot paths never throw: every fallible call in the graph returns
//! `EngineResult<T>`. A variant is logged once, at the point it is produced,
//! via the `log` facade — the engine never installs a logging backend
//! itself, that is left to the embedding application.

use std::sync::Arc;

use thiserror::Error;

/// Type-erased wrapper around a real underlying error, so `EngineError`'s
/// `#[source]`-carrying variants can stay `Clone` (needed for `VideoFrame`/
/// `AudioFrame`, which embed an `EngineError` and are cloned throughout the
/// frame cache and clip provider) without boxing into a non-`Clone` trait
/// object.
#[derive(Clone)]
pub struct ErrorSource(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl ErrorSource {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ErrorSource(Arc::new(err))
    }
}

impl std::fmt::Debug for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorSource {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String, #[source] Option<ErrorSource>),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("device error: {0}")]
    DeviceError(String, #[source] Option<ErrorSource>),

    #[error("decoder error: {0}")]
    DecoderError(String, #[source] Option<ErrorSource>),

    #[error("codec not found: {0}")]
    CodecNotFound(String),

    #[error("end of file")]
    EndOfFile,

    #[error("timeout")]
    Timeout,

    #[error("not initialized: {0}")]
    NotInitialized(String),

    #[error("pin terminated")]
    PinTerminated,

    #[error("invalid timeline edit: {0}")]
    InvalidTimelineEdit(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Log this error at the appropriate level and return it unchanged, so
    /// call sites can write `return Err(err.logged())`.
    pub fn logged(self) -> Self {
        match &self {
            EngineError::PinTerminated | EngineError::EndOfFile | EngineError::Timeout => {
                log::debug!("{self}");
            }
            _ => log::warn!("{self}"),
        }
        self
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into(), None)
    }

    pub fn not_found_with_source(msg: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::NotFound(msg.into(), Some(ErrorSource::new(source)))
    }

    pub fn device_error(msg: impl Into<String>) -> Self {
        EngineError::DeviceError(msg.into(), None)
    }

    pub fn device_error_with_source(msg: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::DeviceError(msg.into(), Some(ErrorSource::new(source)))
    }

    pub fn decoder_error(msg: impl Into<String>) -> Self {
        EngineError::DecoderError(msg.into(), None)
    }

    pub fn decoder_error_with_source(msg: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::DecoderError(msg.into(), Some(ErrorSource::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_carry_payload() {
        let e = EngineError::not_found("clip abc");
        assert_eq!(e.to_string(), "not found: clip abc");
    }

    #[test]
    fn logged_returns_self() {
        let e = EngineError::Timeout;
        assert!(matches!(e.logged(), EngineError::Timeout));
    }
}
