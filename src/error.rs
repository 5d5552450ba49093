//! Typed pipeline failures.
//!
//! Every fallible operation in the crate returns `anyhow::Result`. When a
//! failure needs to be classified (fatal vs. per-frame, exit status), the root
//! cause is a `PipelineError` and can be recovered with
//! `err.downcast_ref::<PipelineError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The video source could not be opened at all. Aborts the whole pipeline.
    #[error("video source '{path}' is unavailable: {reason}")]
    SourceUnavailable { path: String, reason: String },

    /// A single frame could not be decoded. Sampling stops early; detection skips it.
    #[error("frame {index} could not be decoded: {reason}")]
    DecodeFailure { index: u64, reason: String },

    /// Rejected before any frame is read or written.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The artifact store could not be created or written.
    #[error("artifact store {} is unavailable: {reason}", path.display())]
    StorageUnavailable { path: PathBuf, reason: String },

    /// The background model was fed frames out of capture order.
    #[error("frame {index} is out of order (last processed frame was {last})")]
    OutOfOrder { index: u64, last: u64 },
}

impl PipelineError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// Fatal errors abort the current phase; the rest are recovered per frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DecodeFailure { .. })
    }
}

/// Find the `PipelineError` at the root of an `anyhow` chain, if any.
pub fn classify(err: &anyhow::Error) -> Option<&PipelineError> {
    err.chain().find_map(|cause| cause.downcast_ref::<PipelineError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn decode_failures_are_recoverable() {
        let err = PipelineError::DecodeFailure {
            index: 7,
            reason: "truncated".into(),
        };
        assert!(!err.is_fatal());
        assert!(PipelineError::invalid("interval must be > 0").is_fatal());
    }

    #[test]
    fn classify_finds_root_cause_under_context() {
        let err = Err::<(), _>(PipelineError::invalid("fps is zero"))
            .context("sampling frames")
            .unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::InvalidConfiguration(_))
        ));
    }
}
