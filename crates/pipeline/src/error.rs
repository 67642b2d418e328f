//! The error half of the pipeline outcome model.
//!
//! Every failure that leaves the pipeline is an [`Error`] carrying a
//! [`Metadata`](crate::metadata::Metadata) bag. Filters that learn something
//! while an error bubbles through them attach it with
//! [`Error::with_metadata`]; wrapping an existing [`Error`] merges the bags
//! (new entries win) instead of nesting, so the innermost failure keeps its
//! identity while metadata accumulates outward.

use std::fmt;

use thiserror::Error as ThisError;

use crate::cancel::CancelReason;
use crate::metadata::Metadata;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The distinguished cancellation failure, surfaced whenever an operation
/// stops because a [`CancelToken`](crate::cancel::CancelToken) fired.
#[derive(Debug, ThisError)]
#[error("cancelled: {reason}")]
pub struct Cancelled {
    pub reason: CancelReason,
}

/// A pipeline failure: the innermost cause plus accumulated metadata.
#[derive(Debug)]
pub struct Error {
    message: String,
    cause: Option<BoxError>,
    metadata: Metadata,
}

impl Error {
    /// Wraps `cause` with `metadata`.
    ///
    /// When `cause` is already a pipeline [`Error`] its identity (message and
    /// inner cause) is preserved and the bags are merged, `metadata` winning
    /// on collisions.
    pub fn new(cause: impl Into<BoxError>, metadata: Metadata) -> Self {
        let cause: BoxError = cause.into();
        match cause.downcast::<Error>() {
            Ok(existing) => {
                let mut error = *existing;
                error.metadata = error.metadata.merge(&metadata);
                error
            }
            Err(cause) => Self { message: cause.to_string(), cause: Some(cause), metadata },
        }
    }

    /// A failure with a message but no underlying cause.
    pub fn message(message: impl Into<String>, metadata: Metadata) -> Self {
        Self { message: message.into(), cause: None, metadata }
    }

    /// Wraps a cancellation into an [`Error`].
    pub fn cancelled(reason: CancelReason, metadata: Metadata) -> Self {
        Self::new(Cancelled { reason }, metadata)
    }

    /// The rethrow path: merges `extra` into this error's bag, `extra`
    /// winning on collisions.
    #[must_use]
    pub fn with_metadata(mut self, extra: Metadata) -> Self {
        self.metadata = self.metadata.merge(&extra);
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// The cancellation reason, when this failure's cause is a [`Cancelled`].
    pub fn cancel_reason(&self) -> Option<&CancelReason> {
        self.cause.as_ref()?.downcast_ref::<Cancelled>().map(|cancelled| &cancelled.reason)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
