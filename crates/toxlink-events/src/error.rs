//! Event batch error primitives.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Error emitted when a drained batch cannot be encoded.
#[derive(Debug)]
pub enum EventEncodeError {
    /// JSON serialisation of the batch failed.
    Json {
        /// Number of events in the batch being encoded.
        batch_len: usize,
        /// Underlying serde error.
        source: serde_json::Error,
    },
}

impl EventEncodeError {
    /// Number of events in the batch that failed to encode.
    #[must_use]
    pub const fn batch_len(&self) -> usize {
        match self {
            Self::Json { batch_len, .. } => *batch_len,
        }
    }
}

impl Display for EventEncodeError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("failed to encode event batch")
    }
}

impl Error for EventEncodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;

    #[test]
    fn encode_error_reports_batch_len_and_source() {
        let err = EventEncodeError::Json {
            batch_len: 3,
            source: serde_json::Error::custom("boom"),
        };
        assert_eq!(err.batch_len(), 3);
        assert_eq!(err.to_string(), "failed to encode event batch");
        assert!(err.source().is_some());
    }
}
