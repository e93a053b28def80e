//! Error types shared by every bridge operation.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

use thiserror::Error;
use toxlink_events::{EventEncodeError, FileId};

use crate::handle::Handle;

/// Mismatch between the bridge and the engine. Always fatal for the session
/// it occurred on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// The engine supplied an enumeration value outside the known table.
    #[error("native enum value outside the known table")]
    UnknownEnumValue {
        /// Enumeration being translated.
        kind: &'static str,
        /// Raw value received.
        value: u32,
    },
    /// The engine returned an error code the operation does not document.
    #[error("native error code outside the operation's catalogue")]
    UnexpectedErrorCode {
        /// Operation that produced the code.
        operation: &'static str,
        /// Raw code received.
        code: u32,
    },
    /// Kill was requested for a session that is already killed.
    #[error("session already killed")]
    AlreadyKilled {
        /// Session handle.
        handle: Handle,
    },
    /// A file notification referenced a transfer with no table entry.
    #[error("file notification for an unknown transfer")]
    MissingTransfer {
        /// Friend owning the transfer.
        friend_number: u32,
        /// Unified transfer identifier.
        file_number: FileId,
    },
    /// A transfer was created for a key that is still live.
    #[error("file transfer already exists")]
    DuplicateTransfer {
        /// Friend owning the transfer.
        friend_number: u32,
        /// Unified transfer identifier.
        file_number: FileId,
    },
    /// Incoming data would move a transfer past its declared size.
    #[error("file data past the end of the transfer")]
    TransferOverrun {
        /// Friend owning the transfer.
        friend_number: u32,
        /// Unified transfer identifier.
        file_number: FileId,
        /// Position before the chunk.
        position: u64,
        /// Length of the chunk.
        length: u64,
        /// Declared size of the transfer.
        size: u64,
    },
    /// A file notification used the other addressing scheme than the engine
    /// declared.
    #[error("file notification does not match the engine's addressing")]
    AddressingMismatch {
        /// Notification that arrived.
        notification: &'static str,
    },
    /// A legacy engine returned a file number that does not fit 8 bits.
    #[error("legacy file index out of range")]
    LegacyIndexOutOfRange {
        /// Raw number returned by the engine.
        value: u32,
    },
}

/// Validation failure for caller supplied engine options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// A field holds a value the engine cannot accept.
    #[error("invalid engine option")]
    InvalidField {
        /// Offending field.
        field: &'static str,
        /// Constraint that was violated.
        reason: &'static str,
    },
}

/// Failures raised by the registry and the bridge around an engine call.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The handle is absent, stale, killed, or finalized.
    #[error("instance not found")]
    InstanceNotFound {
        /// Handle supplied by the caller.
        handle: Handle,
    },
    /// An earlier contract violation disabled the session.
    #[error("session poisoned by an earlier contract violation")]
    SessionPoisoned {
        /// Handle supplied by the caller.
        handle: Handle,
    },
    /// Every registry slot is occupied.
    #[error("session capacity exhausted")]
    CapacityExhausted {
        /// Configured maximum.
        limit: usize,
    },
    /// A lock was poisoned by a panic on another thread.
    #[error("lock poisoned")]
    LockPoisoned {
        /// Which lock.
        scope: &'static str,
    },
    /// Options were rejected before reaching the engine.
    #[error("invalid engine options")]
    InvalidOptions {
        /// Validation failure.
        #[from]
        source: OptionsError,
    },
    /// The bridge and the engine disagree.
    #[error("engine contract violated")]
    Contract {
        /// Violation detail.
        #[from]
        source: ContractViolation,
    },
    /// A drained batch could not be encoded.
    #[error("failed to encode drained events")]
    Encode {
        /// Encoding failure.
        #[from]
        source: EventEncodeError,
    },
}

impl BridgeError {
    /// Contract violation wrapped by this error, if any.
    #[must_use]
    pub const fn contract_violation(&self) -> Option<&ContractViolation> {
        match self {
            Self::Contract { source } => Some(source),
            _ => None,
        }
    }
}

/// Outcome of a failed operation: either the bridge refused or failed around
/// the call, or the engine reported one of the operation's documented kinds.
#[derive(Debug)]
pub enum CallError<E> {
    /// Registry or contract failure.
    Bridge(BridgeError),
    /// Operation-level engine error.
    Failed(E),
}

impl<E> CallError<E> {
    /// Documented error kind, when the engine reported one.
    #[must_use]
    pub const fn kind(&self) -> Option<&E> {
        match self {
            Self::Failed(kind) => Some(kind),
            Self::Bridge(_) => None,
        }
    }

    /// Bridge error, when the call failed around the engine.
    #[must_use]
    pub const fn bridge(&self) -> Option<&BridgeError> {
        match self {
            Self::Bridge(err) => Some(err),
            Self::Failed(_) => None,
        }
    }
}

impl<E> From<BridgeError> for CallError<E> {
    fn from(err: BridgeError) -> Self {
        Self::Bridge(err)
    }
}

impl<E> From<ContractViolation> for CallError<E> {
    fn from(violation: ContractViolation) -> Self {
        Self::Bridge(BridgeError::from(violation))
    }
}

impl<E: Display> Display for CallError<E> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bridge(err) => Display::fmt(err, formatter),
            Self::Failed(kind) => write!(formatter, "operation failed: {kind}"),
        }
    }
}

impl<E> StdError for CallError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Bridge(err) => Some(err),
            Self::Failed(kind) => Some(kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Kind;

    impl Display for Kind {
        fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
            formatter.write_str("kind")
        }
    }

    impl StdError for Kind {}

    #[test]
    fn contract_violation_converts_into_call_error() {
        let err: CallError<Kind> = ContractViolation::UnknownEnumValue {
            kind: "connection_status",
            value: 9,
        }
        .into();
        let violation = err
            .bridge()
            .and_then(BridgeError::contract_violation)
            .cloned();
        assert_eq!(
            violation,
            Some(ContractViolation::UnknownEnumValue {
                kind: "connection_status",
                value: 9,
            })
        );
        assert!(err.kind().is_none());
    }

    #[test]
    fn messages_are_constant() {
        let err = BridgeError::InstanceNotFound {
            handle: Handle::new(1, 2),
        };
        assert_eq!(err.to_string(), "instance not found");
        let failed: CallError<Kind> = CallError::Failed(Kind);
        assert_eq!(failed.to_string(), "operation failed: kind");
        assert!(failed.source().is_some());
    }

    #[test]
    fn options_error_is_reachable_through_source() {
        let err = BridgeError::from(OptionsError::InvalidField {
            field: "start_port",
            reason: "out of range",
        });
        assert_eq!(err.to_string(), "invalid engine options");
        assert!(err.source().is_some());
    }
}
