//! Event model shared by the toxlink bridge.
//!
//! The engine reports everything that happens on the network through
//! synchronous callbacks fired while it is being iterated. The bridge turns each
//! callback into one [`Event`], appends it to the session's
//! [`EventAccumulator`], and hands callers an [`EventBatch`] when they drain.
//! File transfers are identified by a [`FileId`] that is stable for the whole
//! life of the transfer regardless of how the engine numbers it.

pub mod accumulator;
pub mod error;
pub mod file_id;
pub mod payloads;

pub use accumulator::{EventAccumulator, EventBatch};
pub use error::EventEncodeError;
pub use file_id::{FileDirection, FileId};
pub use payloads::{
    ConnectionStatus, Event, EventEnvelope, EventId, FileControl, GroupModEvent, JoinFail,
    MessageType, PUBLIC_KEY_SIZE, PrivacyState, PublicKey, UserStatus,
};
