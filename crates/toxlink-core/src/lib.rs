#![deny(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Engine-agnostic contracts for the toxlink bridge: the native engine
//! boundary, session handles, option validation, and the error taxonomy every
//! operation reports through.

/// Native engine, sink, and factory traits.
pub mod engine;
/// Bridge, contract, and option errors.
pub mod error;
/// Session handles.
pub mod handle;
/// Per-operation error kinds.
pub mod kinds;
/// Engine options and registry configuration.
pub mod options;

pub use engine::{
    ADDRESS_SIZE, AddressingScheme, EngineFactory, NativeEngine, NativeSink, NotificationKind,
};
pub use error::{BridgeError, CallError, ContractViolation, OptionsError};
pub use handle::Handle;
pub use kinds::{
    BootstrapError, ErrorKind, FileControlError, FileSendChunkError, FileSendError, FriendAddError,
    FriendByPublicKeyError, FriendCustomPacketError, FriendDeleteError, FriendGetPublicKeyError,
    FriendSendMessageError, GetPortError, GroupLeaveError, GroupSendMessageError,
    GroupStateQueriesError, GroupTopicSetError, NewError, SetInfoError, SetTypingError,
};
pub use options::{
    EngineOptions, NativeOptions, NativeOptionsPlan, ProxyOptions, ProxyType, RegistryConfig,
    SaveData,
};
