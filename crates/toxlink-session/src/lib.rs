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

//! Session registry and operation surface for the toxlink bridge.
//!
//! A [`Registry`] owns every live engine behind a generation-tagged
//! [`Handle`](toxlink_core::Handle). The [`Bridge`] resolves handles, runs
//! operations under the session's lock, translates engine results, and turns
//! engine notifications into drained [`EventBatch`](toxlink_events::EventBatch)es.

mod adapter;
/// Caller-facing operations.
pub mod bridge;
mod convert;
/// Owning session handle.
pub mod guard;
/// Process-scoped session table.
pub mod registry;
/// Per-session state and operation context.
pub mod session;
/// In-memory engine for tests and simulation.
pub mod sim;
/// Legacy file transfer bookkeeping.
pub mod transfer;

pub use bridge::Bridge;
pub use guard::SessionGuard;
pub use registry::Registry;
pub use session::{LifecycleState, SessionContext};
pub use sim::{EngineProbe, SentChunk, SentLegacyControl, SimulatedEngine, SimulatedFactory};
pub use transfer::{FileTransfer, TransferState, TransferTable};
