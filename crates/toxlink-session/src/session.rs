//! Per-session state and the context handed to operations under the session
//! lock.
//!
//! # Design
//! - A session owns its engine, its event accumulator, and (for legacy
//!   addressing) its transfer table; all of it sits behind one mutex.
//! - Operations never see the mutex: they receive a [`SessionContext`] built
//!   after the lock is taken and dropped before it is released.
//! - A contract violation poisons the session. Only kill and finalize remain
//!   available afterwards.

use std::sync::{Mutex, MutexGuard};

use toxlink_core::engine::{AddressingScheme, NativeEngine, NativeSink, NotificationKind};
use toxlink_core::{BridgeError, ContractViolation, ErrorKind, FileControlError, Handle};
use toxlink_events::{EventAccumulator, EventBatch};
use tracing::{debug, error, warn};

use crate::adapter::CallbackAdapter;
use crate::transfer::TransferTable;

/// Lifecycle of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Inserted, notifications not yet registered.
    Created,
    /// Usable by every operation.
    Active,
    /// Engine released; waiting for finalize.
    Killed,
    /// Slot reclaimed; the handle is stale.
    Finalized,
}

#[derive(Debug)]
struct Backlog {
    threshold: usize,
    warned: bool,
}

struct SessionState {
    engine: Option<Box<dyn NativeEngine>>,
    events: EventAccumulator,
    transfers: Option<TransferTable>,
    poisoned: Option<ContractViolation>,
    backlog: Backlog,
}

pub(crate) struct Session {
    handle: Handle,
    state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn new(handle: Handle, engine: Box<dyn NativeEngine>, warn_threshold: usize) -> Self {
        let transfers = match engine.addressing() {
            AddressingScheme::Unified => None,
            AddressingScheme::Legacy => Some(TransferTable::new()),
        };
        Self {
            handle,
            state: Mutex::new(SessionState {
                engine: Some(engine),
                events: EventAccumulator::new(),
                transfers,
                poisoned: None,
                backlog: Backlog {
                    threshold: warn_threshold,
                    warned: false,
                },
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, BridgeError> {
        self.state
            .lock()
            .map_err(|_| BridgeError::LockPoisoned { scope: "session" })
    }

    /// Subscribe the engine to every notification kind.
    pub(crate) fn register_all(&self) -> Result<(), BridgeError> {
        let mut state = self.lock()?;
        if let Some(engine) = state.engine.as_deref_mut() {
            for kind in NotificationKind::ALL {
                engine.register(kind);
            }
        }
        Ok(())
    }

    /// Drop the engine. Returns whether an engine was still held.
    pub(crate) fn release(&self) -> Result<bool, BridgeError> {
        let mut state = self.lock()?;
        let released = state.engine.take().is_some();
        if let Some(table) = state.transfers.as_ref()
            && !table.is_empty()
        {
            debug!(
                handle = %self.handle,
                transfers = table.len(),
                "discarding live file transfers"
            );
        }
        state.transfers = None;
        Ok(released)
    }

    /// Take every pending event. Allowed on a poisoned session: events
    /// appended before the violation are still delivered.
    pub(crate) fn drain(&self) -> Result<EventBatch, BridgeError> {
        let mut state = self.lock()?;
        state.backlog.warned = false;
        let batch = state.events.drain();
        debug!(handle = %self.handle, events = batch.len(), "drained events");
        Ok(batch)
    }

    /// Run `op` under the session lock.
    pub(crate) fn with<T, E, F>(&self, op: F) -> Result<T, E>
    where
        E: From<BridgeError>,
        F: FnOnce(&mut SessionContext<'_>) -> Result<T, E>,
    {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        if state.poisoned.is_some() {
            return Err(BridgeError::SessionPoisoned {
                handle: self.handle,
            }
            .into());
        }
        let Some(engine) = state.engine.as_deref_mut() else {
            return Err(BridgeError::InstanceNotFound {
                handle: self.handle,
            }
            .into());
        };
        let mut context = SessionContext {
            handle: self.handle,
            engine,
            events: &mut state.events,
            transfers: state.transfers.as_mut(),
            poisoned: &mut state.poisoned,
            backlog: &mut state.backlog,
        };
        op(&mut context)
    }
}

/// Exclusive access to one live session, valid for the duration of a
/// registry operation.
pub struct SessionContext<'a> {
    handle: Handle,
    engine: &'a mut dyn NativeEngine,
    events: &'a mut EventAccumulator,
    transfers: Option<&'a mut TransferTable>,
    poisoned: &'a mut Option<ContractViolation>,
    backlog: &'a mut Backlog,
}

impl SessionContext<'_> {
    /// Handle of the session.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// The live engine.
    pub fn engine(&mut self) -> &mut dyn NativeEngine {
        &mut *self.engine
    }

    /// Events waiting to be drained.
    #[must_use]
    pub fn events(&self) -> &EventAccumulator {
        &*self.events
    }

    /// Transfer table; present only for engines with legacy addressing.
    pub fn transfers(&mut self) -> Option<&mut TransferTable> {
        self.transfers.as_deref_mut()
    }

    /// Whether the engine uses legacy file addressing.
    #[must_use]
    pub const fn is_legacy(&self) -> bool {
        self.transfers.is_some()
    }

    /// Take every pending event.
    pub fn drain(&mut self) -> EventBatch {
        self.backlog.warned = false;
        let batch = self.events.drain();
        debug!(handle = %self.handle, events = batch.len(), "drained events");
        batch
    }

    /// Run one engine iteration, translating every notification it fires.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Contract`] when a notification violated the
    /// engine contract; the session is poisoned.
    pub fn iterate(&mut self) -> Result<(), BridgeError> {
        let mut adapter =
            CallbackAdapter::new(self.handle, &mut *self.events, self.transfers.as_deref_mut());
        self.engine.iterate(&mut adapter);
        let outcome = adapter.finish();
        outcome.map_err(|violation| self.poison(violation))?;
        self.settle()
    }

    /// Feed notifications into the session exactly as the engine would
    /// during an iteration.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Contract`] when a notification violated the
    /// engine contract; the session is poisoned.
    pub fn dispatch<F>(&mut self, notify: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut dyn NativeSink),
    {
        let mut adapter =
            CallbackAdapter::new(self.handle, &mut *self.events, self.transfers.as_deref_mut());
        notify(&mut adapter);
        let outcome = adapter.finish();
        outcome.map_err(|violation| self.poison(violation))?;
        self.settle()
    }

    /// Record a contract violation and disable the session.
    pub fn poison(&mut self, violation: ContractViolation) -> BridgeError {
        error!(
            handle = %self.handle,
            violation = ?violation,
            "engine contract violated; session poisoned"
        );
        *self.poisoned = Some(violation.clone());
        BridgeError::from(violation)
    }

    fn settle(&mut self) -> Result<(), BridgeError> {
        let outbound = self
            .transfers
            .as_deref_mut()
            .map(TransferTable::take_outbound)
            .unwrap_or_default();
        for control in outbound {
            debug!(
                handle = %self.handle,
                friend_number = control.friend_number,
                file_id = %control.file_number,
                control = control.control,
                "sending legacy file control"
            );
            let Err(code) = self.engine.legacy_file_control(
                control.friend_number,
                control.send_receive,
                control.file_index,
                control.control,
            ) else {
                continue;
            };
            match FileControlError::from_native(code) {
                Ok(Some(kind)) => warn!(
                    handle = %self.handle,
                    friend_number = control.friend_number,
                    file_id = %control.file_number,
                    error = %kind,
                    "engine refused legacy file control"
                ),
                Ok(None) => {
                    return Err(self.poison(ContractViolation::UnexpectedErrorCode {
                        operation: FileControlError::OPERATION,
                        code,
                    }));
                }
                Err(violation) => return Err(self.poison(violation)),
            }
        }

        if let Some(table) = self.transfers.as_deref_mut() {
            for request in table.request_chunks() {
                self.events.push(request);
            }
        }

        if self.events.len() > self.backlog.threshold && !self.backlog.warned {
            self.backlog.warned = true;
            warn!(
                handle = %self.handle,
                pending = self.events.len(),
                threshold = self.backlog.threshold,
                "event backlog above threshold; drain more often"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedEngine;
    use toxlink_core::engine::legacy;
    use toxlink_events::{Event, FileDirection, FileId};

    fn session(addressing: AddressingScheme) -> (Session, crate::sim::EngineProbe) {
        let (engine, probe) = SimulatedEngine::new(addressing);
        (Session::new(Handle::new(0, 1), Box::new(engine), 16), probe)
    }

    #[test]
    fn register_all_subscribes_every_kind() -> anyhow::Result<()> {
        let (session, probe) = session(AddressingScheme::Unified);
        session.register_all()?;
        assert_eq!(probe.registered(), NotificationKind::ALL.to_vec());
        Ok(())
    }

    #[test]
    fn poisoned_session_rejects_operations() -> anyhow::Result<()> {
        let (session, _probe) = session(AddressingScheme::Unified);
        let outcome: Result<(), BridgeError> =
            session.with(|ctx| ctx.dispatch(|sink| sink.self_connection_status(9)));
        assert!(matches!(outcome, Err(BridgeError::Contract { .. })));

        let again: Result<(), BridgeError> = session.with(|_| Ok(()));
        assert!(matches!(again, Err(BridgeError::SessionPoisoned { .. })));
        assert!(session.release()?);
        Ok(())
    }

    #[test]
    fn poisoned_session_still_drains_earlier_events() -> anyhow::Result<()> {
        let (session, _probe) = session(AddressingScheme::Unified);
        let outcome: Result<(), BridgeError> = session.with(|ctx| {
            ctx.dispatch(|sink| {
                sink.friend_typing(3, true);
                sink.self_connection_status(9);
            })
        });
        assert!(outcome.is_err());

        let batch = session.drain()?;
        assert_eq!(batch.len(), 1);
        assert!(matches!(
            batch.iter().next(),
            Some(Event::FriendTyping { friend_number: 3, .. })
        ));
        assert!(session.drain()?.is_empty());
        Ok(())
    }

    #[test]
    fn released_session_is_not_found() -> anyhow::Result<()> {
        let (session, probe) = session(AddressingScheme::Unified);
        assert!(session.release()?);
        assert!(probe.released());
        assert!(!session.release()?);
        let outcome: Result<(), BridgeError> = session.with(|_| Ok(()));
        assert!(matches!(outcome, Err(BridgeError::InstanceNotFound { .. })));
        Ok(())
    }

    #[test]
    fn completed_download_sends_one_finished_control() -> anyhow::Result<()> {
        let (session, probe) = session(AddressingScheme::Legacy);
        let batch = session.with(|ctx| -> Result<EventBatch, BridgeError> {
            ctx.dispatch(|sink| {
                sink.legacy_file_send_request(1, 0, 3, b"f");
                sink.legacy_file_data(1, 0, b"abc");
            })?;
            ctx.iterate()?;
            Ok(ctx.drain())
        })?;

        assert_eq!(batch.len(), 3);
        assert!(matches!(
            batch.iter().last(),
            Some(Event::FileRecvChunk { position: 3, data, .. }) if data.is_empty()
        ));
        let controls = probe.legacy_controls();
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].control, legacy::FINISHED);
        assert_eq!(controls[0].send_receive, legacy::CONTROL_RECEIVING);
        Ok(())
    }

    #[test]
    fn running_uploads_get_chunk_requests_after_iterate() -> anyhow::Result<()> {
        let (session, _probe) = session(AddressingScheme::Legacy);
        let id = FileId::unify(FileDirection::Send, 0);
        let batch = session.with(|ctx| -> Result<EventBatch, BridgeError> {
            if let Some(table) = ctx.transfers() {
                table.local_send(2, 0, 10)?;
            }
            ctx.dispatch(|sink| sink.legacy_file_control(2, legacy::NOTIFY_SENDING, 0, legacy::ACCEPT))?;
            ctx.iterate()?;
            Ok(ctx.drain())
        })?;

        let events = batch.into_events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::FileChunkRequest {
                friend_number: 2,
                file_number: id,
                position: 0,
                length: 10,
            }
        );
        Ok(())
    }
}
