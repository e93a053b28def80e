//! Process-scoped table of live sessions.
//!
//! # Design
//! - Slots are reused through a free list; every reuse bumps the slot's
//!   generation so a stale handle can never reach the new occupant.
//! - The registry mutex guards only the slot table. It is released before any
//!   session lock is taken, so distinct sessions never contend and no engine
//!   call runs under it.
//! - Destruction is two-phase: `kill` releases the engine, `finalize` reclaims
//!   the slot. Shutdown and `Drop` run both for every remaining session.
//! - A slot whose generation reaches `u32::MAX` is retired instead of reused.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use toxlink_core::engine::NativeEngine;
use toxlink_core::{BridgeError, ContractViolation, Handle, RegistryConfig};
use toxlink_events::EventBatch;
use tracing::{debug, error, info, warn};

use crate::session::{LifecycleState, Session, SessionContext};

struct Occupant {
    state: LifecycleState,
    session: Arc<Session>,
}

struct Slot {
    generation: u32,
    occupant: Option<Occupant>,
    retired: bool,
}

#[derive(Default)]
struct Slots {
    entries: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Slots {
    fn slot(&self, handle: Handle) -> Option<&Slot> {
        self.entries.get(usize::try_from(handle.slot()).ok()?)
    }

    fn occupant(&self, handle: Handle) -> Option<&Occupant> {
        self.slot(handle)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.occupant.as_ref())
    }

    fn occupant_mut(&mut self, handle: Handle) -> Option<&mut Occupant> {
        let index = usize::try_from(handle.slot()).ok()?;
        self.entries
            .get_mut(index)
            .filter(|slot| slot.generation == handle.generation())
            .and_then(|slot| slot.occupant.as_mut())
    }

    fn was_issued(&self, handle: Handle) -> bool {
        self.slot(handle).is_some_and(|slot| {
            handle.generation() < slot.generation
                || (slot.retired && handle.generation() == slot.generation)
        })
    }

    /// Empty the handle's slot and make it reusable under the next
    /// generation. Returns whether the handle still owned the slot.
    fn vacate(&mut self, handle: Handle) -> bool {
        let index = handle.slot();
        let Some(slot) = usize::try_from(index)
            .ok()
            .and_then(|position| self.entries.get_mut(position))
        else {
            return false;
        };
        if slot.generation != handle.generation() || slot.occupant.take().is_none() {
            return false;
        }
        self.live -= 1;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.push(index);
            }
            None => {
                slot.retired = true;
                debug!(handle = %handle, "slot generations exhausted; retiring slot");
            }
        }
        true
    }
}

/// Owner of every session created through the bridge.
pub struct Registry {
    config: RegistryConfig,
    slots: Mutex<Slots>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Registry tuning in effect.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slots>, BridgeError> {
        self.slots
            .lock()
            .map_err(|_| BridgeError::LockPoisoned { scope: "registry" })
    }

    fn lock_for_query(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a freshly created engine and return its handle.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CapacityExhausted`] when every permitted slot is
    /// live, or [`BridgeError::LockPoisoned`].
    pub fn add(&self, engine: Box<dyn NativeEngine>) -> Result<Handle, BridgeError> {
        let limit = self.config.max_sessions;
        let (handle, session) = {
            let mut slots = self.lock()?;
            if slots.live >= limit {
                warn!(limit, "session capacity exhausted");
                return Err(BridgeError::CapacityExhausted { limit });
            }
            let index = match slots.free.pop() {
                Some(index) => index,
                None => {
                    let index = u32::try_from(slots.entries.len())
                        .map_err(|_| BridgeError::CapacityExhausted { limit })?;
                    slots.entries.push(Slot {
                        generation: 1,
                        occupant: None,
                        retired: false,
                    });
                    index
                }
            };
            let Some(slot) = slots.entries.get_mut(index as usize) else {
                return Err(BridgeError::CapacityExhausted { limit });
            };
            let handle = Handle::new(index, slot.generation);
            let session = Arc::new(Session::new(
                handle,
                engine,
                self.config.accumulator_warn_threshold,
            ));
            slot.occupant = Some(Occupant {
                state: LifecycleState::Created,
                session: Arc::clone(&session),
            });
            slots.live += 1;
            (handle, session)
        };
        debug!(handle = %handle, "session created");

        if let Err(err) = session.register_all() {
            self.abandon(handle, &session);
            return Err(err);
        }

        let mut slots = self.lock()?;
        if let Some(occupant) = slots.occupant_mut(handle)
            && occupant.state == LifecycleState::Created
        {
            occupant.state = LifecycleState::Active;
        }
        drop(slots);
        debug!(handle = %handle, "session active");
        Ok(handle)
    }

    fn abandon(&self, handle: Handle, session: &Session) {
        if let Err(err) = session.release() {
            warn!(handle = %handle, error = %err, "failed to release abandoned session");
        }
        let vacated = self.lock_for_query().vacate(handle);
        warn!(handle = %handle, vacated, "discarded session that failed to register");
    }

    fn active_session(&self, handle: Handle) -> Result<Arc<Session>, BridgeError> {
        let slots = self.lock()?;
        slots
            .occupant(handle)
            .filter(|occupant| occupant.state == LifecycleState::Active)
            .map(|occupant| Arc::clone(&occupant.session))
            .ok_or(BridgeError::InstanceNotFound { handle })
    }

    /// Run `op` with exclusive access to an active session.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InstanceNotFound`] for absent, stale, killed, or
    /// finalized handles, [`BridgeError::SessionPoisoned`] after a contract
    /// violation, and whatever `op` returns.
    pub fn with_session<T, E, F>(&self, handle: Handle, op: F) -> Result<T, E>
    where
        E: From<BridgeError>,
        F: FnOnce(&mut SessionContext<'_>) -> Result<T, E>,
    {
        let session = self.active_session(handle)?;
        session.with(op)
    }

    /// Release the session's engine. The handle stays reserved until
    /// [`Registry::finalize`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InstanceNotFound`] for unknown handles and
    /// [`ContractViolation::AlreadyKilled`] when the session was already
    /// killed.
    pub fn kill(&self, handle: Handle) -> Result<(), BridgeError> {
        let session = {
            let mut slots = self.lock()?;
            let occupant = slots
                .occupant_mut(handle)
                .ok_or(BridgeError::InstanceNotFound { handle })?;
            match occupant.state {
                LifecycleState::Created | LifecycleState::Active => {
                    occupant.state = LifecycleState::Killed;
                    Arc::clone(&occupant.session)
                }
                LifecycleState::Killed => {
                    let violation = ContractViolation::AlreadyKilled { handle };
                    error!(handle = %handle, violation = ?violation, "kill on a killed session");
                    return Err(violation.into());
                }
                LifecycleState::Finalized => {
                    return Err(BridgeError::InstanceNotFound { handle });
                }
            }
        };
        let released = session.release()?;
        debug!(handle = %handle, released, "session killed");
        Ok(())
    }

    /// Reclaim a killed session's slot. Finalizing an active session kills
    /// it first; finalizing a stale handle does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InstanceNotFound`] for handles this registry
    /// never issued.
    pub fn finalize(&self, handle: Handle) -> Result<(), BridgeError> {
        let state = {
            let slots = self.lock()?;
            match slots.occupant(handle) {
                Some(occupant) => occupant.state,
                None if slots.was_issued(handle) => {
                    debug!(handle = %handle, "finalize on a finalized session");
                    return Ok(());
                }
                None => return Err(BridgeError::InstanceNotFound { handle }),
            }
        };

        if matches!(state, LifecycleState::Created | LifecycleState::Active) {
            warn!(handle = %handle, "finalizing a session that was never killed");
            self.kill(handle)?;
        }

        let mut slots = self.lock()?;
        let killed = slots
            .occupant(handle)
            .is_some_and(|occupant| occupant.state == LifecycleState::Killed);
        if !killed || !slots.vacate(handle) {
            debug!(handle = %handle, "finalize raced with another finalize");
            return Ok(());
        }
        drop(slots);
        debug!(handle = %handle, "session finalized");
        Ok(())
    }

    /// Lifecycle state of a handle: `Finalized` for a stale handle, `None`
    /// for one this registry never issued.
    #[must_use]
    pub fn state(&self, handle: Handle) -> Option<LifecycleState> {
        let slots = self.lock_for_query();
        if let Some(occupant) = slots.occupant(handle) {
            return Some(occupant.state);
        }
        slots
            .was_issued(handle)
            .then_some(LifecycleState::Finalized)
    }

    /// Number of sessions not yet finalized.
    #[must_use]
    pub fn live_sessions(&self) -> usize {
        self.lock_for_query().live
    }

    /// Take every event accumulated since the previous drain. Poisoned
    /// sessions still hand over what was appended before the violation.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InstanceNotFound`] for absent, stale, killed, or
    /// finalized handles.
    pub fn drain(&self, handle: Handle) -> Result<EventBatch, BridgeError> {
        let session = self.active_session(handle)?;
        session.drain()
    }

    /// Kill and finalize every remaining session. Returns how many were
    /// reclaimed.
    pub fn shutdown(&self) -> usize {
        let remaining: Vec<(Handle, LifecycleState)> = {
            let slots = self.lock_for_query();
            slots
                .entries
                .iter()
                .zip(0_u32..)
                .filter_map(|(slot, index)| {
                    slot.occupant
                        .as_ref()
                        .map(|occupant| (Handle::new(index, slot.generation), occupant.state))
                })
                .collect()
        };

        let mut reclaimed = 0;
        for (handle, state) in remaining {
            if state != LifecycleState::Killed
                && let Err(err) = self.kill(handle)
            {
                warn!(handle = %handle, error = %err, "failed to kill session during shutdown");
            }
            match self.finalize(handle) {
                Ok(()) => reclaimed += 1,
                Err(err) => {
                    warn!(handle = %handle, error = %err, "failed to finalize session during shutdown");
                }
            }
        }
        if reclaimed > 0 {
            info!(reclaimed, "registry shut down");
        }
        reclaimed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedEngine;
    use toxlink_core::engine::{AddressingScheme, NotificationKind};

    fn engine() -> (Box<dyn NativeEngine>, crate::sim::EngineProbe) {
        let (engine, probe) = SimulatedEngine::new(AddressingScheme::Unified);
        (Box::new(engine), probe)
    }

    #[test]
    fn add_registers_and_activates() -> anyhow::Result<()> {
        let registry = Registry::default();
        let (engine, probe) = engine();
        let handle = registry.add(engine)?;
        assert_eq!(registry.state(handle), Some(LifecycleState::Active));
        assert_eq!(probe.registered().len(), NotificationKind::ALL.len());
        assert_eq!(registry.live_sessions(), 1);
        Ok(())
    }

    #[test]
    fn kill_then_finalize_reclaims_slot() -> anyhow::Result<()> {
        let registry = Registry::default();
        let (engine, probe) = engine();
        let handle = registry.add(engine)?;

        registry.kill(handle)?;
        assert!(probe.released());
        assert_eq!(registry.state(handle), Some(LifecycleState::Killed));
        let outcome: Result<(), BridgeError> = registry.with_session(handle, |_| Ok(()));
        assert!(matches!(outcome, Err(BridgeError::InstanceNotFound { .. })));

        let again = registry.kill(handle);
        assert!(matches!(
            again.as_ref().map_err(BridgeError::contract_violation),
            Err(Some(ContractViolation::AlreadyKilled { .. }))
        ));

        registry.finalize(handle)?;
        assert_eq!(registry.state(handle), Some(LifecycleState::Finalized));
        assert_eq!(registry.live_sessions(), 0);
        registry.finalize(handle)?;
        Ok(())
    }

    #[test]
    fn reused_slot_gets_new_generation() -> anyhow::Result<()> {
        let registry = Registry::default();
        let (first, _) = engine();
        let old = registry.add(first)?;
        registry.kill(old)?;
        registry.finalize(old)?;

        let (second, _) = engine();
        let new = registry.add(second)?;
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new.into_raw(), old.into_raw());
        assert_eq!(registry.state(old), Some(LifecycleState::Finalized));
        assert!(matches!(
            registry.kill(old),
            Err(BridgeError::InstanceNotFound { .. })
        ));
        assert_eq!(registry.state(new), Some(LifecycleState::Active));
        Ok(())
    }

    #[test]
    fn finalize_active_kills_first() -> anyhow::Result<()> {
        let registry = Registry::default();
        let (engine, probe) = engine();
        let handle = registry.add(engine)?;
        registry.finalize(handle)?;
        assert!(probe.released());
        assert_eq!(registry.state(handle), Some(LifecycleState::Finalized));
        Ok(())
    }

    #[test]
    fn unknown_handles_are_rejected() {
        let registry = Registry::default();
        let handle = Handle::new(7, 1);
        assert_eq!(registry.state(handle), None);
        assert!(matches!(
            registry.finalize(handle),
            Err(BridgeError::InstanceNotFound { .. })
        ));
    }

    #[test]
    fn capacity_is_enforced() -> anyhow::Result<()> {
        let registry = Registry::new(RegistryConfig {
            max_sessions: 1,
            ..RegistryConfig::default()
        });
        let (first, _) = engine();
        let handle = registry.add(first)?;
        let (second, _) = engine();
        assert!(matches!(
            registry.add(second),
            Err(BridgeError::CapacityExhausted { limit: 1 })
        ));
        registry.finalize(handle)?;
        let (third, _) = engine();
        registry.add(third)?;
        Ok(())
    }

    #[test]
    fn abandoned_registration_frees_the_slot() -> anyhow::Result<()> {
        let registry = Registry::default();
        let (engine, probe) = engine();
        let handle = registry.add(engine)?;
        let session = registry.active_session(handle)?;

        registry.abandon(handle, &session);
        assert!(probe.released());
        assert_eq!(registry.live_sessions(), 0);
        assert_eq!(registry.state(handle), Some(LifecycleState::Finalized));

        let (next, _) = self::engine();
        let reused = registry.add(next)?;
        assert_eq!(reused.slot(), handle.slot());
        assert_ne!(reused, handle);
        Ok(())
    }

    #[test]
    fn exhausted_generation_retires_slot() -> anyhow::Result<()> {
        let registry = Registry::default();
        {
            let mut slots = registry.lock()?;
            slots.entries.push(Slot {
                generation: u32::MAX,
                occupant: None,
                retired: false,
            });
            slots.free.push(0);
        }
        let (first, _) = engine();
        let last = registry.add(first)?;
        assert_eq!(last.generation(), u32::MAX);
        registry.kill(last)?;
        registry.finalize(last)?;

        assert_eq!(registry.state(last), Some(LifecycleState::Finalized));
        registry.finalize(last)?;
        assert_eq!(registry.state(Handle::new(0, 1)), Some(LifecycleState::Finalized));

        let (second, _) = engine();
        let fresh = registry.add(second)?;
        assert_eq!(fresh.slot(), 1);
        assert_eq!(registry.live_sessions(), 1);
        Ok(())
    }

    #[test]
    fn shutdown_reclaims_everything() -> anyhow::Result<()> {
        let registry = Registry::default();
        let (first, first_probe) = engine();
        let (second, second_probe) = engine();
        registry.add(first)?;
        let killed = registry.add(second)?;
        registry.kill(killed)?;

        assert_eq!(registry.shutdown(), 2);
        assert_eq!(registry.live_sessions(), 0);
        assert!(first_probe.released());
        assert!(second_probe.released());
        Ok(())
    }
}
