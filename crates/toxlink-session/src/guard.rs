//! Owning session handle that always reaches finalize.

use std::sync::Arc;

use toxlink_core::{BridgeError, Handle};
use tracing::warn;

use crate::registry::Registry;
use crate::session::LifecycleState;

/// Handle that kills and finalizes its session when dropped.
pub struct SessionGuard {
    registry: Arc<Registry>,
    handle: Handle,
}

impl SessionGuard {
    /// Take ownership of `handle`.
    #[must_use]
    pub const fn new(registry: Arc<Registry>, handle: Handle) -> Self {
        Self { registry, handle }
    }

    /// Guarded handle.
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.handle
    }

    /// Registry owning the session.
    #[must_use]
    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Kill and finalize now, reporting failures instead of logging them.
    ///
    /// # Errors
    ///
    /// Returns the first kill or finalize failure.
    pub fn close(self) -> Result<(), BridgeError> {
        if self.registry.state(self.handle) == Some(LifecycleState::Active) {
            self.registry.kill(self.handle)?;
        }
        self.registry.finalize(self.handle)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.registry.state(self.handle) == Some(LifecycleState::Active)
            && let Err(err) = self.registry.kill(self.handle)
        {
            warn!(handle = %self.handle, error = %err, "failed to kill guarded session");
        }
        if let Err(err) = self.registry.finalize(self.handle) {
            warn!(handle = %self.handle, error = %err, "failed to finalize guarded session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedEngine;
    use toxlink_core::engine::AddressingScheme;

    #[test]
    fn drop_reclaims_session() -> anyhow::Result<()> {
        let registry = Arc::new(Registry::default());
        let (engine, probe) = SimulatedEngine::new(AddressingScheme::Unified);
        let handle = registry.add(Box::new(engine))?;
        {
            let guard = SessionGuard::new(Arc::clone(&registry), handle);
            assert_eq!(guard.handle(), handle);
        }
        assert!(probe.released());
        assert_eq!(registry.state(handle), Some(LifecycleState::Finalized));
        Ok(())
    }

    #[test]
    fn close_then_drop_is_quiet() -> anyhow::Result<()> {
        let registry = Arc::new(Registry::default());
        let (engine, _probe) = SimulatedEngine::new(AddressingScheme::Legacy);
        let handle = registry.add(Box::new(engine))?;
        SessionGuard::new(Arc::clone(&registry), handle).close()?;
        assert_eq!(registry.live_sessions(), 0);
        Ok(())
    }
}
