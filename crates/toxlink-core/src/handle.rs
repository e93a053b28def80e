//! Caller-visible session handles.

use std::fmt::{self, Display, Formatter};

/// Opaque session identifier handed to callers.
///
/// A handle pairs a registry slot with the generation that slot had when the
/// session was created. Reusing a slot bumps its generation, so a handle that
/// outlived its session is detected rather than resolving to a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    slot: u32,
    generation: u32,
}

impl Handle {
    /// Build a handle from its parts.
    #[must_use]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }

    /// Registry slot index.
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Generation of the slot at creation time.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Pack into the integer form handed across the runtime boundary.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn into_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.slot as u64
    }

    /// Unpack an integer previously produced by [`Handle::into_raw`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            slot: raw as u32,
            generation: (raw >> 32) as u32,
        }
    }
}

impl Display for Handle {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}@{}", self.slot, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_form_keeps_slot_and_generation() {
        let handle = Handle::new(7, 3);
        let raw = handle.into_raw();
        assert_eq!(raw, (3_u64 << 32) | 7);
        assert_eq!(Handle::from_raw(raw), handle);
    }

    #[test]
    fn generations_distinguish_reused_slots() {
        assert_ne!(
            Handle::new(0, 0).into_raw(),
            Handle::new(0, 1).into_raw()
        );
    }

    #[test]
    fn display_shows_slot_and_generation() {
        assert_eq!(Handle::new(2, 9).to_string(), "2@9");
    }
}
