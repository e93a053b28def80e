//! Unified file transfer identifiers.
//!
//! # Design
//! - Engines using legacy addressing number transfers per direction with an
//!   8-bit index, so an incoming and an outgoing transfer can share an index.
//! - The unified id folds the direction into bit 8: `(direction << 8) | index`,
//!   giving one stable identifier per transfer for the caller.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Direction of a transfer from the local node's point of view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileDirection {
    /// We are sending the file.
    Send,
    /// We are receiving the file.
    Receive,
}

impl FileDirection {
    const fn bit(self) -> u32 {
        match self {
            Self::Send => 0,
            Self::Receive => 1,
        }
    }
}

/// Caller-visible file transfer identifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct FileId(u32);

impl FileId {
    /// Wrap an identifier exactly as the engine or caller supplied it.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value handed to callers.
    #[must_use]
    pub const fn into_raw(self) -> u32 {
        self.0
    }

    /// Combine a legacy per-direction index with its direction.
    #[must_use]
    pub const fn unify(direction: FileDirection, index: u8) -> Self {
        Self((direction.bit() << 8) | index as u32)
    }

    /// Recover the legacy direction and index.
    ///
    /// Returns `None` when the id does not fit the 9-bit legacy space.
    #[must_use]
    pub const fn split(self) -> Option<(FileDirection, u8)> {
        if self.0 > 0x1ff {
            return None;
        }
        let direction = if self.0 & 0x100 == 0 {
            FileDirection::Send
        } else {
            FileDirection::Receive
        };
        #[allow(clippy::cast_possible_truncation)]
        let index = (self.0 & 0xff) as u8;
        Some((direction, index))
    }
}

impl Display for FileId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}
