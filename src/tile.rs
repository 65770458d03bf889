//! Tile-layer boundary types
//!
//! The scheduler's main consumers are tile jobs: incremental decoders keyed
//! by quadkey, fed by a transport/cache collaborator. This module carries the
//! shared key type and the transport contract; the transport implementation
//! itself lives with the collaborator.

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;
use thiserror::Error;

/// Quadkey parse errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuadkeyError {
    #[error("quadkey digit must be 0-3, got `{0}`")]
    InvalidDigit(char),
}

/// Hierarchical tile address: a base-4 digit path from the root tile.
///
/// Each digit selects a quadrant of the parent tile, so the key length is the
/// zoom level and the parent key is a prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quadkey {
    digits: SmallVec<[u8; 24]>,
}

impl Quadkey {
    /// The root tile (level 0).
    #[inline]
    pub fn root() -> Self {
        Self {
            digits: SmallVec::new(),
        }
    }

    /// Zoom level (number of digits).
    #[inline]
    pub fn level(&self) -> usize {
        self.digits.len()
    }

    /// Parent tile key, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.digits.is_empty() {
            return None;
        }
        let mut digits = self.digits.clone();
        digits.pop();
        Some(Self { digits })
    }

    /// Child tile in quadrant `quadrant` (0-3, clamped).
    pub fn child(
        &self,
        quadrant: u8,
    ) -> Self {
        let mut digits = self.digits.clone();
        digits.push(quadrant.min(3));
        Self { digits }
    }

    /// Whether `self` addresses a tile containing `other`.
    pub fn is_ancestor_of(
        &self,
        other: &Quadkey,
    ) -> bool {
        other.digits.len() > self.digits.len()
            && other.digits[..self.digits.len()] == self.digits[..]
    }
}

impl FromStr for Quadkey {
    type Err = QuadkeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digits = SmallVec::new();
        for ch in s.chars() {
            match ch {
                '0'..='3' => digits.push(ch as u8 - b'0'),
                other => return Err(QuadkeyError::InvalidDigit(other)),
            }
        }
        Ok(Self { digits })
    }
}

impl fmt::Display for Quadkey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        for digit in &self.digits {
            write!(f, "{digit}")?;
        }
        Ok(())
    }
}

/// Identifies one registered tile callback, for targeted cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket(pub u64);

/// Callback invoked with the fetched tile payload.
pub type TileCallback<T> = Box<dyn FnOnce(&T) + Send>;

/// Contract of the tile transport/cache collaborator.
///
/// Implementations must coalesce concurrent requests: multiple callbacks
/// registered for one in-flight key are all invoked once when the single
/// underlying fetch completes, and already-cached keys invoke the callback
/// immediately without a new fetch. `cancel_tile` removes one registered
/// callback; the in-flight fetch is aborted only when the last callback for
/// its key is removed, otherwise it continues for the remaining callbacks.
pub trait TileSource {
    /// Fetched tile payload.
    type Tile;

    /// Register interest in a tile. Returns a ticket for cancellation.
    fn get_tile(
        &mut self,
        key: &Quadkey,
        callback: TileCallback<Self::Tile>,
    ) -> FetchTicket;

    /// Withdraw one registered callback for `key`.
    fn cancel_tile(
        &mut self,
        key: &Quadkey,
        ticket: FetchTicket,
    );
}
