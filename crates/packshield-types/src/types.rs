//! Identity and presentation types shared by every PackShield crate.
//!
//! These are plain values: they carry no behavior beyond formatting and
//! a couple of classification helpers. Anything that talks to the engine
//! lives in `packshield-engine`; anything with state lives in
//! `packshield-protection`.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identity of a player.
///
/// Game servers hand out a UUID per account, and that UUID survives
/// reconnects, so it is the key for every per-player table. Wrapping it in
/// a newtype keeps a `PlayerId` from being passed where a [`DeliveryId`]
/// is expected.
///
/// `#[serde(transparent)]` serializes it as the bare UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// A fresh random identity. Handy for tests and simulations.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one content package being delivered to a client.
///
/// The delivery pipeline assigns one per pack; the same id comes back in
/// the client's status report once the pack has been applied (or failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    /// A fresh random delivery id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PackStatus: what the client reports back for a delivery
// ---------------------------------------------------------------------------

/// Status reported by a client for a single delivery.
///
/// Mirrors the statuses a game client sends while it handles a
/// resource pack request. Some are intermediate (the client accepted the
/// request, the bytes arrived) and some end the delivery for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackStatus {
    /// The client agreed to download the pack.
    Accepted,
    /// The bytes arrived; the client is about to apply them.
    Downloaded,
    /// The pack was applied.
    Loaded,
    /// The player refused the pack.
    Declined,
    /// The download failed.
    FailedDownload,
    /// The URL was rejected by the client.
    InvalidUrl,
    /// The client downloaded the pack but failed to reload its assets.
    FailedReload,
    /// The client dropped the pack without applying it.
    Discarded,
}

impl PackStatus {
    /// Returns `true` if no further status will follow for this delivery.
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Accepted | Self::Downloaded)
    }
}

// ---------------------------------------------------------------------------
// Overlay presentation
// ---------------------------------------------------------------------------

/// Color of an on-screen progress overlay (the "boss bar").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayColor {
    Pink,
    Blue,
    Red,
    #[default]
    Green,
    Yellow,
    Purple,
    White,
}

/// Segmentation style of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayStyle {
    #[default]
    Solid,
    Segmented6,
    Segmented10,
    Segmented12,
    Segmented20,
}
