//! Server-tick arithmetic.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Simulation ticks per second on a standard game server.
pub const TICKS_PER_SECOND: u64 = 20;

/// Wall-clock length of one tick at [`TICKS_PER_SECOND`].
pub const TICK_DURATION: Duration = Duration::from_millis(1000 / TICKS_PER_SECOND);

/// A span of simulation time measured in server ticks.
///
/// Every delay in PackShield is expressed in ticks rather than wall time,
/// because the host engine's scheduler is tick-driven: a server running
/// behind schedule stretches a tick, and timeouts should stretch with it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);

    /// Converts whole simulated seconds into ticks.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * TICKS_PER_SECOND)
    }

    /// The raw tick count.
    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Wall-clock length of this span when one tick lasts `tick`.
    pub fn to_duration(self, tick: Duration) -> Duration {
        tick.saturating_mul(u32::try_from(self.0).unwrap_or(u32::MAX))
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}
