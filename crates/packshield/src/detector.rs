//! Bridged-client detection.
//!
//! Players on a bridged client (a non-Java client connected through a
//! protocol translator) cannot apply Java resource packs, so the join flow
//! skips them. Which translator is installed varies per server, so
//! detection is a ranked list of [`ProbeStrategy`] values, each backed by
//! one translator's API.

use packshield_types::PlayerId;

use crate::ProbeError;

/// One strategy's verdict about a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// The strategy cannot tell.
    Unknown,
    /// The player is on a bridged client.
    Bridged,
    /// The strategy knows the player is on a native client.
    Native,
}

/// A way of asking some capability whether a player is bridged.
pub trait ProbeStrategy: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns an error when the backing capability is missing or fails.
    fn probe(&self, player: PlayerId) -> Result<Probe, ProbeError>;
}

/// Adapts a closure into a [`ProbeStrategy`].
pub struct FnProbe<F> {
    name: String,
    probe: F,
}

impl<F> FnProbe<F>
where
    F: Fn(PlayerId) -> Result<Probe, ProbeError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, probe: F) -> Self {
        Self {
            name: name.into(),
            probe,
        }
    }
}

impl<F> ProbeStrategy for FnProbe<F>
where
    F: Fn(PlayerId) -> Result<Probe, ProbeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self, player: PlayerId) -> Result<Probe, ProbeError> {
        (self.probe)(player)
    }
}

/// Ranked probe strategies.
///
/// Strategies run in ascending `priority` order (ties keep registration
/// order). The first `Bridged` verdict wins; `Native`, `Unknown` and
/// errors all mean "keep looking".
#[derive(Default)]
pub struct BridgeDetector {
    strategies: Vec<(i32, Box<dyn ProbeStrategy>)>,
}

impl BridgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a strategy. Builder-style counterpart of [`register`](Self::register).
    pub fn with_strategy(mut self, priority: i32, strategy: impl ProbeStrategy + 'static) -> Self {
        self.register(priority, strategy);
        self
    }

    pub fn register(&mut self, priority: i32, strategy: impl ProbeStrategy + 'static) {
        self.strategies.push((priority, Box::new(strategy)));
        // Stable, so equal priorities keep registration order.
        self.strategies.sort_by_key(|(priority, _)| *priority);
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy names in evaluation order.
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|(_, s)| s.name()).collect()
    }

    /// Returns `true` if any strategy reports `player` as bridged.
    pub fn is_bridged(&self, player: PlayerId) -> bool {
        for (priority, strategy) in &self.strategies {
            match strategy.probe(player) {
                Ok(Probe::Bridged) => {
                    tracing::debug!(%player, strategy = strategy.name(), priority, "bridged client detected");
                    return true;
                }
                Ok(verdict) => {
                    tracing::debug!(%player, strategy = strategy.name(), ?verdict, "probe inconclusive");
                }
                Err(e) => {
                    tracing::debug!(%player, strategy = strategy.name(), error = %e, "probe failed");
                }
            }
        }
        tracing::debug!(%player, "no strategy claims a bridged client");
        false
    }
}

impl std::fmt::Debug for BridgeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeDetector")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
