//! Host engine abstraction for PackShield.
//!
//! Provides the [`EngineGateway`] and [`Overlay`] traits: everything the
//! protection layer needs from the game server, expressed as plain
//! synchronous calls keyed by [`PlayerId`].
//!
//! # Feature Flags
//!
//! - `memory` (default): [`MemoryEngine`], an in-process engine that
//!   records every call. Tests and simulations drive it directly.

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::{MemoryEngine, MemoryOverlay, OverlayRecord, PlayerRecord};

use packshield_types::{OverlayColor, OverlayStyle, PlayerId};

/// Default breath supply of a player, in ticks.
pub const DEFAULT_MAXIMUM_AIR: i32 = 300;

/// A transient progress indicator drawn on a player's screen.
///
/// Handles are shared: the engine and the protection layer both hold one,
/// so every method takes `&self`.
pub trait Overlay: Send + Sync + 'static {
    fn set_color(&self, color: OverlayColor);

    fn set_title(&self, title: &str);

    /// Sets the fill level. Values outside `0.0..=1.0` are clamped.
    fn set_progress(&self, progress: f64);

    fn set_visible(&self, visible: bool);

    /// Shows the overlay to `player`. Adding an existing viewer is a no-op.
    fn add_viewer(&self, player: PlayerId);

    fn has_viewer(&self, player: PlayerId) -> bool;

    fn remove_all_viewers(&self);
}

/// The host engine, as seen by the protection layer.
///
/// Every player-keyed call is infallible. Getters return `None` and
/// setters do nothing when the player is not online; reporting or
/// recovering from engine faults is the implementor's job, not the
/// caller's.
pub trait EngineGateway: Send + Sync + 'static {
    /// The overlay handle type this engine produces.
    type Overlay: Overlay;

    /// Returns `true` if `player` is currently connected.
    fn is_online(&self, player: PlayerId) -> bool;

    fn is_invulnerable(&self, player: PlayerId) -> Option<bool>;

    fn set_invulnerable(&self, player: PlayerId, invulnerable: bool);

    /// Whether other entities push (collide with) the player.
    fn is_collidable(&self, player: PlayerId) -> Option<bool>;

    fn set_collidable(&self, player: PlayerId, collidable: bool);

    /// Sets the remaining burn time. `0` extinguishes the player.
    fn set_fire_ticks(&self, player: PlayerId, ticks: i32);

    fn set_remaining_air(&self, player: PlayerId, air: i32);

    fn maximum_air(&self, player: PlayerId) -> Option<i32>;

    /// Sends a chat message. `text` may contain engine formatting markup.
    fn send_message(&self, player: PlayerId, text: &str);

    /// Creates a new, hidden-until-viewed overlay.
    fn create_overlay(&self, color: OverlayColor, style: OverlayStyle) -> Self::Overlay;
}

impl<E: EngineGateway> EngineGateway for std::sync::Arc<E> {
    type Overlay = E::Overlay;

    fn is_online(&self, player: PlayerId) -> bool {
        (**self).is_online(player)
    }

    fn is_invulnerable(&self, player: PlayerId) -> Option<bool> {
        (**self).is_invulnerable(player)
    }

    fn set_invulnerable(&self, player: PlayerId, invulnerable: bool) {
        (**self).set_invulnerable(player, invulnerable)
    }

    fn is_collidable(&self, player: PlayerId) -> Option<bool> {
        (**self).is_collidable(player)
    }

    fn set_collidable(&self, player: PlayerId, collidable: bool) {
        (**self).set_collidable(player, collidable)
    }

    fn set_fire_ticks(&self, player: PlayerId, ticks: i32) {
        (**self).set_fire_ticks(player, ticks)
    }

    fn set_remaining_air(&self, player: PlayerId, air: i32) {
        (**self).set_remaining_air(player, air)
    }

    fn maximum_air(&self, player: PlayerId) -> Option<i32> {
        (**self).maximum_air(player)
    }

    fn send_message(&self, player: PlayerId, text: &str) {
        (**self).send_message(player, text)
    }

    fn create_overlay(&self, color: OverlayColor, style: OverlayStyle) -> Self::Overlay {
        (**self).create_overlay(color, style)
    }
}
