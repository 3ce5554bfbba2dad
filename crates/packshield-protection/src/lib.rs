//! Temporary player protection while resource packs are delivered.
//!
//! When a player joins, the server pushes one or more resource packs to
//! their client. Until the client has applied them it may be frozen on a
//! loading screen, so this crate shields the player from damage,
//! knockback, fire and drowning until two things have happened:
//!
//! 1. every delivery the player was waiting on has been resolved
//!    (loaded, declined or failed), **and**
//! 2. the player has moved, proving the client is responsive again.
//!
//! A fallback timer ends protection after [`FALLBACK_TIMEOUT`] regardless,
//! so a client that never reports back is never protected forever.
//!
//! # Key types
//!
//! - [`ProtectionManager`]: the registry and state machine
//! - [`ProtectionConfig`]: timings, air handling, overlay and messages
//! - [`RestoreReport`] / [`FlagOrigin`]: who last touched each flag
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use packshield_engine::MemoryEngine;
//! use packshield_protection::{ProtectionConfig, ProtectionManager};
//! use packshield_tick::{ManualScheduler, Ticks};
//! use packshield_types::{DeliveryId, Location, MoveEvent, PlayerId};
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let scheduler = Arc::new(ManualScheduler::new());
//! let manager = ProtectionManager::new(engine.clone(), scheduler.clone(), ProtectionConfig::default());
//!
//! let player = PlayerId::random();
//! let pack = DeliveryId::random();
//! engine.connect(player);
//!
//! manager.begin_protection(Some(player), [pack]);
//! assert!(manager.is_protected(player));
//!
//! manager.on_pack_processed(player, pack);
//! manager.on_player_move(&MoveEvent::new(player, Location::at(0.0, 64.0, 0.0), Location::at(1.0, 64.0, 0.0)));
//! assert!(!manager.is_protected(player));
//!
//! scheduler.advance(Ticks::from_secs(5));
//! assert!(!manager.has_overlay(player));
//! ```

mod config;
mod manager;
mod overlay;
mod state;

pub use config::{
    AirPolicy, FALLBACK_TIMEOUT, OverlayPresentation, PROTECTION_COLLIDABLE,
    PROTECTION_INVULNERABLE, ProtectionConfig, ProtectionMessages, RELEASE_COUNTDOWN,
};
pub use manager::ProtectionManager;
pub use state::{FlagOrigin, ProtectionFlag, ProtectionStatus, RestoreReport, TrackedFlag};
