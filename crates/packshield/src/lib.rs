//! # PackShield
//!
//! Keeps players safe while their resource packs load.
//!
//! A joining player's client may sit on a loading screen for seconds while
//! it downloads and applies packs. PackShield makes the player invulnerable
//! and unpushable for that window, cancels fire, knockback and drowning,
//! and hands control back once every pack is resolved and the player has
//! moved (or after a fallback timeout).
//!
//! This is the meta-crate: it re-exports the protection core and adds the
//! plugin-facing layer.
//!
//! - [`ShieldConfig`]: JSON configuration, [`init_tracing`] for logging
//! - [`ProtectionListener`]: engine events in, cancel/allow out
//! - [`JoinListener`]: join and pack-status flow over a [`DeliveryPipeline`]
//! - [`BridgeDetector`]: ranked probes for bridged clients
//! - [`PackShield`]: enable/disable lifecycle
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use packshield::prelude::*;
//!
//! struct NoPacks;
//!
//! impl DeliveryPipeline for NoPacks {
//!     fn packs_for_join(&self) -> Vec<PackDescriptor> {
//!         Vec::new()
//!     }
//!
//!     fn send(&self, _player: PlayerId, _packs: &[PackDescriptor]) {}
//! }
//!
//! let engine = Arc::new(MemoryEngine::new());
//! let shield = PackShieldBuilder::new(NoPacks).enable(engine, Arc::new(ManualScheduler::new()));
//!
//! let player = PlayerId::random();
//! assert_eq!(shield.join_listener().on_join(player), JoinOutcome::NoPacks);
//! assert_eq!(shield.disable(), 0);
//! ```

mod config;
mod detector;
mod error;
mod join;
mod listener;
mod plugin;

pub use config::{DEFAULT_LOG_FILTER, ShieldConfig, init_tracing};
pub use detector::{BridgeDetector, FnProbe, Probe, ProbeStrategy};
pub use error::{ConfigError, ProbeError, ShieldError};
pub use join::{DeliveryPipeline, JoinListener, JoinOutcome, PackDescriptor};
pub use listener::{AirOutcome, EventOutcome, ProtectionListener};
pub use plugin::{PackShield, PackShieldBuilder};

pub use packshield_engine as engine;
pub use packshield_protection as protection;
pub use packshield_tick as tick;
pub use packshield_types as types;

/// Common imports for plugin code.
pub mod prelude {
    pub use crate::{
        AirOutcome, BridgeDetector, DeliveryPipeline, EventOutcome, FnProbe, JoinListener,
        JoinOutcome, PackDescriptor, PackShield, PackShieldBuilder, Probe, ProbeError,
        ProbeStrategy, ProtectionListener, ShieldConfig, ShieldError, init_tracing,
    };
    #[cfg(feature = "memory")]
    pub use packshield_engine::MemoryEngine;
    pub use packshield_engine::{EngineGateway, Overlay};
    pub use packshield_protection::{
        AirPolicy, ProtectionConfig, ProtectionFlag, ProtectionManager, ProtectionStatus,
    };
    pub use packshield_tick::{ManualScheduler, Scheduler, Ticks, TokioScheduler};
    pub use packshield_types::{
        DeliveryId, Location, MoveEvent, PackStatus, PlayerId,
    };
}
