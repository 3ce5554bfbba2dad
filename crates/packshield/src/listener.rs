//! Forwards host engine events to the protection manager.
//!
//! The host calls these from its event handlers and applies the returned
//! outcome (cancelling the event, or overriding the new air level). The
//! listener itself holds no state.

use packshield_engine::{DEFAULT_MAXIMUM_AIR, EngineGateway};
use packshield_protection::ProtectionManager;
use packshield_tick::Scheduler;
use packshield_types::{MoveEvent, PlayerId};

/// What the host should do with a cancellable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Allow,
    Cancel,
}

impl EventOutcome {
    pub fn is_cancelled(self) -> bool {
        self == Self::Cancel
    }
}

/// What the host should do with an air-change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirOutcome {
    Allow,
    /// Cancel the change and set the player's air to `air` instead.
    Cancel { air: i32 },
}

/// The event bridge between the engine and a [`ProtectionManager`].
pub struct ProtectionListener<E: EngineGateway, S: Scheduler> {
    manager: ProtectionManager<E, S>,
}

impl<E: EngineGateway, S: Scheduler> Clone for ProtectionListener<E, S> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<E: EngineGateway, S: Scheduler> ProtectionListener<E, S> {
    pub fn new(manager: ProtectionManager<E, S>) -> Self {
        Self { manager }
    }

    /// Any damage to a protected player is cancelled, and whatever set
    /// them on fire is put out.
    pub fn on_damage(&self, player: PlayerId) -> EventOutcome {
        self.cancel_and_extinguish(player)
    }

    pub fn on_combust(&self, player: PlayerId) -> EventOutcome {
        self.cancel_and_extinguish(player)
    }

    /// Knockback.
    pub fn on_velocity(&self, player: PlayerId) -> EventOutcome {
        if self.manager.is_protected(player) {
            EventOutcome::Cancel
        } else {
            EventOutcome::Allow
        }
    }

    /// Cancels air loss for protected players and pins air at the maximum,
    /// unless the air policy leaves breath alone.
    pub fn on_air_change(&self, player: PlayerId, amount: i32) -> AirOutcome {
        if !self.manager.config().air_policy.cancels_depletion()
            || !self.manager.is_protected(player)
        {
            return AirOutcome::Allow;
        }
        let air = self
            .manager
            .engine()
            .maximum_air(player)
            .unwrap_or(DEFAULT_MAXIMUM_AIR);
        tracing::trace!(%player, requested = amount, air, "air change cancelled");
        AirOutcome::Cancel { air }
    }

    pub fn on_move(&self, event: &MoveEvent) {
        self.manager.on_player_move(event);
    }

    pub fn on_quit(&self, player: PlayerId) {
        self.manager.clear(player);
    }

    fn cancel_and_extinguish(&self, player: PlayerId) -> EventOutcome {
        if !self.manager.is_protected(player) {
            return EventOutcome::Allow;
        }
        self.manager.engine().set_fire_ticks(player, 0);
        EventOutcome::Cancel
    }
}
