//! The protection manager: the per-player protection state machine.
//!
//! ```text
//!                 begin_protection()
//!   [Inactive] ────────────────────→ [Active] ──┐ begin_protection()
//!       ↑                              │  ↑     │ (merge deliveries,
//!       │                              │  └─────┘  restart fallback)
//!       │   all deliveries resolved    │
//!       ├──── AND player moved ────────┤
//!       │                              │
//!       ├──── fallback timeout ────────┤
//!       │                              │
//!       └──── clear() (disconnect) ────┘
//! ```
//!
//! # Concurrency
//!
//! Move, damage, join and quit notifications arrive on the server's main
//! thread, while pack status reports can arrive from a network thread, and
//! timers fire on the scheduler's threads. The registry is a `DashMap` of
//! [`ProtectionEntry`] values; each entry has its own mutex. Locks are
//! always taken entry first, registry second, and the registry guard is
//! never held while an entry is locked or the engine is called.
//!
//! Engine calls happen while the entry lock is held. The host may still
//! report a quit or a rejoin synchronously from inside a setter while an
//! episode is being torn down: the ending thread is recorded on the entry,
//! and a [`clear`](ProtectionManager::clear) or
//! [`begin_protection`](ProtectionManager::begin_protection) it makes for
//! that player is deferred until the flags are restored. Callers on other
//! threads wait for the restore instead. Any other synchronous call back
//! into the manager from the gateway is unsupported.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use packshield_engine::EngineGateway;
use packshield_tick::Scheduler;
use packshield_types::{DeliveryId, MoveEvent, PlayerId};

use crate::overlay::OverlayTable;
use crate::state::{Deferred, ProtectionEntry, ProtectionState};
use crate::{
    FlagOrigin, PROTECTION_COLLIDABLE, PROTECTION_INVULNERABLE, ProtectionConfig, ProtectionFlag,
    ProtectionStatus, RestoreReport,
};

struct Shared<E: EngineGateway, S> {
    engine: Arc<E>,
    scheduler: Arc<S>,
    config: ProtectionConfig,
    states: DashMap<PlayerId, Arc<ProtectionEntry>>,
    overlays: Arc<OverlayTable<E::Overlay>>,
}

/// Tracks and drives temporary protection for every player.
///
/// Cheap to clone: all clones share one registry. Construct one per
/// plugin lifetime and call [`shutdown`](Self::shutdown) when the plugin
/// is disabled.
pub struct ProtectionManager<E: EngineGateway, S: Scheduler> {
    shared: Arc<Shared<E, S>>,
}

impl<E: EngineGateway, S: Scheduler> Clone for ProtectionManager<E, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: EngineGateway, S: Scheduler> ProtectionManager<E, S> {
    /// Creates a manager with an empty registry.
    pub fn new(engine: Arc<E>, scheduler: Arc<S>, config: ProtectionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                scheduler,
                config: config.validated(),
                states: DashMap::new(),
                overlays: Arc::new(OverlayTable::new()),
            }),
        }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.shared.config
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.shared.engine
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Returns `true` while `player` has an active protection episode.
    pub fn is_protected(&self, player: PlayerId) -> bool {
        self.shared
            .states
            .get(&player)
            .is_some_and(|entry| entry.is_active())
    }

    /// Snapshot of an active episode, or `None` if the player is not
    /// protected.
    pub fn status(&self, player: PlayerId) -> Option<ProtectionStatus> {
        let entry = self.active_entry(player)?;
        let state = entry.lock();
        entry.is_active().then(|| state.status())
    }

    /// Players with an active episode, in no particular order.
    pub fn protected_players(&self) -> Vec<PlayerId> {
        self.shared
            .states
            .iter()
            .filter(|entry| entry.value().is_active())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Returns `true` if `player` currently has an overlay on screen.
    pub fn has_overlay(&self, player: PlayerId) -> bool {
        self.shared.overlays.is_showing(player)
    }

    /// Returns `true` if `player`'s overlay is draining after a release.
    pub fn has_release_countdown(&self, player: PlayerId) -> bool {
        self.shared.overlays.has_countdown(player)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Protects `player` until `deliveries` are resolved and the player
    /// has moved, or until the fallback timeout.
    ///
    /// Calling this for a player who is already protected merges the new
    /// deliveries into the episode and restarts the fallback timeout; the
    /// pre-protection flag snapshot and the "enabled" message are not
    /// repeated. A `None` player, an offline player, or an empty delivery
    /// set is ignored.
    pub fn begin_protection<I>(&self, player: Option<PlayerId>, deliveries: I)
    where
        I: IntoIterator<Item = DeliveryId>,
    {
        let Some(player) = player else {
            return;
        };
        let deliveries: HashSet<DeliveryId> = deliveries.into_iter().collect();
        if deliveries.is_empty() {
            return;
        }
        let engine = &self.shared.engine;
        if !engine.is_online(player) {
            tracing::debug!(%player, "protection requested for offline player, ignoring");
            return;
        }

        loop {
            let (entry, created) = self.entry_or_create(player);
            if entry.ended_on_current_thread() {
                // Called back from this thread's own release.
                entry.defer_begin(deliveries);
                tracing::debug!(%player, "protection request deferred until release completes");
                return;
            }
            let mut state = entry.lock();
            if !entry.is_active() {
                // Released between lookup and lock. Drop the dead entry and
                // start a fresh episode with a fresh snapshot.
                drop(state);
                self.remove_entry(player, &entry);
                continue;
            }

            if !state.has_snapshot() {
                state.snapshot_flags(
                    engine.is_invulnerable(player).unwrap_or(false),
                    engine.is_collidable(player).unwrap_or(true),
                );
            }
            let added = state.add_deliveries(deliveries.iter().copied());
            self.schedule_fallback(player, &mut state);
            self.apply_protection(player, &mut state);
            self.shared
                .overlays
                .show_protection(engine.as_ref(), player, &self.shared.config);

            if created {
                engine.send_message(player, &self.shared.config.messages.enabled);
                tracing::info!(
                    %player,
                    pending = state.pending_len(),
                    timeout = %self.shared.config.fallback_timeout,
                    "protection enabled"
                );
            } else {
                tracing::debug!(
                    %player,
                    added,
                    pending = state.pending_len(),
                    "protection extended"
                );
            }
            return;
        }
    }

    /// Records that the client finished with `delivery` (applied, declined
    /// or failed) and releases the player if that was the last condition.
    pub fn on_pack_processed(&self, player: PlayerId, delivery: DeliveryId) {
        let Some(entry) = self.active_entry(player) else {
            return;
        };
        let mut state = entry.lock();
        if !entry.is_active() {
            return;
        }

        if state.resolve(delivery) {
            tracing::debug!(
                %player,
                %delivery,
                pending = state.pending_len(),
                "delivery resolved"
            );
        }
        self.attempt_release(player, &entry, &mut state);
    }

    /// Records player movement. Only a change of x, y or z counts; turning
    /// the camera does not.
    pub fn on_player_move(&self, event: &MoveEvent) {
        let player = event.player;
        let Some(entry) = self.active_entry(player) else {
            return;
        };
        if !event.changes_position() {
            return;
        }
        let mut state = entry.lock();
        if !entry.is_active() {
            return;
        }

        if state.mark_moved() {
            tracing::debug!(%player, "movement seen");
        }
        self.attempt_release(player, &entry, &mut state);
    }

    /// Records that something other than this manager wrote `flag` during
    /// the player's episode. The flag is then left alone on release even if
    /// its value matches what the manager wrote.
    pub fn mark_external_change(&self, player: PlayerId, flag: ProtectionFlag) {
        let Some(entry) = self.active_entry(player) else {
            return;
        };
        let mut state = entry.lock();
        if entry.is_active() {
            state.flag_mut(flag).mark_external();
            tracing::debug!(%player, ?flag, "external flag change recorded");
        }
    }

    /// Tears down everything for a disconnecting player: timers, flags,
    /// overlay. The overlay is retired immediately, without a countdown.
    /// Safe to call repeatedly or for players that were never protected.
    pub fn clear(&self, player: PlayerId) {
        let mut deferred = Deferred::default();
        if let Some(entry) = self.entry(player) {
            if entry.ended_on_current_thread() {
                // Called back from this thread's own release.
                entry.defer_clear();
                return;
            }
            let mut state = entry.lock();
            if entry.deactivate() {
                if let Some(fallback) = state.take_fallback() {
                    fallback.cancel();
                }
                let report = self.restore_flags(player, &state);
                if report.interference() {
                    tracing::warn!(%player, ?report, "protection flags changed externally");
                }
                tracing::info!(%player, pending = state.pending_len(), "protection cleared");
                self.remove_entry(player, &entry);
                deferred = entry.take_deferred();
            } else {
                self.remove_entry(player, &entry);
            }
        }

        self.shared.overlays.hide_now(player);
        self.resume_deferred(player, deferred);
    }

    /// Clears every player and retires every overlay. Call when the plugin
    /// is disabled. Returns the number of players whose protection ended.
    pub fn shutdown(&self) -> usize {
        let players: Vec<PlayerId> = self.shared.states.iter().map(|e| *e.key()).collect();
        let mut restored = 0;
        for player in players {
            if self.is_protected(player) {
                restored += 1;
            }
            self.clear(player);
        }
        let overlays = self.shared.overlays.drain();
        tracing::info!(restored, overlays, "protection manager shut down");
        restored
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn entry(&self, player: PlayerId) -> Option<Arc<ProtectionEntry>> {
        self.shared
            .states
            .get(&player)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn active_entry(&self, player: PlayerId) -> Option<Arc<ProtectionEntry>> {
        self.entry(player).filter(|entry| entry.is_active())
    }

    /// Returns the player's entry, creating one if none exists. The flag
    /// is `true` if this call created it.
    ///
    /// A new entry has no flag snapshot yet. It is taken under the entry
    /// lock, once any previous episode of the player has been restored and
    /// unregistered.
    fn entry_or_create(&self, player: PlayerId) -> (Arc<ProtectionEntry>, bool) {
        let mut created = false;
        let entry = Arc::clone(
            self.shared
                .states
                .entry(player)
                .or_insert_with(|| {
                    created = true;
                    Arc::new(ProtectionEntry::new(ProtectionState::awaiting_snapshot()))
                })
                .value(),
        );
        (entry, created)
    }

    fn apply_protection(&self, player: PlayerId, state: &mut ProtectionState) {
        let engine = &self.shared.engine;
        engine.set_invulnerable(player, PROTECTION_INVULNERABLE);
        state.invulnerable.record_applied(PROTECTION_INVULNERABLE);
        engine.set_collidable(player, PROTECTION_COLLIDABLE);
        state.collidable.record_applied(PROTECTION_COLLIDABLE);
        self.suppress_hazards(player);
    }

    /// Puts out fire (and refills air, if configured). Hazards can tick
    /// between two checks, so this runs on every release attempt too.
    fn suppress_hazards(&self, player: PlayerId) {
        let engine = &self.shared.engine;
        engine.set_fire_ticks(player, 0);
        if self.shared.config.air_policy.refills() {
            if let Some(max) = engine.maximum_air(player) {
                engine.set_remaining_air(player, max);
            }
        }
    }

    /// Replaces the fallback timer. Runs under the entry lock, so cancel and
    /// replace cannot interleave with another replacement.
    fn schedule_fallback(&self, player: PlayerId, state: &mut ProtectionState) {
        let generation = state.next_fallback_generation();
        let shared: Weak<Shared<E, S>> = Arc::downgrade(&self.shared);
        let handle = self.shared.scheduler.schedule_once(
            self.shared.config.fallback_timeout,
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    ProtectionManager { shared }.handle_fallback(player, generation);
                }
            }),
        );
        state.install_fallback(handle);
    }

    fn handle_fallback(&self, player: PlayerId, generation: u64) {
        let Some(entry) = self.active_entry(player) else {
            tracing::trace!(%player, "fallback fired after release");
            return;
        };
        let mut state = entry.lock();
        if !entry.is_active() || !state.is_current_fallback(generation) {
            tracing::trace!(%player, generation, "stale fallback ignored");
            return;
        }
        // This timer is the one firing; nothing left to cancel.
        state.take_fallback();
        tracing::info!(
            %player,
            pending = state.pending_len(),
            moved = state.status().movement_seen,
            "protection fallback timeout reached"
        );
        self.release(player, &entry, &mut state, true);
    }

    fn attempt_release(&self, player: PlayerId, entry: &ProtectionEntry, state: &mut ProtectionState) {
        if state.ready_for_release() {
            self.release(player, entry, state, false);
        } else {
            self.suppress_hazards(player);
        }
    }

    fn release(
        &self,
        player: PlayerId,
        entry: &ProtectionEntry,
        state: &mut ProtectionState,
        timed_out: bool,
    ) {
        if !entry.deactivate() {
            return;
        }
        if let Some(fallback) = state.take_fallback() {
            fallback.cancel();
        }

        let engine = &self.shared.engine;
        let config = &self.shared.config;
        if !engine.is_online(player) {
            self.remove_entry(player, entry);
            self.shared.overlays.hide_now(player);
            tracing::info!(%player, timed_out, "protection ended for offline player");
            return;
        }

        let report = self.restore_flags(player, state);
        if report.interference() {
            tracing::warn!(%player, ?report, "protection flags changed externally, left as found");
        }

        let mut deferred = entry.take_deferred();
        if deferred.cleared {
            self.shared.overlays.hide_now(player);
        } else {
            self.shared.overlays.show_release(
                engine.as_ref(),
                self.shared.scheduler.as_ref(),
                player,
                config,
            );
        }
        // Remove only after restoring and presenting, so a concurrent
        // begin_protection snapshots the restored flags and a concurrent
        // clear retires the release overlay.
        self.remove_entry(player, entry);
        deferred.absorb(entry.take_deferred());

        if deferred.cleared {
            tracing::info!(%player, timed_out, "protection released, player cleared meanwhile");
        } else {
            let message = if timed_out {
                &config.messages.timed_out
            } else {
                &config.messages.released
            };
            engine.send_message(player, message);
            if report.interference() {
                engine.send_message(player, &config.messages.interference);
            }
            tracing::info!(%player, timed_out, "protection released");
        }
        self.resume_deferred(player, deferred);
    }

    /// Starts the episode requested while the previous one was ending.
    fn resume_deferred(&self, player: PlayerId, deferred: Deferred) {
        if !deferred.deliveries.is_empty() {
            tracing::debug!(%player, "resuming protection requested during release");
            self.begin_protection(Some(player), deferred.deliveries);
        }
    }

    fn remove_entry(&self, player: PlayerId, entry: &ProtectionEntry) {
        self.shared
            .states
            .remove_if(&player, |_, current| std::ptr::eq(Arc::as_ptr(current), entry));
    }

    /// Writes each flag back to its pre-episode value unless someone else
    /// changed it since the manager last did.
    fn restore_flags(&self, player: PlayerId, state: &ProtectionState) -> RestoreReport {
        let engine = &self.shared.engine;
        let invulnerable = match engine.is_invulnerable(player) {
            Some(current) => state.invulnerable.classify(current),
            None => FlagOrigin::Untouched,
        };
        if invulnerable == FlagOrigin::ChangedByCore {
            engine.set_invulnerable(player, state.invulnerable.original());
        }

        let collidable = match engine.is_collidable(player) {
            Some(current) => state.collidable.classify(current),
            None => FlagOrigin::Untouched,
        };
        if collidable == FlagOrigin::ChangedByCore {
            engine.set_collidable(player, state.collidable.original());
        }

        RestoreReport {
            invulnerable,
            collidable,
        }
    }
}
