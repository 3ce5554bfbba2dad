//! The per-player progress overlay.
//!
//! While a player is protected they see a full overlay in the
//! "protecting" presentation. On release it switches to the "released"
//! presentation and drains to empty over the release countdown, after
//! which it is retired (viewers detached, hidden, dropped).
//!
//! Overlays outlive protection episodes: a released player keeps their
//! draining overlay after their protection state is gone, which is why
//! they live in their own table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use packshield_engine::{EngineGateway, Overlay};
use packshield_tick::{Scheduler, TaskHandle, Ticks};
use packshield_types::PlayerId;

use crate::{OverlayPresentation, ProtectionConfig};

/// A running drain of a released overlay.
struct Countdown {
    id: u64,
    handle: TaskHandle,
    remaining: u64,
    total: u64,
    period: u64,
}

struct OverlaySlot<O> {
    overlay: O,
    countdown: Option<Countdown>,
}

impl<O: Overlay> OverlaySlot<O> {
    fn present(&self, presentation: &OverlayPresentation, player: PlayerId) {
        self.overlay.set_color(presentation.color);
        self.overlay.set_title(&presentation.title);
        self.overlay.set_visible(true);
        self.overlay.set_progress(1.0);
        if !self.overlay.has_viewer(player) {
            self.overlay.add_viewer(player);
        }
    }

    fn cancel_countdown(&mut self) {
        if let Some(countdown) = self.countdown.take() {
            countdown.handle.cancel();
        }
    }

    fn retire(mut self) {
        self.cancel_countdown();
        self.overlay.remove_all_viewers();
        self.overlay.set_visible(false);
    }
}

/// One overlay and at most one countdown per player.
pub(crate) struct OverlayTable<O> {
    slots: Mutex<HashMap<PlayerId, OverlaySlot<O>>>,
    next_countdown: AtomicU64,
}

impl<O: Overlay> OverlayTable<O> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_countdown: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PlayerId, OverlaySlot<O>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shows (or refreshes) the full "protecting" overlay, stopping any
    /// countdown left over from a previous episode.
    pub(crate) fn show_protection<E>(&self, engine: &E, player: PlayerId, config: &ProtectionConfig)
    where
        E: EngineGateway<Overlay = O>,
    {
        let presentation = &config.protecting;
        let mut slots = self.lock();
        let slot = slots.entry(player).or_insert_with(|| OverlaySlot {
            overlay: engine.create_overlay(presentation.color, config.overlay_style),
            countdown: None,
        });
        slot.cancel_countdown();
        slot.present(presentation, player);
    }

    /// Switches to the "released" overlay and starts draining it.
    ///
    /// A zero `release_countdown` retires the overlay immediately.
    pub(crate) fn show_release<E, S>(
        self: &Arc<Self>,
        engine: &E,
        scheduler: &S,
        player: PlayerId,
        config: &ProtectionConfig,
    ) where
        E: EngineGateway<Overlay = O>,
        S: Scheduler,
    {
        let presentation = &config.released;
        let duration = config.release_countdown;
        let mut slots = self.lock();
        let slot = slots.entry(player).or_insert_with(|| OverlaySlot {
            overlay: engine.create_overlay(presentation.color, config.overlay_style),
            countdown: None,
        });
        slot.cancel_countdown();
        slot.present(presentation, player);

        if duration.is_zero() {
            if let Some(slot) = slots.remove(&player) {
                slot.retire();
            }
            return;
        }

        let id = self.next_countdown.fetch_add(1, Ordering::Relaxed);
        let period = config.countdown_period.max(Ticks::ONE);
        let table: Weak<Self> = Arc::downgrade(self);
        let handle = scheduler.schedule_repeating(
            period,
            period,
            Box::new(move || {
                if let Some(table) = table.upgrade() {
                    table.tick_countdown(player, id);
                }
            }),
        );

        slot.countdown = Some(Countdown {
            id,
            handle,
            remaining: duration.get(),
            total: duration.get(),
            period: period.get(),
        });
    }

    /// One step of a countdown. Stale countdowns (replaced or cancelled
    /// while this invocation was already queued) are ignored.
    fn tick_countdown(&self, player: PlayerId, id: u64) {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(&player) else {
            return;
        };
        let Some(countdown) = slot.countdown.as_mut().filter(|c| c.id == id) else {
            tracing::trace!(%player, countdown = id, "stale overlay countdown tick");
            return;
        };

        countdown.remaining = countdown.remaining.saturating_sub(countdown.period);
        let progress = countdown.remaining as f64 / countdown.total as f64;
        slot.overlay.set_progress(progress);

        if countdown.remaining == 0 {
            if let Some(slot) = slots.remove(&player) {
                slot.retire();
            }
            tracing::debug!(%player, "release overlay retired");
        }
    }

    /// Retires a player's overlay right away, countdown or not.
    pub(crate) fn hide_now(&self, player: PlayerId) -> bool {
        let slot = self.lock().remove(&player);
        match slot {
            Some(slot) => {
                slot.retire();
                true
            }
            None => false,
        }
    }

    /// Retires every overlay. Returns how many there were.
    pub(crate) fn drain(&self) -> usize {
        let slots: Vec<_> = self.lock().drain().map(|(_, slot)| slot).collect();
        let count = slots.len();
        for slot in slots {
            slot.retire();
        }
        count
    }

    pub(crate) fn is_showing(&self, player: PlayerId) -> bool {
        self.lock().contains_key(&player)
    }

    pub(crate) fn has_countdown(&self, player: PlayerId) -> bool {
        self.lock()
            .get(&player)
            .is_some_and(|slot| slot.countdown.is_some())
    }
}
