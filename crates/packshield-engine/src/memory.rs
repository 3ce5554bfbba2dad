//! An in-memory engine that records every call.
//!
//! `MemoryEngine` behaves like a tiny game server: players connect with
//! default flags, setters mutate those flags, messages are appended to a
//! per-player log, and overlays keep their full presentation state so a
//! test can look at exactly what a player would see.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use packshield_types::{OverlayColor, OverlayStyle, PlayerId};

use crate::{DEFAULT_MAXIMUM_AIR, EngineGateway, Overlay};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// Everything the engine knows about one connected player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    pub invulnerable: bool,
    pub collidable: bool,
    pub fire_ticks: i32,
    pub remaining_air: i32,
    pub maximum_air: i32,
    /// Chat messages received, oldest first.
    pub messages: Vec<String>,
    /// Number of `set_invulnerable` / `set_collidable` calls received.
    pub flag_writes: u32,
}

impl Default for PlayerRecord {
    fn default() -> Self {
        Self {
            invulnerable: false,
            collidable: true,
            fire_ticks: 0,
            remaining_air: DEFAULT_MAXIMUM_AIR,
            maximum_air: DEFAULT_MAXIMUM_AIR,
            messages: Vec::new(),
            flag_writes: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Overlays
// ---------------------------------------------------------------------------

/// Presentation state of a [`MemoryOverlay`].
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayRecord {
    pub color: OverlayColor,
    pub style: OverlayStyle,
    pub title: String,
    pub progress: f64,
    pub visible: bool,
    pub viewers: HashSet<PlayerId>,
}

/// Overlay handle produced by [`MemoryEngine`]. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryOverlay {
    record: Arc<Mutex<OverlayRecord>>,
}

impl MemoryOverlay {
    /// A copy of the overlay's current state.
    pub fn snapshot(&self) -> OverlayRecord {
        lock(&self.record).clone()
    }

    /// Hidden, unseen and no longer held by anyone but the engine.
    fn is_retired(&self) -> bool {
        if Arc::strong_count(&self.record) > 1 {
            return false;
        }
        let record = lock(&self.record);
        !record.visible && record.viewers.is_empty()
    }
}

impl Overlay for MemoryOverlay {
    fn set_color(&self, color: OverlayColor) {
        lock(&self.record).color = color;
    }

    fn set_title(&self, title: &str) {
        lock(&self.record).title = title.to_string();
    }

    fn set_progress(&self, progress: f64) {
        lock(&self.record).progress = progress.clamp(0.0, 1.0);
    }

    fn set_visible(&self, visible: bool) {
        lock(&self.record).visible = visible;
    }

    fn add_viewer(&self, player: PlayerId) {
        lock(&self.record).viewers.insert(player);
    }

    fn has_viewer(&self, player: PlayerId) -> bool {
        lock(&self.record).viewers.contains(&player)
    }

    fn remove_all_viewers(&self) {
        lock(&self.record).viewers.clear();
    }
}

// ---------------------------------------------------------------------------
// MemoryEngine
// ---------------------------------------------------------------------------

/// An [`EngineGateway`] backed by plain maps.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    players: Mutex<HashMap<PlayerId, PlayerRecord>>,
    overlays: Mutex<Vec<MemoryOverlay>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a player with default flags (vulnerable, collidable, full
    /// air). Reconnecting resets the record.
    pub fn connect(&self, player: PlayerId) {
        self.connect_with(player, PlayerRecord::default());
    }

    /// Connects a player with a specific starting record.
    pub fn connect_with(&self, player: PlayerId, record: PlayerRecord) {
        lock(&self.players).insert(player, record);
    }

    /// Disconnects a player. Subsequent calls for them are ignored.
    pub fn disconnect(&self, player: PlayerId) {
        lock(&self.players).remove(&player);
    }

    /// A copy of the player's record, if they are online.
    pub fn player(&self, player: PlayerId) -> Option<PlayerRecord> {
        lock(&self.players).get(&player).cloned()
    }

    /// Chat messages the player received, oldest first.
    pub fn messages(&self, player: PlayerId) -> Vec<String> {
        self.player(player).map(|p| p.messages).unwrap_or_default()
    }

    /// Sets the player's fire ticks, as a lava block or fire aspect would.
    pub fn ignite(&self, player: PlayerId, ticks: i32) {
        self.set_fire_ticks(player, ticks);
    }

    /// Live overlays, oldest first.
    ///
    /// Overlays that were hidden, lost their viewers and were dropped by
    /// their owner are pruned the next time an overlay is created.
    pub fn overlays(&self) -> Vec<MemoryOverlay> {
        lock(&self.overlays).clone()
    }

    /// Overlays currently showing to `player`.
    pub fn overlays_viewed_by(&self, player: PlayerId) -> Vec<MemoryOverlay> {
        lock(&self.overlays)
            .iter()
            .filter(|o| o.has_viewer(player))
            .cloned()
            .collect()
    }

    fn with_player(&self, player: PlayerId, f: impl FnOnce(&mut PlayerRecord)) {
        if let Some(record) = lock(&self.players).get_mut(&player) {
            f(record);
        } else {
            tracing::trace!(%player, "engine call for offline player ignored");
        }
    }
}

impl EngineGateway for MemoryEngine {
    type Overlay = MemoryOverlay;

    fn is_online(&self, player: PlayerId) -> bool {
        lock(&self.players).contains_key(&player)
    }

    fn is_invulnerable(&self, player: PlayerId) -> Option<bool> {
        lock(&self.players).get(&player).map(|p| p.invulnerable)
    }

    fn set_invulnerable(&self, player: PlayerId, invulnerable: bool) {
        self.with_player(player, |p| {
            p.invulnerable = invulnerable;
            p.flag_writes += 1;
        });
    }

    fn is_collidable(&self, player: PlayerId) -> Option<bool> {
        lock(&self.players).get(&player).map(|p| p.collidable)
    }

    fn set_collidable(&self, player: PlayerId, collidable: bool) {
        self.with_player(player, |p| {
            p.collidable = collidable;
            p.flag_writes += 1;
        });
    }

    fn set_fire_ticks(&self, player: PlayerId, ticks: i32) {
        self.with_player(player, |p| p.fire_ticks = ticks);
    }

    fn set_remaining_air(&self, player: PlayerId, air: i32) {
        self.with_player(player, |p| p.remaining_air = air.min(p.maximum_air));
    }

    fn maximum_air(&self, player: PlayerId) -> Option<i32> {
        lock(&self.players).get(&player).map(|p| p.maximum_air)
    }

    fn send_message(&self, player: PlayerId, text: &str) {
        self.with_player(player, |p| p.messages.push(text.to_string()));
    }

    fn create_overlay(&self, color: OverlayColor, style: OverlayStyle) -> MemoryOverlay {
        let overlay = MemoryOverlay {
            record: Arc::new(Mutex::new(OverlayRecord {
                color,
                style,
                title: String::new(),
                progress: 1.0,
                visible: true,
                viewers: HashSet::new(),
            })),
        };
        let mut overlays = lock(&self.overlays);
        overlays.retain(|o| !o.is_retired());
        overlays.push(overlay.clone());
        overlay
    }
}
