//! Host callbacks that re-enter the manager while an episode is ending.
//!
//! A real server may fire a quit or a join event synchronously from inside
//! a flag setter. `HookEngine` reproduces that: it wraps a `MemoryEngine`
//! and runs a one-shot hook right after the invulnerable flag is turned
//! off, which only happens while flags are being restored.
//!
//! Each scenario runs on a worker thread with a deadline, so a deadlock
//! fails the test instead of hanging the suite.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use packshield_engine::{EngineGateway, MemoryEngine, MemoryOverlay, PlayerRecord};
use packshield_protection::{
    FALLBACK_TIMEOUT, ProtectionConfig, ProtectionManager, ProtectionMessages,
};
use packshield_tick::ManualScheduler;
use packshield_types::{DeliveryId, Location, MoveEvent, OverlayColor, OverlayStyle, PlayerId};

// =========================================================================
// Helpers
// =========================================================================

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct HookEngine {
    inner: MemoryEngine,
    on_vulnerable: Mutex<Option<Hook>>,
}

impl HookEngine {
    /// Runs `hook` once, the next time some player is made vulnerable.
    fn when_made_vulnerable(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_vulnerable.lock().unwrap() = Some(Box::new(hook));
    }
}

impl EngineGateway for HookEngine {
    type Overlay = MemoryOverlay;

    fn is_online(&self, player: PlayerId) -> bool {
        self.inner.is_online(player)
    }

    fn is_invulnerable(&self, player: PlayerId) -> Option<bool> {
        self.inner.is_invulnerable(player)
    }

    fn set_invulnerable(&self, player: PlayerId, invulnerable: bool) {
        self.inner.set_invulnerable(player, invulnerable);
        if !invulnerable {
            let hook = self.on_vulnerable.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
        }
    }

    fn is_collidable(&self, player: PlayerId) -> Option<bool> {
        self.inner.is_collidable(player)
    }

    fn set_collidable(&self, player: PlayerId, collidable: bool) {
        self.inner.set_collidable(player, collidable);
    }

    fn set_fire_ticks(&self, player: PlayerId, ticks: i32) {
        self.inner.set_fire_ticks(player, ticks);
    }

    fn set_remaining_air(&self, player: PlayerId, air: i32) {
        self.inner.set_remaining_air(player, air);
    }

    fn maximum_air(&self, player: PlayerId) -> Option<i32> {
        self.inner.maximum_air(player)
    }

    fn send_message(&self, player: PlayerId, text: &str) {
        self.inner.send_message(player, text);
    }

    fn create_overlay(&self, color: OverlayColor, style: OverlayStyle) -> MemoryOverlay {
        self.inner.create_overlay(color, style)
    }
}

type Manager = ProtectionManager<HookEngine, ManualScheduler>;

struct Harness {
    engine: Arc<HookEngine>,
    scheduler: Arc<ManualScheduler>,
    manager: Manager,
}

impl Harness {
    fn new() -> Self {
        let engine = Arc::new(HookEngine::default());
        let scheduler = Arc::new(ManualScheduler::new());
        let manager = ProtectionManager::new(
            Arc::clone(&engine),
            Arc::clone(&scheduler),
            ProtectionConfig::default(),
        );
        Self {
            engine,
            scheduler,
            manager,
        }
    }

    fn join(&self) -> PlayerId {
        let player = PlayerId::random();
        self.engine.inner.connect(player);
        player
    }

    fn record(&self, player: PlayerId) -> PlayerRecord {
        self.engine.inner.player(player).expect("player should be online")
    }

    fn count_messages(&self, player: PlayerId, text: &str) -> usize {
        self.engine
            .inner
            .messages(player)
            .iter()
            .filter(|m| m.as_str() == text)
            .count()
    }
}

fn walk(manager: &Manager, player: PlayerId) {
    manager.on_player_move(&MoveEvent::new(
        player,
        Location::at(0.0, 64.0, 0.0),
        Location::at(0.5, 64.0, 0.0),
    ));
}

fn messages() -> ProtectionMessages {
    ProtectionMessages::default()
}

/// Runs `f` on its own thread and fails if it does not return in time.
fn run_with_deadline(f: impl FnOnce() + Send + 'static) {
    let (done, finished) = mpsc::channel();
    let worker = thread::spawn(move || {
        f();
        let _ = done.send(());
    });
    match finished.recv_timeout(Duration::from_secs(5)) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            worker.join().expect("worker panicked");
        }
        Err(RecvTimeoutError::Timeout) => panic!("manager call did not return"),
    }
}

// =========================================================================
// clear() from inside a release
// =========================================================================

#[test]
fn test_clear_during_release_finishes_restore_without_overlay() {
    let h = Harness::new();
    let p = h.join();
    let a = DeliveryId::random();
    h.manager.begin_protection(Some(p), [a]);

    let manager = h.manager.clone();
    h.engine.when_made_vulnerable(move || manager.clear(p));

    let manager = h.manager.clone();
    run_with_deadline(move || {
        manager.on_pack_processed(p, a);
        walk(&manager, p);
    });

    assert!(!h.manager.is_protected(p));
    let record = h.record(p);
    assert!(!record.invulnerable);
    assert!(record.collidable, "restore continued after the callback");
    assert!(!h.manager.has_overlay(p));
    assert_eq!(h.count_messages(p, &messages().released), 0);
    assert_eq!(h.scheduler.pending(), 0);
}

#[test]
fn test_quit_during_fallback_release_leaves_nothing_behind() {
    let h = Harness::new();
    let p = h.join();
    h.manager.begin_protection(Some(p), [DeliveryId::random()]);

    let (engine, manager) = (Arc::clone(&h.engine), h.manager.clone());
    h.engine.when_made_vulnerable(move || {
        engine.inner.disconnect(p);
        manager.clear(p);
    });

    let scheduler = Arc::clone(&h.scheduler);
    run_with_deadline(move || scheduler.advance(FALLBACK_TIMEOUT));

    assert!(!h.manager.is_protected(p));
    assert!(h.manager.protected_players().is_empty());
    assert!(!h.manager.has_overlay(p));
    assert_eq!(h.scheduler.pending(), 0);
}

// =========================================================================
// begin_protection() from inside a release
// =========================================================================

#[test]
fn test_rejoin_during_release_starts_episode_after_restore() {
    let h = Harness::new();
    let p = h.join();
    let (a, b) = (DeliveryId::random(), DeliveryId::random());
    h.manager.begin_protection(Some(p), [a]);

    let manager = h.manager.clone();
    h.engine.when_made_vulnerable(move || manager.begin_protection(Some(p), [b]));

    let manager = h.manager.clone();
    run_with_deadline(move || {
        manager.on_pack_processed(p, a);
        walk(&manager, p);
    });

    let status = h.manager.status(p).expect("second episode should be active");
    assert_eq!(status.pending_deliveries, vec![b]);
    assert!(!status.movement_seen);
    let record = h.record(p);
    assert!(record.invulnerable);
    assert!(!record.collidable);
    assert!(h.manager.has_overlay(p));
    assert!(!h.manager.has_release_countdown(p));
    assert_eq!(h.count_messages(p, &messages().released), 1);
    assert_eq!(h.count_messages(p, &messages().enabled), 2);

    // The second episode snapshotted fully restored flags.
    h.manager.on_pack_processed(p, b);
    walk(&h.manager, p);
    let record = h.record(p);
    assert!(!record.invulnerable);
    assert!(record.collidable);
    assert_eq!(h.count_messages(p, &messages().interference), 0);
}

#[test]
fn test_begin_during_clear_starts_fresh_episode() {
    let h = Harness::new();
    let p = h.join();
    let (a, b) = (DeliveryId::random(), DeliveryId::random());
    h.manager.begin_protection(Some(p), [a]);

    let manager = h.manager.clone();
    h.engine.when_made_vulnerable(move || manager.begin_protection(Some(p), [b]));

    let manager = h.manager.clone();
    run_with_deadline(move || manager.clear(p));

    let status = h.manager.status(p).expect("new episode should be active");
    assert_eq!(status.pending_deliveries, vec![b]);
    assert!(h.record(p).invulnerable);
    assert!(h.manager.has_overlay(p));
    assert!(!h.manager.has_release_countdown(p));
}
