//! End-to-end tests: a plugin enabled on a `MemoryEngine`, driven the way
//! a host server would drive it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use packshield::prelude::*;
use packshield::{ConfigError, ShieldError};

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct StaticPipeline {
    packs: Vec<PackDescriptor>,
    sent: Mutex<Vec<PlayerId>>,
}

impl StaticPipeline {
    fn with_packs(names: &[&str]) -> Self {
        Self {
            packs: names
                .iter()
                .map(|name| PackDescriptor::new(*name, format!("https://packs.example/{name}.zip")))
                .collect(),
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl DeliveryPipeline for StaticPipeline {
    fn packs_for_join(&self) -> Vec<PackDescriptor> {
        self.packs.clone()
    }

    fn send(&self, player: PlayerId, _packs: &[PackDescriptor]) {
        self.sent.lock().unwrap().push(player);
    }
}

fn step(player: PlayerId) -> MoveEvent {
    MoveEvent::new(player, Location::at(0.0, 64.0, 0.0), Location::at(0.0, 64.0, 1.0))
}

// =========================================================================
// Lifecycle
// =========================================================================

#[test]
fn test_full_join_flow_releases_after_packs_and_movement() {
    let pipeline = StaticPipeline::with_packs(&["base", "sounds"]);
    let ids: Vec<DeliveryId> = pipeline.packs.iter().map(|p| p.id).collect();
    let engine = Arc::new(MemoryEngine::new());
    let scheduler = Arc::new(ManualScheduler::new());
    let shield = PackShieldBuilder::new(pipeline).enable(Arc::clone(&engine), Arc::clone(&scheduler));

    let p = PlayerId::random();
    engine.connect(p);
    assert_eq!(shield.join_listener().on_join(p), JoinOutcome::Sent(2));
    assert!(shield.listener().on_damage(p).is_cancelled());

    shield.join_listener().on_pack_status(p, ids[0], PackStatus::Loaded);
    shield.listener().on_move(&step(p));
    assert!(shield.manager().is_protected(p));

    shield.join_listener().on_pack_status(p, ids[1], PackStatus::Declined);
    assert!(!shield.manager().is_protected(p));
    assert_eq!(shield.listener().on_damage(p), EventOutcome::Allow);
    assert_eq!(shield.listener().on_velocity(p), EventOutcome::Allow);
}

#[test]
fn test_quit_clears_protection() {
    let engine = Arc::new(MemoryEngine::new());
    let shield = PackShieldBuilder::new(StaticPipeline::with_packs(&["base"]))
        .enable(Arc::clone(&engine), Arc::new(ManualScheduler::new()));
    let p = PlayerId::random();
    engine.connect(p);
    shield.join_listener().on_join(p);

    shield.listener().on_quit(p);

    assert!(!shield.manager().is_protected(p));
    assert!(!engine.player(p).unwrap().invulnerable);
    assert!(engine.overlays_viewed_by(p).is_empty());
}

#[test]
fn test_disable_restores_protected_players() {
    let engine = Arc::new(MemoryEngine::new());
    let shield = PackShieldBuilder::new(StaticPipeline::with_packs(&["base"]))
        .enable(Arc::clone(&engine), Arc::new(ManualScheduler::new()));
    let players: Vec<PlayerId> = (0..3).map(|_| PlayerId::random()).collect();
    for &p in &players {
        engine.connect(p);
        shield.join_listener().on_join(p);
    }
    let manager = shield.manager().clone();

    assert_eq!(shield.disable(), 3);

    for p in players {
        let record = engine.player(p).unwrap();
        assert!(!record.invulnerable);
        assert!(record.collidable);
        assert!(!manager.is_protected(p));
    }
}

#[test]
fn test_config_disables_bridged_detection() {
    let engine = Arc::new(MemoryEngine::new());
    let config = ShieldConfig::from_json_str(r#"{ "detect_bridged_clients": false }"#).unwrap();
    let shield = PackShieldBuilder::new(StaticPipeline::with_packs(&["base"]))
        .config(config)
        .probe(0, FnProbe::new("always", |_| Ok(Probe::Bridged)))
        .enable(Arc::clone(&engine), Arc::new(ManualScheduler::new()));
    let p = PlayerId::random();
    engine.connect(p);

    assert_eq!(shield.join_listener().on_join(p), JoinOutcome::Sent(1));
}

#[test]
fn test_probe_skips_bridged_player() {
    let bedrock = PlayerId::random();
    let engine = Arc::new(MemoryEngine::new());
    let shield = PackShieldBuilder::new(StaticPipeline::with_packs(&["base"]))
        .probe(
            10,
            FnProbe::new("floodgate", move |p| {
                Ok(if p == bedrock { Probe::Bridged } else { Probe::Unknown })
            }),
        )
        .probe(
            0,
            FnProbe::new("missing", |_| {
                Err(ProbeError::Unavailable {
                    strategy: "missing".into(),
                    reason: "not installed".into(),
                })
            }),
        )
        .enable(Arc::clone(&engine), Arc::new(ManualScheduler::new()));
    let java = PlayerId::random();
    engine.connect(bedrock);
    engine.connect(java);

    assert_eq!(shield.join_listener().on_join(bedrock), JoinOutcome::SkippedBridged);
    assert_eq!(shield.join_listener().on_join(java), JoinOutcome::Sent(1));
}

#[test]
fn test_config_file_missing_is_error() {
    let result = PackShieldBuilder::new(StaticPipeline::default()).config_file("/nope/config.json");
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_enable_on_current_runtime_outside_runtime_fails() {
    let engine = Arc::new(MemoryEngine::new());
    let result = PackShieldBuilder::new(StaticPipeline::default()).enable_on_current_runtime(engine);
    assert!(matches!(result, Err(ShieldError::NoRuntime)));
}

// =========================================================================
// On a Tokio runtime
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_enable_on_current_runtime_fallback_uses_virtual_time() {
    let engine = Arc::new(MemoryEngine::new());
    let shield = PackShieldBuilder::new(StaticPipeline::with_packs(&["base"]))
        .enable_on_current_runtime(Arc::clone(&engine))
        .unwrap();
    let p = PlayerId::random();
    engine.connect(p);
    shield.join_listener().on_join(p);

    tokio::time::sleep(Duration::from_secs(19)).await;
    assert!(shield.manager().is_protected(p));

    tokio::time::sleep(Duration::from_millis(1_010)).await;
    assert!(!shield.manager().is_protected(p));
    assert!(shield.manager().has_release_countdown(p));

    tokio::time::sleep(Duration::from_millis(5_010)).await;
    assert!(!shield.manager().has_overlay(p));
}
