//! The join flow: decide whether a joining player gets packs, protect
//! them, and hand the packs to the delivery pipeline.

use std::sync::Arc;

use packshield_engine::EngineGateway;
use packshield_protection::ProtectionManager;
use packshield_tick::Scheduler;
use packshield_types::{DeliveryId, PackStatus, PlayerId};
use serde::{Deserialize, Serialize};

use crate::BridgeDetector;

/// A resource pack as the pipeline describes it.
///
/// `id` doubles as the delivery id: the client echoes it back in every
/// status report about this pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackDescriptor {
    pub id: DeliveryId,
    pub name: String,
    pub url: String,
}

impl PackDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: DeliveryId::random(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Where packs come from and how they reach the client.
///
/// Enumerating, caching and transmitting packs is the host plugin's job;
/// this is the seam the join flow calls through.
pub trait DeliveryPipeline: Send + Sync + 'static {
    /// Packs every player receives on join.
    fn packs_for_join(&self) -> Vec<PackDescriptor>;

    /// Starts sending `packs` to `player`.
    fn send(&self, player: PlayerId, packs: &[PackDescriptor]);
}

/// What [`JoinListener::on_join`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The player is on a bridged client; nothing was sent.
    SkippedBridged,
    /// The pipeline had nothing to send.
    NoPacks,
    /// This many packs were sent and the player is protected.
    Sent(usize),
}

/// Handles player joins and client pack status reports.
pub struct JoinListener<E: EngineGateway, S: Scheduler, P> {
    manager: ProtectionManager<E, S>,
    pipeline: Arc<P>,
    detector: Arc<BridgeDetector>,
    detect_bridged: bool,
}

impl<E, S, P> JoinListener<E, S, P>
where
    E: EngineGateway,
    S: Scheduler,
    P: DeliveryPipeline,
{
    pub fn new(
        manager: ProtectionManager<E, S>,
        pipeline: Arc<P>,
        detector: Arc<BridgeDetector>,
        detect_bridged: bool,
    ) -> Self {
        Self {
            manager,
            pipeline,
            detector,
            detect_bridged,
        }
    }

    pub fn on_join(&self, player: PlayerId) -> JoinOutcome {
        tracing::info!(%player, "player joined");

        if self.detect_bridged && self.detector.is_bridged(player) {
            tracing::info!(%player, "bridged client, skipping resource packs");
            return JoinOutcome::SkippedBridged;
        }

        let packs = self.pipeline.packs_for_join();
        if packs.is_empty() {
            tracing::info!(%player, "no packs to load on join");
            return JoinOutcome::NoPacks;
        }

        let names: Vec<&str> = packs.iter().map(|p| p.name.as_str()).collect();
        tracing::info!(%player, count = packs.len(), packs = %names.join(", "), "sending packs");

        // Protect before sending, so a status report that arrives
        // immediately already finds the episode.
        self.manager
            .begin_protection(Some(player), packs.iter().map(|p| p.id));
        self.pipeline.send(player, &packs);
        JoinOutcome::Sent(packs.len())
    }

    /// Forwards final pack statuses to the manager. Intermediate ones
    /// (accepted, downloaded) are ignored.
    pub fn on_pack_status(&self, player: PlayerId, delivery: DeliveryId, status: PackStatus) {
        tracing::debug!(%player, %delivery, ?status, "pack status");
        if status.is_final() {
            self.manager.on_pack_processed(player, delivery);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use packshield_engine::MemoryEngine;
    use packshield_protection::ProtectionConfig;
    use packshield_tick::ManualScheduler;
    use packshield_types::Location;
    use packshield_types::MoveEvent;

    use super::*;
    use crate::{FnProbe, Probe};

    #[derive(Default)]
    struct RecordingPipeline {
        packs: Vec<PackDescriptor>,
        sent: Mutex<Vec<(PlayerId, usize)>>,
    }

    impl DeliveryPipeline for RecordingPipeline {
        fn packs_for_join(&self) -> Vec<PackDescriptor> {
            self.packs.clone()
        }

        fn send(&self, player: PlayerId, packs: &[PackDescriptor]) {
            self.sent.lock().unwrap().push((player, packs.len()));
        }
    }

    struct Setup {
        engine: Arc<MemoryEngine>,
        pipeline: Arc<RecordingPipeline>,
        join: JoinListener<MemoryEngine, ManualScheduler, RecordingPipeline>,
        manager: ProtectionManager<MemoryEngine, ManualScheduler>,
    }

    fn setup(packs: Vec<PackDescriptor>, detector: BridgeDetector, detect: bool) -> Setup {
        let engine = Arc::new(MemoryEngine::new());
        let manager = ProtectionManager::new(
            Arc::clone(&engine),
            Arc::new(ManualScheduler::new()),
            ProtectionConfig::default(),
        );
        let pipeline = Arc::new(RecordingPipeline {
            packs,
            ..RecordingPipeline::default()
        });
        let join = JoinListener::new(
            manager.clone(),
            Arc::clone(&pipeline),
            Arc::new(detector),
            detect,
        );
        Setup {
            engine,
            pipeline,
            join,
            manager,
        }
    }

    fn two_packs() -> Vec<PackDescriptor> {
        vec![
            PackDescriptor::new("base", "https://packs.example/base.zip"),
            PackDescriptor::new("music", "https://packs.example/music.zip"),
        ]
    }

    fn bedrock_detector() -> BridgeDetector {
        BridgeDetector::new().with_strategy(0, FnProbe::new("always", |_| Ok(Probe::Bridged)))
    }

    #[test]
    fn test_on_join_protects_then_sends() {
        let packs = two_packs();
        let s = setup(packs.clone(), BridgeDetector::new(), true);
        let p = PlayerId::random();
        s.engine.connect(p);

        assert_eq!(s.join.on_join(p), JoinOutcome::Sent(2));
        assert!(s.manager.is_protected(p));
        assert_eq!(s.pipeline.sent.lock().unwrap().as_slice(), &[(p, 2)]);

        let pending = s.manager.status(p).unwrap().pending_deliveries;
        assert!(packs.iter().all(|pack| pending.contains(&pack.id)));
    }

    #[test]
    fn test_on_join_skips_bridged_client() {
        let s = setup(two_packs(), bedrock_detector(), true);
        let p = PlayerId::random();
        s.engine.connect(p);

        assert_eq!(s.join.on_join(p), JoinOutcome::SkippedBridged);
        assert!(!s.manager.is_protected(p));
        assert!(s.pipeline.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_on_join_detection_disabled_sends_to_everyone() {
        let s = setup(two_packs(), bedrock_detector(), false);
        let p = PlayerId::random();
        s.engine.connect(p);

        assert_eq!(s.join.on_join(p), JoinOutcome::Sent(2));
    }

    #[test]
    fn test_on_join_without_packs_does_nothing() {
        let s = setup(Vec::new(), BridgeDetector::new(), true);
        let p = PlayerId::random();
        s.engine.connect(p);

        assert_eq!(s.join.on_join(p), JoinOutcome::NoPacks);
        assert!(!s.manager.is_protected(p));
        assert!(s.pipeline.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_on_pack_status_only_final_statuses_resolve() {
        let packs = vec![PackDescriptor::new("base", "https://packs.example/base.zip")];
        let id = packs[0].id;
        let s = setup(packs, BridgeDetector::new(), true);
        let p = PlayerId::random();
        s.engine.connect(p);
        s.join.on_join(p);
        s.manager.on_player_move(&MoveEvent::new(
            p,
            Location::at(0.0, 64.0, 0.0),
            Location::at(1.0, 64.0, 0.0),
        ));

        s.join.on_pack_status(p, id, PackStatus::Accepted);
        s.join.on_pack_status(p, id, PackStatus::Downloaded);
        assert!(s.manager.is_protected(p));

        s.join.on_pack_status(p, id, PackStatus::Loaded);
        assert!(!s.manager.is_protected(p));
    }

    #[test]
    fn test_on_pack_status_failure_counts_as_resolved() {
        let packs = vec![PackDescriptor::new("base", "https://packs.example/base.zip")];
        let id = packs[0].id;
        let s = setup(packs, BridgeDetector::new(), true);
        let p = PlayerId::random();
        s.engine.connect(p);
        s.join.on_join(p);

        s.join.on_pack_status(p, id, PackStatus::FailedDownload);
        assert!(s.manager.status(p).unwrap().all_pending_resolved);
    }
}
