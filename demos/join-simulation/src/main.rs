//! Simulates a wave of players joining a server running PackShield.
//!
//! Every player gets a random number of packs and a random behavior, so a
//! single run exercises every way an episode can end. Time is driven by a
//! `ManualScheduler`, one server tick per loop iteration.
//!
//! ```text
//! cargo run -p join-simulation -- [players] [seed]
//! RUST_LOG=debug cargo run -p join-simulation
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use packshield::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Hands out a fixed pack list; "sending" just records who got what.
struct ServerPacks {
    packs: Vec<PackDescriptor>,
}

impl DeliveryPipeline for ServerPacks {
    fn packs_for_join(&self) -> Vec<PackDescriptor> {
        self.packs.clone()
    }

    fn send(&self, player: PlayerId, packs: &[PackDescriptor]) {
        tracing::debug!(%player, count = packs.len(), "packs queued for download");
    }
}

// ---------------------------------------------------------------------------
// Simulated clients
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Behavior {
    /// Loads every pack, then walks off.
    Cooperative,
    /// Walks around while packs are still loading.
    Impatient,
    /// Loads the packs but never moves (AFK on the loading screen).
    Frozen,
    /// Disconnects halfway through.
    Quitter,
    /// A god-mode plugin flips invulnerability mid-episode.
    Meddled,
    /// On a bridged client; never receives packs.
    Bridged,
}

const BEHAVIORS: [Behavior; 6] = [
    Behavior::Cooperative,
    Behavior::Impatient,
    Behavior::Frozen,
    Behavior::Quitter,
    Behavior::Meddled,
    Behavior::Bridged,
];

/// One pending client action, due on a given tick.
enum Action {
    Report(DeliveryId, PackStatus),
    Move,
    Quit,
    Meddle,
}

struct Client {
    player: PlayerId,
    behavior: Behavior,
    script: Vec<(u64, Action)>,
}

fn script_for(
    rng: &mut StdRng,
    behavior: Behavior,
    packs: &[PackDescriptor],
) -> Vec<(u64, Action)> {
    let mut script = Vec::new();
    let mut t = 0;
    for pack in packs {
        t += rng.random_range(10..60);
        script.push((t, Action::Report(pack.id, PackStatus::Accepted)));
        t += rng.random_range(5..40);
        let outcome = if rng.random_bool(0.9) {
            PackStatus::Loaded
        } else {
            PackStatus::FailedDownload
        };
        script.push((t, Action::Report(pack.id, outcome)));
    }

    match behavior {
        Behavior::Cooperative | Behavior::Meddled => script.push((t + 5, Action::Move)),
        Behavior::Impatient => script.push((rng.random_range(1..10), Action::Move)),
        Behavior::Frozen | Behavior::Bridged => {}
        Behavior::Quitter => {
            let cut = t / 2;
            script.retain(|(at, _)| *at < cut);
            script.push((cut, Action::Quit));
        }
    }
    if behavior == Behavior::Meddled {
        script.push((t / 2, Action::Meddle));
    }
    script.sort_by_key(|(at, _)| *at);
    script
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<(), ShieldError> {
    let mut args = std::env::args().skip(1);
    let players: usize = args.next().and_then(|a| a.parse().ok()).unwrap_or(12);
    let seed: u64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(7);

    let config = ShieldConfig::default();
    packshield::init_tracing(&config.log_filter)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let packs: Vec<PackDescriptor> = ["base", "models", "sounds"]
        .iter()
        .map(|name| PackDescriptor::new(*name, format!("https://packs.example/{name}.zip")))
        .collect();

    let engine = Arc::new(MemoryEngine::new());
    let scheduler = Arc::new(ManualScheduler::new());

    // Decide every client up front so the bridged probe can see them.
    let clients: Vec<Client> = (0..players)
        .map(|_| {
            let behavior = BEHAVIORS[rng.random_range(0..BEHAVIORS.len())];
            let pack_count = rng.random_range(1..=packs.len());
            Client {
                player: PlayerId::random(),
                behavior,
                script: script_for(&mut rng, behavior, &packs[..pack_count]),
            }
        })
        .collect();
    let bridged: Vec<PlayerId> = clients
        .iter()
        .filter(|c| c.behavior == Behavior::Bridged)
        .map(|c| c.player)
        .collect();

    let shield = PackShieldBuilder::new(ServerPacks {
        packs: packs.clone(),
    })
    .config(config)
    .probe(
        0,
        FnProbe::new("simulated-bridge", move |player| {
            Ok(if bridged.contains(&player) {
                Probe::Bridged
            } else {
                Probe::Native
            })
        }),
    )
    .enable(Arc::clone(&engine), Arc::clone(&scheduler));

    let mut outcomes: HashMap<Behavior, Vec<JoinOutcome>> = HashMap::new();
    let mut queue: Vec<(u64, PlayerId, Action)> = Vec::new();
    for client in clients {
        engine.connect(client.player);
        let outcome = shield.join_listener().on_join(client.player);
        outcomes.entry(client.behavior).or_default().push(outcome);
        queue.extend(
            client
                .script
                .into_iter()
                .map(|(at, action)| (at, client.player, action)),
        );
    }
    queue.sort_by_key(|(at, _, _)| std::cmp::Reverse(*at));

    let horizon = shield.config().protection.fallback_timeout.get()
        + shield.config().protection.release_countdown.get()
        + 1;
    for tick in 0..=horizon {
        while queue.last().is_some_and(|(at, _, _)| *at <= tick) {
            let Some((_, player, action)) = queue.pop() else {
                break;
            };
            match action {
                Action::Report(delivery, status) => {
                    shield.join_listener().on_pack_status(player, delivery, status);
                }
                Action::Move => shield.listener().on_move(&MoveEvent::new(
                    player,
                    Location::at(0.0, 64.0, 0.0),
                    Location::at(0.0, 64.0, 1.0),
                )),
                Action::Quit => {
                    shield.listener().on_quit(player);
                    engine.disconnect(player);
                }
                Action::Meddle => {
                    engine.set_invulnerable(player, false);
                }
            }
        }
        scheduler.advance(Ticks::ONE);
    }

    let mut behaviors: Vec<_> = outcomes.into_iter().collect();
    behaviors.sort_by_key(|(b, _)| format!("{b:?}"));
    for (behavior, joins) in behaviors {
        tracing::info!(?behavior, players = joins.len(), ?joins, "summary");
    }
    tracing::info!(
        still_protected = shield.manager().protected_players().len(),
        ticks = scheduler.now().get(),
        "simulation finished"
    );

    shield.disable();
    Ok(())
}
