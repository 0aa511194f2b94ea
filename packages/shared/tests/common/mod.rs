#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

use shared::models::clock::TimeSource;
use shared::models::intent::requests::StartMatchRequest;
use shared::models::log_entry::MatchLogEntry;
use shared::models::match_session::{MatchFormat, MatchOptions};
use shared::models::roster::CreatureRoster;
use shared::repositories::memory_match_repository::InMemoryMatchRepository;
use shared::services::auth_service::PlayerTokenService;
use shared::services::battle_bridge::{BattleBridge, BattleEngine, BattleProcess};
use shared::services::errors::battle_errors::BattleError;
use shared::services::match_service::MatchService;

pub const ROOM: &str = "room-1";
pub const WHITE: &str = "alice";
pub const BLACK: &str = "bob";

pub struct ManualTime(AtomicI64);

impl ManualTime {
    pub fn new(start: i64) -> Self {
        ManualTime(AtomicI64::new(start))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the scripted engine ends the turn it is asked to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AttackerWins,
    DefenderWins,
    Continue,
    RejectDefender,
    /// Stops before echoing the replay sentinel.
    Crash,
}

/// Holds one engine run after it has read its input.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// Stands in for the simulator: reads all input, then answers according to
/// the configured outcome. A fresh start only gets the opening output.
#[derive(Clone)]
pub struct ScriptedEngine {
    outcome: Arc<Mutex<Outcome>>,
    weather: Arc<Mutex<Option<String>>>,
    gate: Arc<Mutex<Option<Arc<Gate>>>>,
    pub inputs: Arc<Mutex<Vec<Vec<String>>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        ScriptedEngine {
            outcome: Arc::new(Mutex::new(Outcome::Continue)),
            weather: Arc::new(Mutex::new(None)),
            gate: Arc::new(Mutex::new(None)),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The next run waits on the returned gate before answering.
    pub fn hold_next_run(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn set_weather(&self, weather: Option<&str>) {
        *self.weather.lock().unwrap() = weather.map(str::to_string);
    }

    fn respond(&self, input: &[String]) -> Vec<String> {
        let outcome = *self.outcome.lock().unwrap();
        if outcome == Outcome::Crash {
            return vec!["update\n|turn|1".to_string()];
        }

        let names: Vec<String> = ["p1", "p2"]
            .iter()
            .map(|side| {
                input
                    .iter()
                    .find_map(|line| line.strip_prefix(&format!(">player {} ", side)))
                    .and_then(|json| serde_json::from_str::<serde_json::Value>(json).ok())
                    .and_then(|value| value["name"].as_str().map(str::to_string))
                    .unwrap_or_default()
            })
            .collect();

        let mut chunks = vec!["update\n|chat|replay-end".to_string()];
        // A fresh start sends the sentinel right after `>start`.
        let resuming = input.iter().position(|line| line == ">chat replay-end") != Some(1);
        if !resuming {
            chunks.push("update\n|switch|p1a: Attacker|Attacker|100/100\n|turn|1".to_string());
            return chunks;
        }

        if let Some(loser) = input.iter().find_map(|line| line.strip_prefix(">forcelose ")) {
            let winner = if loser == "p1" { &names[1] } else { &names[0] };
            chunks.push(format!("update\n|win|{}", winner));
            return chunks;
        }

        let mut turn = String::from("update\n|split|p2\n|-damage|p2a: Defender|40/200\n|-damage|p2a: Defender|20/100");
        if let Some(weather) = self.weather.lock().unwrap().as_ref() {
            turn.push_str(&format!("\n|-weather|{}", weather));
        }
        chunks.push(turn);
        match outcome {
            Outcome::AttackerWins => chunks.push(format!("update\n|win|{}", names[0])),
            Outcome::DefenderWins => chunks.push(format!("update\n|win|{}", names[1])),
            Outcome::RejectDefender => chunks.push(
                "sideupdate\np2\n|error|[Invalid choice] Can't move: no such move".to_string(),
            ),
            Outcome::Continue | Outcome::Crash => {}
        }
        chunks
    }
}

#[async_trait]
impl BattleEngine for ScriptedEngine {
    async fn spawn(&self) -> Result<BattleProcess, BattleError> {
        let (input_tx, mut input_rx) = mpsc::channel::<String>(64);
        let (output_tx, output_rx) = mpsc::channel::<String>(64);
        let engine = self.clone();
        let gate = self.gate.lock().unwrap().take();
        tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(line) = input_rx.recv().await {
                received.push(line);
            }
            if let Some(gate) = gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            let chunks = engine.respond(&received);
            engine.inputs.lock().unwrap().push(received);
            for chunk in chunks {
                if output_tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        Ok(BattleProcess {
            input: input_tx,
            output: output_rx,
        })
    }
}

pub struct Harness {
    pub service: MatchService,
    pub engine: ScriptedEngine,
    pub time: Arc<ManualTime>,
    pub repository: Arc<InMemoryMatchRepository>,
}

pub fn harness() -> Harness {
    let engine = ScriptedEngine::new();
    let time = Arc::new(ManualTime::new(1_700_000_000_000));
    let repository = Arc::new(InMemoryMatchRepository::new());
    let service = MatchService::new(
        repository.clone(),
        BattleBridge::new(Arc::new(engine.clone())),
        Arc::new(CreatureRoster::builtin()),
        time.clone(),
        Arc::new(PlayerTokenService::with_secret("integration-secret")),
    );
    Harness {
        service,
        engine,
        time,
        repository,
    }
}

pub fn start_request(format: MatchFormat, options: MatchOptions) -> StartMatchRequest {
    StartMatchRequest {
        room_id: ROOM.to_string(),
        white_player: WHITE.to_string(),
        black_player: BLACK.to_string(),
        format,
        options,
        seed: Some(20_240_601),
    }
}

/// Entries other than the per-intent clock record.
pub fn without_clock(entries: &[MatchLogEntry]) -> Vec<MatchLogEntry> {
    entries
        .iter()
        .filter(|entry| !entry.is_clock())
        .cloned()
        .collect()
}
