use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::models::match_session::BattleTurn;
use crate::models::modifier::{SquareModifier, Terrain, Weather};
use crate::models::piece::{Color, CreatureSet};
use crate::services::errors::battle_errors::BattleError;
use crate::services::showdown_protocol::{
    boost_command, choice_command, demux, field_commands, forfeit_chunk, forfeit_command,
    is_error, is_sentinel, parse_field, parse_win, player_command, sentinel_command, side_of,
    start_command, team_command, FieldLine, Side, FORFEIT,
};

/// A running simulator instance: lines go in, output chunks come out. The
/// engine treats a dropped `input` as end of input and closes `output` once
/// it has flushed everything.
pub struct BattleProcess {
    pub input: mpsc::Sender<String>,
    pub output: mpsc::Receiver<String>,
}

#[async_trait]
pub trait BattleEngine: Send + Sync {
    async fn spawn(&self) -> Result<BattleProcess, BattleError>;
}

/// Everything needed to rebuild one capture battle up to its current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleSetup {
    pub format_id: String,
    pub seed: [u16; 4],
    pub attacker: Color,
    pub attacker_creature: CreatureSet,
    pub defender_creature: CreatureSet,
    pub offense_advantage: BTreeMap<String, i8>,
    pub field: Option<SquareModifier>,
    pub history: Vec<BattleTurn>,
    /// Choices to play after the replayed history. `None` starts the battle.
    pub next: Option<BattleTurn>,
    pub timeout_ms: u64,
}

impl BattleSetup {
    fn color_of(&self, side: Side) -> Color {
        match side {
            Side::P1 => self.attacker,
            Side::P2 => self.attacker.opposite(),
        }
    }

    fn creature(&self, side: Side) -> &CreatureSet {
        match side {
            Side::P1 => &self.attacker_creature,
            Side::P2 => &self.defender_creature,
        }
    }

    /// The forfeiting side of the next turn. The attacker's forfeit wins a tie.
    pub fn forfeiting(&self) -> Option<Side> {
        let next = self.next.as_ref()?;
        [Side::P1, Side::P2]
            .into_iter()
            .find(|side| next.choice(self.color_of(*side)) == FORFEIT)
    }

    pub fn input_lines(&self) -> Vec<String> {
        let resuming = self.next.is_some();
        let mut lines = vec![start_command(&self.format_id, self.seed)];
        if !resuming {
            lines.push(sentinel_command());
        }

        for side in [Side::P1, Side::P2] {
            lines.push(player_command(
                side,
                self.color_of(side).name(),
                &self.creature(side).packed,
            ));
        }
        for side in [Side::P1, Side::P2] {
            lines.push(team_command(side));
        }
        lines.extend(boost_command(Side::P1, &self.offense_advantage));
        if let Some(field) = &self.field {
            lines.extend(field_commands(field));
        }

        if let Some(next) = &self.next {
            for turn in &self.history {
                for side in [Side::P1, Side::P2] {
                    lines.push(choice_command(side, turn.choice(self.color_of(side))));
                }
            }
            lines.push(sentinel_command());
            match self.forfeiting() {
                Some(side) => lines.push(forfeit_command(side)),
                None => {
                    for side in [Side::P1, Side::P2] {
                        lines.push(choice_command(side, next.choice(self.color_of(side))));
                    }
                }
            }
        }
        lines
    }
}

/// Final weather and terrain reported by the battle. The outer `Option` is
/// `None` when the stream never mentioned that field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldReport {
    pub weather: Option<Option<Weather>>,
    pub terrain: Option<Option<Terrain>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleReport {
    pub white_chunks: Vec<String>,
    pub black_chunks: Vec<String>,
    pub winner: Option<Color>,
    pub field: FieldReport,
    /// Side whose choice the engine refused.
    pub rejected: Option<Color>,
}

impl BattleReport {
    pub fn chunks_for(&self, color: Color) -> &[String] {
        match color {
            Color::White => &self.white_chunks,
            Color::Black => &self.black_chunks,
        }
    }
}

struct OmniscientScan {
    sentinel_seen: bool,
    field: FieldReport,
}

struct SideScan {
    chunks: Vec<String>,
    rejected: bool,
}

#[derive(Clone)]
pub struct BattleBridge {
    engine: Arc<dyn BattleEngine + Send + Sync>,
}

impl BattleBridge {
    pub fn new(engine: Arc<dyn BattleEngine + Send + Sync>) -> Self {
        BattleBridge { engine }
    }

    pub async fn run(&self, setup: &BattleSetup) -> Result<BattleReport, BattleError> {
        let deadline = Duration::from_millis(setup.timeout_ms);
        match tokio::time::timeout(deadline, self.drive(setup)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = setup.timeout_ms, "Battle engine timed out");
                Err(BattleError::Timeout(setup.timeout_ms))
            }
        }
    }

    async fn drive(&self, setup: &BattleSetup) -> Result<BattleReport, BattleError> {
        let BattleProcess { input, mut output } = self.engine.spawn().await?;
        let lines = setup.input_lines();
        let resuming = setup.next.is_some();

        let (omniscient_tx, omniscient_rx) = mpsc::unbounded_channel::<Vec<String>>();
        let (p1_tx, p1_rx) = mpsc::unbounded_channel::<Vec<String>>();
        let (p2_tx, p2_rx) = mpsc::unbounded_channel::<Vec<String>>();
        let (winner_tx, winner_rx) = oneshot::channel::<Color>();

        let writer = async move {
            for line in lines {
                input
                    .send(line)
                    .await
                    .map_err(|_| BattleError::Io("engine stopped accepting input".to_string()))?;
            }
            Ok::<(), BattleError>(())
        };

        let demuxer = async move {
            while let Some(chunk) = output.recv().await {
                let split = demux(&chunk);
                for (tx, lines) in [
                    (&omniscient_tx, split.omniscient),
                    (&p1_tx, split.p1),
                    (&p2_tx, split.p2),
                ] {
                    if !lines.is_empty() {
                        let _ = tx.send(lines);
                    }
                }
            }
        };

        let (written, (), omniscient, p1, p2) = tokio::join!(
            writer,
            demuxer,
            scan_omniscient(omniscient_rx, winner_tx),
            collect_side(p1_rx, resuming),
            collect_side(p2_rx, resuming),
        );
        written?;

        if !omniscient.sentinel_seen {
            return Err(BattleError::Incomplete);
        }
        let winner = winner_rx.await.ok();

        let mut sides = [(Side::P1, p1), (Side::P2, p2)];
        if let Some(side) = setup.forfeiting() {
            let synthetic = forfeit_chunk(side, &setup.creature(side).species);
            for (_, scan) in sides.iter_mut() {
                scan.chunks.insert(0, synthetic.clone());
            }
        }

        let rejected = sides
            .iter()
            .find(|(_, scan)| scan.rejected)
            .map(|(side, _)| setup.color_of(*side));

        let [(_, p1), (_, p2)] = sides;
        let (white, black) = match side_of(Color::White, setup.attacker) {
            Side::P1 => (p1, p2),
            Side::P2 => (p2, p1),
        };

        if let Some(color) = winner {
            info!(winner = %color, attacker = %setup.attacker, "Battle decided");
        }

        Ok(BattleReport {
            white_chunks: white.chunks,
            black_chunks: black.chunks,
            winner,
            field: omniscient.field,
            rejected,
        })
    }
}

async fn scan_omniscient(
    mut rx: mpsc::UnboundedReceiver<Vec<String>>,
    winner_tx: oneshot::Sender<Color>,
) -> OmniscientScan {
    let mut winner_tx = Some(winner_tx);
    let mut scan = OmniscientScan {
        sentinel_seen: false,
        field: FieldReport::default(),
    };

    while let Some(lines) = rx.recv().await {
        for line in lines {
            debug!(line = %line, "battle");
            if is_sentinel(&line) {
                scan.sentinel_seen = true;
            } else if let Some(name) = parse_win(&line) {
                let color = [Color::White, Color::Black]
                    .into_iter()
                    .find(|color| color.name() == name);
                if let (Some(color), Some(tx)) = (color, winner_tx.take()) {
                    let _ = tx.send(color);
                }
            } else if let Some(field) = parse_field(&line) {
                match field {
                    FieldLine::Weather(weather) => scan.field.weather = Some(weather),
                    FieldLine::Terrain(terrain) => scan.field.terrain = Some(terrain),
                }
            }
        }
    }
    scan
}

/// Keeps the lines a side sees after the replay sentinel, one chunk per
/// engine chunk.
async fn collect_side(mut rx: mpsc::UnboundedReceiver<Vec<String>>, resuming: bool) -> SideScan {
    let mut replayed = false;
    let mut scan = SideScan {
        chunks: Vec::new(),
        rejected: false,
    };

    while let Some(lines) = rx.recv().await {
        let mut fresh = Vec::new();
        for line in lines {
            if !replayed {
                replayed = is_sentinel(&line);
                continue;
            }
            if resuming && is_error(&line) {
                scan.rejected = true;
            }
            fresh.push(line);
        }
        if !fresh.is_empty() {
            scan.chunks.push(fresh.join("\n"));
        }
    }
    scan
}
