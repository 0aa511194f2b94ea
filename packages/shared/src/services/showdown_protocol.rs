//! Line protocol spoken with the battle simulator.
//!
//! Input is one command per line (`>start {...}`, `>player p1 {...}`,
//! `>p1 move 1`). Output arrives in chunks whose first line names the chunk:
//! `update` for the shared battle log, `sideupdate` followed by `p1`/`p2` for
//! one side's private data, and `end` for the final summary.

use serde_json::json;
use std::collections::BTreeMap;

use crate::models::modifier::{SquareModifier, Terrain, Weather};
use crate::models::piece::Color;

/// Marks the point after which output is new to the participants.
pub const REPLAY_SENTINEL: &str = "replay-end";

pub const FORFEIT: &str = "forfeit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    P1,
    P2,
}

impl Side {
    pub fn id(self) -> &'static str {
        match self {
            Side::P1 => "p1",
            Side::P2 => "p2",
        }
    }

    pub fn from_id(id: &str) -> Option<Side> {
        match id {
            "p1" => Some(Side::P1),
            "p2" => Some(Side::P2),
            _ => None,
        }
    }

    pub fn other(self) -> Side {
        match self {
            Side::P1 => Side::P2,
            Side::P2 => Side::P1,
        }
    }
}

/// The capturing color always plays as p1.
pub fn side_of(color: Color, attacker: Color) -> Side {
    if color == attacker {
        Side::P1
    } else {
        Side::P2
    }
}

pub fn start_command(format_id: &str, seed: [u16; 4]) -> String {
    format!(">start {}", json!({ "formatid": format_id, "seed": seed }))
}

pub fn player_command(side: Side, name: &str, packed_team: &str) -> String {
    format!(
        ">player {} {}",
        side.id(),
        json!({ "name": name, "team": packed_team })
    )
}

pub fn team_command(side: Side) -> String {
    format!(">{} team 1", side.id())
}

pub fn boost_command(side: Side, boosts: &BTreeMap<String, i8>) -> Option<String> {
    if boosts.is_empty() {
        return None;
    }
    Some(format!(
        ">eval battle.boost({}, battle.{}.active[0])",
        json!(boosts),
        side.id()
    ))
}

pub fn field_commands(field: &SquareModifier) -> Vec<String> {
    let mut commands = Vec::new();
    if let Some(weather) = field.weather {
        commands.push(format!(
            ">eval battle.field.setWeather('{}')",
            weather.effect.showdown_id()
        ));
    }
    if let Some(terrain) = field.terrain {
        commands.push(format!(
            ">eval battle.field.setTerrain('{}')",
            terrain.effect.showdown_id()
        ));
    }
    commands
}

pub fn choice_command(side: Side, choice: &str) -> String {
    format!(">{} {}", side.id(), choice)
}

pub fn forfeit_command(side: Side) -> String {
    format!(">forcelose {}", side.id())
}

pub fn sentinel_command() -> String {
    format!(">chat {}", REPLAY_SENTINEL)
}

/// Accepts `move 1` through `move 4` and `forfeit`.
pub fn is_valid_choice(choice: &str) -> bool {
    if choice == FORFEIT {
        return true;
    }
    match choice.strip_prefix("move ") {
        Some(slot) => matches!(slot, "1" | "2" | "3" | "4"),
        None => false,
    }
}

/// One output chunk split into what each audience may see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Demuxed {
    pub omniscient: Vec<String>,
    pub p1: Vec<String>,
    pub p2: Vec<String>,
}

impl Demuxed {
    fn push_all(&mut self, line: &str) {
        self.omniscient.push(line.to_string());
        self.p1.push(line.to_string());
        self.p2.push(line.to_string());
    }

    fn side_mut(&mut self, side: Side) -> &mut Vec<String> {
        match side {
            Side::P1 => &mut self.p1,
            Side::P2 => &mut self.p2,
        }
    }

    pub fn side(&self, side: Side) -> &[String] {
        match side {
            Side::P1 => &self.p1,
            Side::P2 => &self.p2,
        }
    }
}

/// Splits an output chunk into the omniscient, p1 and p2 channels. In an
/// `update` chunk, `|split|pN` means the next line is exact (omniscient and
/// pN) and the one after it is the public version (the other side).
pub fn demux(chunk: &str) -> Demuxed {
    let mut out = Demuxed::default();
    let mut lines = chunk.lines();
    match lines.next() {
        Some("update") => {
            while let Some(line) = lines.next() {
                match line.strip_prefix("|split|").and_then(Side::from_id) {
                    Some(side) => {
                        if let Some(secret) = lines.next() {
                            out.omniscient.push(secret.to_string());
                            out.side_mut(side).push(secret.to_string());
                        }
                        if let Some(public) = lines.next() {
                            out.side_mut(side.other()).push(public.to_string());
                        }
                    }
                    None => out.push_all(line),
                }
            }
        }
        Some("sideupdate") => {
            if let Some(side) = lines.next().and_then(Side::from_id) {
                for line in lines {
                    out.side_mut(side).push(line.to_string());
                }
            }
        }
        _ => {}
    }
    out
}

/// Reassembles chunks from raw output lines. A chunk ends at a blank line or
/// when the next chunk header appears.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    current: Vec<String>,
}

impl ChunkAssembler {
    pub fn push(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.finish();
        }
        let flushed = if is_header(line) { self.finish() } else { None };
        self.current.push(line.to_string());
        flushed
    }

    pub fn finish(&mut self) -> Option<String> {
        if self.current.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.current).join("\n"))
        }
    }
}

fn is_header(line: &str) -> bool {
    matches!(line, "update" | "sideupdate" | "end")
}

pub fn is_sentinel(line: &str) -> bool {
    line.strip_prefix("|chat|") == Some(REPLAY_SENTINEL)
}

pub fn is_error(line: &str) -> bool {
    line.starts_with("|error|")
}

/// Winner name from `|win|NAME`.
pub fn parse_win(line: &str) -> Option<&str> {
    line.strip_prefix("|win|")
}

/// Field change announced by a battle log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLine {
    Weather(Option<Weather>),
    Terrain(Option<Terrain>),
}

pub fn parse_field(line: &str) -> Option<FieldLine> {
    let mut parts = line.split('|').skip(1);
    match parts.next()? {
        "-weather" => {
            let name = parts.next()?;
            if name == "none" {
                Some(FieldLine::Weather(None))
            } else {
                Weather::from_protocol(name).map(|weather| FieldLine::Weather(Some(weather)))
            }
        }
        "-fieldstart" => {
            Terrain::from_protocol(parts.next()?).map(|terrain| FieldLine::Terrain(Some(terrain)))
        }
        "-fieldend" => {
            let name = parts.next()?;
            Terrain::from_protocol(name).map(|_| FieldLine::Terrain(None))
        }
        _ => None,
    }
}

/// Synthetic lines shown when `side` forfeits.
pub fn forfeit_chunk(side: Side, species: &str) -> String {
    format!(
        "|-damage|{id}a: {species}|0 fnt\n|faint|{id}a: {species}",
        id = side.id(),
        species = species
    )
}
