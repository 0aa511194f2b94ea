use chess::{Square, ALL_SQUARES};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Longest duration the packed persistence format can hold.
pub const MAX_DURATION: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    SunnyDay,
    RainDance,
    Sandstorm,
    Snow,
}

impl Weather {
    pub const ALL: [Weather; 4] = [
        Weather::SunnyDay,
        Weather::RainDance,
        Weather::Sandstorm,
        Weather::Snow,
    ];

    pub fn id(self) -> u8 {
        match self {
            Weather::SunnyDay => 1,
            Weather::RainDance => 2,
            Weather::Sandstorm => 3,
            Weather::Snow => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Weather> {
        Weather::ALL.into_iter().find(|weather| weather.id() == id)
    }

    /// Name used by the battle protocol, e.g. `|-weather|RainDance`.
    pub fn protocol_name(self) -> &'static str {
        match self {
            Weather::SunnyDay => "SunnyDay",
            Weather::RainDance => "RainDance",
            Weather::Sandstorm => "Sandstorm",
            Weather::Snow => "Snow",
        }
    }

    pub fn from_protocol(name: &str) -> Option<Weather> {
        match name {
            "SunnyDay" | "DesolateLand" => Some(Weather::SunnyDay),
            "RainDance" | "PrimordialSea" => Some(Weather::RainDance),
            "Sandstorm" => Some(Weather::Sandstorm),
            "Snow" | "Snowscape" | "Hail" => Some(Weather::Snow),
            _ => None,
        }
    }

    pub fn showdown_id(self) -> &'static str {
        match self {
            Weather::SunnyDay => "sunnyday",
            Weather::RainDance => "raindance",
            Weather::Sandstorm => "sandstorm",
            Weather::Snow => "snow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    #[serde(rename = "electricterrain")]
    Electric,
    #[serde(rename = "grassyterrain")]
    Grassy,
    #[serde(rename = "mistyterrain")]
    Misty,
    #[serde(rename = "psychicterrain")]
    Psychic,
}

impl Terrain {
    pub const ALL: [Terrain; 4] = [
        Terrain::Electric,
        Terrain::Grassy,
        Terrain::Misty,
        Terrain::Psychic,
    ];

    pub fn id(self) -> u8 {
        match self {
            Terrain::Electric => 1,
            Terrain::Grassy => 2,
            Terrain::Misty => 3,
            Terrain::Psychic => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Terrain> {
        Terrain::ALL.into_iter().find(|terrain| terrain.id() == id)
    }

    /// Name used by `|-fieldstart|move: Electric Terrain`.
    pub fn protocol_name(self) -> &'static str {
        match self {
            Terrain::Electric => "Electric Terrain",
            Terrain::Grassy => "Grassy Terrain",
            Terrain::Misty => "Misty Terrain",
            Terrain::Psychic => "Psychic Terrain",
        }
    }

    pub fn from_protocol(name: &str) -> Option<Terrain> {
        let name = name.trim_start_matches("move: ");
        Terrain::ALL
            .into_iter()
            .find(|terrain| terrain.protocol_name() == name)
    }

    pub fn showdown_id(self) -> &'static str {
        match self {
            Terrain::Electric => "electricterrain",
            Terrain::Grassy => "grassyterrain",
            Terrain::Misty => "mistyterrain",
            Terrain::Psychic => "psychicterrain",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEffect<T> {
    pub effect: T,
    pub duration: u8,
}

impl<T> TimedEffect<T> {
    pub fn new(effect: T, duration: u8) -> Self {
        TimedEffect {
            effect,
            duration: duration.min(MAX_DURATION),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareModifier {
    pub weather: Option<TimedEffect<Weather>>,
    pub terrain: Option<TimedEffect<Terrain>>,
}

impl SquareModifier {
    pub fn is_empty(&self) -> bool {
        self.weather.is_none() && self.terrain.is_none()
    }

    /// One turn cycle passes: both durations drop by one and any effect that
    /// reaches zero is gone.
    pub fn tick(&mut self) {
        if let Some(weather) = self.weather.as_mut() {
            weather.duration = weather.duration.saturating_sub(1);
            if weather.duration == 0 {
                self.weather = None;
            }
        }
        if let Some(terrain) = self.terrain.as_mut() {
            terrain.duration = terrain.duration.saturating_sub(1);
            if terrain.duration == 0 {
                self.terrain = None;
            }
        }
    }
}

/// Weather and terrain effects bound to board squares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifierLayer {
    squares: BTreeMap<u8, SquareModifier>,
}

impl ModifierLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, square: Square) -> Option<&SquareModifier> {
        self.squares.get(&(square.to_index() as u8))
    }

    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    /// Replaces the modifier on a square; an empty modifier clears it.
    pub fn set(&mut self, square: Square, modifier: SquareModifier) {
        let key = square.to_index() as u8;
        if modifier.is_empty() {
            self.squares.remove(&key);
        } else {
            self.squares.insert(key, modifier);
        }
    }

    pub fn clear(&mut self, square: Square) {
        self.squares.remove(&(square.to_index() as u8));
    }

    pub fn set_weather(&mut self, square: Square, weather: Weather, duration: u8) {
        let mut modifier = self.get(square).copied().unwrap_or_default();
        modifier.weather = Some(TimedEffect::new(weather, duration));
        self.set(square, modifier);
    }

    pub fn set_terrain(&mut self, square: Square, terrain: Terrain, duration: u8) {
        let mut modifier = self.get(square).copied().unwrap_or_default();
        modifier.terrain = Some(TimedEffect::new(terrain, duration));
        self.set(square, modifier);
    }

    /// Ticks one square. Returns true when anything on it changed.
    pub fn tick(&mut self, square: Square) -> bool {
        match self.get(square).copied() {
            Some(mut modifier) => {
                modifier.tick();
                self.set(square, modifier);
                true
            }
            None => false,
        }
    }

    /// Spawns effects on unmodified squares until `target_count` squares
    /// carry one. Returns the squares that gained an effect.
    pub fn create_new_modifiers<R: Rng>(
        &mut self,
        rng: &mut R,
        target_count: usize,
        durations: RangeInclusive<u8>,
    ) -> Vec<Square> {
        let mut free: Vec<Square> = ALL_SQUARES
            .iter()
            .copied()
            .filter(|square| self.get(*square).is_none())
            .collect();
        free.shuffle(rng);

        let mut created = Vec::new();
        for square in free {
            if self.len() >= target_count {
                break;
            }
            let duration = rng.gen_range(durations.clone());
            let mut modifier = SquareModifier::default();
            if rng.gen_bool(0.5) {
                let weather = *Weather::ALL.choose(rng).unwrap_or(&Weather::SunnyDay);
                modifier.weather = Some(TimedEffect::new(weather, duration));
            } else {
                let terrain = *Terrain::ALL.choose(rng).unwrap_or(&Terrain::Electric);
                modifier.terrain = Some(TimedEffect::new(terrain, duration));
            }
            self.set(square, modifier);
            created.push(square);
        }
        created
    }

    /// Packs every modified square into three bytes: the square index, then
    /// weather id and duration as two nibbles, then terrain id and duration.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.squares.len() * 3);
        for (index, modifier) in &self.squares {
            let weather = modifier
                .weather
                .map(|w| (w.effect.id() << 4) | w.duration.min(MAX_DURATION))
                .unwrap_or(0);
            let terrain = modifier
                .terrain
                .map(|t| (t.effect.id() << 4) | t.duration.min(MAX_DURATION))
                .unwrap_or(0);
            bytes.extend_from_slice(&[*index, weather, terrain]);
        }
        bytes
    }

    /// Inverse of [`ModifierLayer::to_bytes`]. Unknown ids and trailing
    /// partial records are dropped.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut layer = ModifierLayer::new();
        for record in bytes.chunks_exact(3) {
            let index = record[0] as usize;
            if index >= ALL_SQUARES.len() {
                continue;
            }
            let weather = Weather::from_id(record[1] >> 4)
                .map(|weather| TimedEffect::new(weather, record[1] & 0x0f))
                .filter(|effect| effect.duration > 0);
            let terrain = Terrain::from_id(record[2] >> 4)
                .map(|terrain| TimedEffect::new(terrain, record[2] & 0x0f))
                .filter(|effect| effect.duration > 0);
            layer.set(ALL_SQUARES[index], SquareModifier { weather, terrain });
        }
        layer
    }
}
