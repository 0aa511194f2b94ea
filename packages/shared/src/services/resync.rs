use crate::models::clock::ClockSnapshot;
use crate::models::intent::responses::IntentOutcome;
use crate::models::log_entry::MatchLogEntry;
use crate::models::match_session::MatchPhase;
use crate::models::piece::Color;

/// Who is reading the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Player(Color),
    Spectator,
}

impl Viewer {
    /// Log a viewer reads. Spectators follow the white projection.
    pub fn projection(self) -> Color {
        match self {
            Viewer::Player(color) => color,
            Viewer::Spectator => Color::White,
        }
    }
}

/// Unpersisted tail of the two per-color logs. `*_base` is the length of
/// each log already in storage, so positions stay global.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResyncTape {
    white_base: usize,
    black_base: usize,
    white: Vec<MatchLogEntry>,
    black: Vec<MatchLogEntry>,
}

impl ResyncTape {
    pub fn resume(white_len: usize, black_len: usize) -> Self {
        ResyncTape {
            white_base: white_len,
            black_base: black_len,
            ..Self::default()
        }
    }

    /// Appends to both projections.
    pub fn append(&mut self, entry: MatchLogEntry) {
        self.black.push(entry.clone());
        self.white.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = MatchLogEntry>) {
        for entry in entries {
            self.append(entry);
        }
    }

    /// Appends to one projection only, for perspective-specific battle output.
    pub fn append_for(&mut self, color: Color, entry: MatchLogEntry) {
        match color {
            Color::White => self.white.push(entry),
            Color::Black => self.black.push(entry),
        }
    }

    pub fn base(&self, color: Color) -> usize {
        match color {
            Color::White => self.white_base,
            Color::Black => self.black_base,
        }
    }

    pub fn pending(&self, color: Color) -> &[MatchLogEntry] {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// Full log length of a projection, stored plus pending.
    pub fn cursor_for(&self, viewer: Viewer) -> usize {
        let color = viewer.projection();
        self.base(color) + self.pending(color).len()
    }

    /// Pending entries at or after the global position `cursor`.
    pub fn projection_from(
        &self,
        viewer: Viewer,
        cursor: usize,
    ) -> impl Iterator<Item = &MatchLogEntry> + '_ {
        let color = viewer.projection();
        let skip = cursor.saturating_sub(self.base(color));
        self.pending(color).iter().skip(skip)
    }

    pub fn is_empty(&self) -> bool {
        self.white.is_empty() && self.black.is_empty()
    }

    pub fn into_outcome(self, clock: ClockSnapshot, phase: MatchPhase) -> IntentOutcome {
        IntentOutcome {
            white: self.white,
            black: self.black,
            clock,
            phase,
            actor: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_reaches_both_projections() {
        let mut tape = ResyncTape::resume(3, 5);
        tape.append(MatchLogEntry::chess(Color::White, "e4", None));
        tape.append_for(Color::Black, MatchLogEntry::stream_output("|turn|1"));

        assert_eq!(tape.cursor_for(Viewer::Player(Color::White)), 4);
        assert_eq!(tape.cursor_for(Viewer::Player(Color::Black)), 7);
        assert_eq!(tape.cursor_for(Viewer::Spectator), 4);
        assert_eq!(tape.pending(Color::Black).len(), 2);
    }

    #[test]
    fn test_projection_from_uses_global_positions() {
        let mut tape = ResyncTape::resume(2, 2);
        tape.append(MatchLogEntry::chess(Color::White, "e4", None));
        tape.append(MatchLogEntry::chess(Color::Black, "e5", None));

        let tail: Vec<_> = tape
            .projection_from(Viewer::Player(Color::Black), 3)
            .cloned()
            .collect();
        assert_eq!(tail, vec![MatchLogEntry::chess(Color::Black, "e5", None)]);
        assert_eq!(tape.projection_from(Viewer::Spectator, 0).count(), 2);
    }
}
