use serde::Serialize;

use crate::time;

pub const STEPS_PER_LOOP: usize = 16;
pub const NOTES_PER_OCTAVE: usize = 12;
pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;
pub const DEFAULT_VOLUME: f32 = 0.7;
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const REFERENCE_PITCH_HZ: f64 = 261.63;
pub const SYNTH_INSTRUMENT_INDEX: usize = 3;

#[must_use]
pub fn is_valid_bpm(bpm: f64) -> bool {
    (MIN_BPM..=MAX_BPM).contains(&bpm)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisKind {
    Kick,
    Snare,
    HiHat,
    Synth,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Instrument {
    pub name: &'static str,
    pub base_frequency: f64,
    pub kind: SynthesisKind,
}

/// Fixed instrument catalog. Row order in the step grid and the mixer follows
/// this order; [`SYNTH_INSTRUMENT_INDEX`] is the tonal voice the piano roll uses.
pub const INSTRUMENTS: [Instrument; 4] = [
    Instrument {
        name: "Kick",
        base_frequency: 150.0,
        kind: SynthesisKind::Kick,
    },
    Instrument {
        name: "Snare",
        base_frequency: 100.0,
        kind: SynthesisKind::Snare,
    },
    Instrument {
        name: "HiHat",
        base_frequency: 6_000.0,
        kind: SynthesisKind::HiHat,
    },
    Instrument {
        name: "Synth",
        base_frequency: 440.0,
        kind: SynthesisKind::Synth,
    },
];

pub const INSTRUMENT_COUNT: usize = INSTRUMENTS.len();

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StepGrid {
    rows: Vec<[bool; STEPS_PER_LOOP]>,
}

impl Default for StepGrid {
    fn default() -> Self {
        Self {
            rows: vec![[false; STEPS_PER_LOOP]; INSTRUMENT_COUNT],
        }
    }
}

impl StepGrid {
    /// Builds a grid from loaded rows, padding or truncating to the catalog size.
    #[must_use]
    pub fn from_rows(mut rows: Vec<[bool; STEPS_PER_LOOP]>) -> Self {
        rows.resize(INSTRUMENT_COUNT, [false; STEPS_PER_LOOP]);
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[[bool; STEPS_PER_LOOP]] {
        &self.rows
    }

    #[must_use]
    pub fn is_active(&self, instrument: usize, step: usize) -> bool {
        self.rows
            .get(instrument)
            .is_some_and(|row| row[step % STEPS_PER_LOOP])
    }

    /// Flips one cell and returns its new value, or `None` when either index
    /// is outside the grid.
    pub fn toggle(&mut self, instrument: usize, step: usize) -> Option<bool> {
        if step >= STEPS_PER_LOOP {
            return None;
        }
        let cell = self.rows.get_mut(instrument)?.get_mut(step)?;
        *cell = !*cell;
        Some(*cell)
    }

    pub fn active_instruments(&self, step: usize) -> impl Iterator<Item = usize> + '_ {
        let step = step % STEPS_PER_LOOP;
        self.rows
            .iter()
            .enumerate()
            .filter(move |(_, row)| row[step])
            .map(|(instrument, _)| instrument)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.iter().all(|cell| !cell))
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.rows
            .iter()
            .map(|row| row.iter().filter(|cell| **cell).count())
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PianoNote {
    pub step: usize,
    pub note_index: usize,
    /// Persisted for file compatibility; voices always run their fixed lifetime.
    pub length: u32,
}

impl PianoNote {
    #[must_use]
    pub fn new(step: usize, note_index: usize) -> Self {
        Self {
            step,
            note_index,
            length: 1,
        }
    }

    #[must_use]
    pub fn frequency_hz(&self) -> f64 {
        note_frequency_hz(self.note_index)
    }
}

/// Row 0 is the top of the piano roll (highest pitch); row 11 is the reference pitch.
#[must_use]
pub fn note_frequency_hz(note_index: usize) -> f64 {
    let semitones = (NOTES_PER_OCTAVE - 1) as f64 - note_index as f64;
    REFERENCE_PITCH_HZ * 2_f64.powf(semitones / NOTES_PER_OCTAVE as f64)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PianoRoll {
    notes: Vec<PianoNote>,
}

impl PianoRoll {
    #[must_use]
    pub fn notes(&self) -> &[PianoNote] {
        &self.notes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, step: usize, note_index: usize) -> bool {
        self.position(step, note_index).is_some()
    }

    /// Removes the note at `(step, note_index)` if present, otherwise inserts a
    /// one-step note there. Returns `true` when a note was inserted.
    pub fn toggle(&mut self, step: usize, note_index: usize) -> bool {
        if let Some(index) = self.position(step, note_index) {
            self.notes.remove(index);
            false
        } else {
            self.notes.push(PianoNote::new(step, note_index));
            true
        }
    }

    pub fn insert_unique(&mut self, note: PianoNote) -> bool {
        if self.contains(note.step, note.note_index) {
            return false;
        }
        self.notes.push(note);
        true
    }

    pub fn notes_at(&self, step: usize) -> impl Iterator<Item = &PianoNote> + '_ {
        let step = step % STEPS_PER_LOOP;
        self.notes.iter().filter(move |note| note.step == step)
    }

    fn position(&self, step: usize, note_index: usize) -> Option<usize> {
        self.notes
            .iter()
            .position(|note| note.step == step && note.note_index == note_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Volumes([f32; INSTRUMENT_COUNT]);

impl Default for Volumes {
    fn default() -> Self {
        Self::uniform(DEFAULT_VOLUME)
    }
}

impl Volumes {
    #[must_use]
    pub fn uniform(volume: f32) -> Self {
        Self([volume.clamp(0.0, 1.0); INSTRUMENT_COUNT])
    }

    /// Clamped gain for `instrument`; unknown instruments are silent.
    #[must_use]
    pub fn get(&self, instrument: usize) -> f32 {
        self.0
            .get(instrument)
            .map_or(0.0, |volume| volume.clamp(0.0, 1.0))
    }

    pub fn set(&mut self, instrument: usize, volume: f32) -> Option<f32> {
        let slot = self.0.get_mut(instrument)?;
        *slot = volume.clamp(0.0, 1.0);
        Some(*slot)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub bpm: f64,
    pub sequence: StepGrid,
    #[serde(rename = "pianoNotes")]
    pub piano_notes: PianoRoll,
    pub volumes: Volumes,
}

impl Default for Project {
    fn default() -> Self {
        Self::new(DEFAULT_BPM, DEFAULT_VOLUME)
    }
}

impl Project {
    #[must_use]
    pub fn new(bpm: f64, default_volume: f32) -> Self {
        Self {
            bpm: if is_valid_bpm(bpm) {
                bpm
            } else {
                DEFAULT_BPM
            },
            sequence: StepGrid::default(),
            piano_notes: PianoRoll::default(),
            volumes: Volumes::uniform(default_volume),
        }
    }

    #[must_use]
    pub fn step_duration_seconds(&self) -> f64 {
        time::step_duration_seconds(self.bpm)
    }

    #[must_use]
    pub fn trigger_count(&self) -> usize {
        self.sequence.active_count() + self.piano_notes.len()
    }
}
