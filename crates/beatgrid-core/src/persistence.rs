use std::{fmt, fs, io::Write, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::model::{
    DEFAULT_BPM, INSTRUMENT_COUNT, MAX_BPM, MIN_BPM, NOTES_PER_OCTAVE, PianoNote, PianoRoll,
    Project, STEPS_PER_LOOP, StepGrid, Volumes, is_valid_bpm,
};

/// Non-fatal problem found while loading a project. The affected field has
/// already fallen back to its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadNotice {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for LoadNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedProject {
    pub project: Project,
    pub notices: Vec<LoadNotice>,
}

impl LoadedProject {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.notices.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNote {
    step: i64,
    note_index: i64,
    #[serde(default = "default_note_length")]
    length: i64,
}

const fn default_note_length() -> i64 {
    1
}

pub fn project_to_json(project: &Project) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(project).context("failed to serialize project")
}

/// Parses project JSON field by field. Never fails: anything missing or
/// malformed falls back to the initial-state default and is reported as a
/// notice.
#[must_use]
pub fn deserialize_project(raw: &str) -> LoadedProject {
    let mut notices = Vec::new();
    let root = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(root)) => root,
        Ok(other) => {
            notices.push(notice("project", format!("expected an object, found {}", kind_of(&other))));
            Map::new()
        }
        Err(error) => {
            notices.push(notice("project", format!("invalid json: {error}")));
            Map::new()
        }
    };

    let project = Project {
        bpm: read_bpm(root.get("bpm"), &mut notices),
        sequence: read_sequence(root.get("sequence"), &mut notices),
        piano_notes: read_piano_notes(root.get("pianoNotes"), &mut notices),
        volumes: read_volumes(root.get("volumes"), &mut notices),
    };

    for entry in &notices {
        warn!(field = entry.field, message = %entry.message, "project field defaulted");
    }
    LoadedProject { project, notices }
}

fn read_bpm(value: Option<&Value>, notices: &mut Vec<LoadNotice>) -> f64 {
    let parsed = match value {
        None | Some(Value::Null) => return DEFAULT_BPM,
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(bpm) if is_valid_bpm(bpm) => bpm,
        _ => {
            notices.push(notice(
                "bpm",
                format!("tempo must be a number in {MIN_BPM}..={MAX_BPM}"),
            ));
            DEFAULT_BPM
        }
    }
}

fn read_sequence(value: Option<&Value>, notices: &mut Vec<LoadNotice>) -> StepGrid {
    let rows = match value {
        None | Some(Value::Null) => return StepGrid::default(),
        Some(Value::Array(rows)) => rows,
        Some(other) => {
            notices.push(notice("sequence", format!("expected an array, found {}", kind_of(other))));
            return StepGrid::default();
        }
    };

    if rows.len() > INSTRUMENT_COUNT {
        notices.push(notice(
            "sequence",
            format!("ignored {} extra rows", rows.len() - INSTRUMENT_COUNT),
        ));
    }

    let mut malformed_cells = 0_usize;
    let mut parsed = Vec::with_capacity(INSTRUMENT_COUNT);
    for row in rows.iter().take(INSTRUMENT_COUNT) {
        let mut cells = [false; STEPS_PER_LOOP];
        match row {
            Value::Array(values) => {
                for (cell, value) in cells.iter_mut().zip(values) {
                    match value {
                        Value::Bool(active) => *cell = *active,
                        _ => malformed_cells += 1,
                    }
                }
                malformed_cells += values.len().saturating_sub(STEPS_PER_LOOP);
            }
            _ => malformed_cells += STEPS_PER_LOOP,
        }
        parsed.push(cells);
    }

    if malformed_cells > 0 {
        notices.push(notice(
            "sequence",
            format!("{malformed_cells} cells were not booleans and were cleared"),
        ));
    }
    StepGrid::from_rows(parsed)
}

fn read_piano_notes(value: Option<&Value>, notices: &mut Vec<LoadNotice>) -> PianoRoll {
    let entries = match value {
        None | Some(Value::Null) => return PianoRoll::default(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            notices.push(notice("pianoNotes", format!("expected an array, found {}", kind_of(other))));
            return PianoRoll::default();
        }
    };

    let mut roll = PianoRoll::default();
    let mut dropped = 0_usize;
    for entry in entries {
        let note = RawNote::deserialize(entry)
            .ok()
            .and_then(|raw| validated_note(&raw));
        match note {
            Some(note) if roll.insert_unique(note) => {}
            _ => dropped += 1,
        }
    }

    if dropped > 0 {
        notices.push(notice(
            "pianoNotes",
            format!("dropped {dropped} invalid or duplicate notes"),
        ));
    }
    roll
}

fn validated_note(raw: &RawNote) -> Option<PianoNote> {
    let step = usize::try_from(raw.step).ok().filter(|step| *step < STEPS_PER_LOOP)?;
    let note_index = usize::try_from(raw.note_index)
        .ok()
        .filter(|index| *index < NOTES_PER_OCTAVE)?;
    let length = u32::try_from(raw.length).ok().filter(|length| *length >= 1)?;
    Some(PianoNote {
        step,
        note_index,
        length,
    })
}

fn read_volumes(value: Option<&Value>, notices: &mut Vec<LoadNotice>) -> Volumes {
    let mut volumes = Volumes::default();
    let entries = match value {
        None | Some(Value::Null) => return volumes,
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            notices.push(notice("volumes", format!("expected an array, found {}", kind_of(other))));
            return volumes;
        }
    };

    let mut malformed = 0_usize;
    for (instrument, entry) in entries.iter().enumerate().take(INSTRUMENT_COUNT) {
        match entry.as_f64() {
            Some(volume) if volume.is_finite() => {
                volumes.set(instrument, volume as f32);
            }
            _ => malformed += 1,
        }
    }

    if malformed > 0 {
        notices.push(notice(
            "volumes",
            format!("{malformed} entries were not numbers and kept their default"),
        ));
    }
    volumes
}

fn notice(field: &'static str, message: impl Into<String>) -> LoadNotice {
    LoadNotice {
        field,
        message: message.into(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[instrument(skip(project), fields(path = %path.display(), bpm = project.bpm))]
pub fn save_project(path: &Path, project: &Project) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }

    let json = project_to_json(project)?;
    let mut temp_file = tempfile::NamedTempFile::new_in(
        path.parent()
            .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf),
    )
    .context("failed to create temp project file")?;

    temp_file
        .write_all(&json)
        .context("failed to write temp project file")?;
    temp_file
        .persist(path)
        .map_err(|error| anyhow::anyhow!(error.error))
        .with_context(|| format!("failed to persist project: {}", path.display()))?;

    info!("project saved");
    Ok(())
}

/// Reading the file can fail; its contents cannot.
#[instrument(fields(path = %path.display()))]
pub fn load_project(path: &Path) -> Result<LoadedProject> {
    let content = fs::read(path)
        .with_context(|| format!("failed to read project: {}", path.display()))?;
    let text = String::from_utf8_lossy(&content);
    let loaded = deserialize_project(&text);
    debug!(notices = loaded.notices.len(), "project parsed");
    info!(bpm = loaded.project.bpm, "project loaded");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_VOLUME;

    #[test]
    fn empty_object_yields_initial_state() {
        let loaded = deserialize_project("{}");
        assert!(loaded.is_clean());
        assert_eq!(loaded.project, Project::default());
        assert!((loaded.project.bpm - 120.0).abs() < f64::EPSILON);
        assert!(loaded.project.sequence.is_empty());
        assert!(loaded.project.piano_notes.is_empty());
        assert_eq!(loaded.project.volumes, Volumes::uniform(DEFAULT_VOLUME));
    }

    #[test]
    fn string_tempo_from_form_input_is_accepted() {
        let loaded = deserialize_project(r#"{"bpm":"96"}"#);
        assert!((loaded.project.bpm - 96.0).abs() < f64::EPSILON);
    }

    #[test]
    fn tempo_outside_the_playable_range_is_replaced() {
        for raw in [r#"{"bpm":1e-6}"#, r#"{"bpm":1e11}"#, r#"{"bpm":"5"}"#] {
            let loaded = deserialize_project(raw);
            assert!((loaded.project.bpm - DEFAULT_BPM).abs() < f64::EPSILON, "input {raw}");
            assert_eq!(loaded.notices.len(), 1);
            assert_eq!(loaded.notices[0].field, "bpm");
        }
    }

    #[test]
    fn each_field_defaults_independently() {
        let loaded = deserialize_project(
            r#"{
                "bpm": -4,
                "sequence": [[true, false, "yes"], [false, true]],
                "pianoNotes": [
                    {"step": 2, "noteIndex": 5, "length": 1},
                    {"step": 2, "noteIndex": 5, "length": 2},
                    {"step": 40, "noteIndex": 1},
                    {"step": 3, "noteIndex": 0}
                ],
                "volumes": [0.2, "loud", 4.0]
            }"#,
        );

        let project = &loaded.project;
        assert!((project.bpm - DEFAULT_BPM).abs() < f64::EPSILON);
        assert!(project.sequence.is_active(0, 0));
        assert!(!project.sequence.is_active(0, 2));
        assert!(project.sequence.is_active(1, 1));
        assert_eq!(project.piano_notes.len(), 2);
        assert_eq!(project.piano_notes.notes()[1].length, 1);
        assert!((project.volumes.get(0) - 0.2).abs() < f32::EPSILON);
        assert!((project.volumes.get(1) - DEFAULT_VOLUME).abs() < f32::EPSILON);
        assert!((project.volumes.get(2) - 1.0).abs() < f32::EPSILON);

        let fields: Vec<&str> = loaded.notices.iter().map(|entry| entry.field).collect();
        assert_eq!(fields, vec!["bpm", "sequence", "pianoNotes", "volumes"]);
    }

    #[test]
    fn garbage_input_falls_back_to_defaults() {
        for raw in ["", "null", "[1,2,3]", "{\"bpm\":", "\u{0}\u{1}"] {
            let loaded = deserialize_project(raw);
            assert_eq!(loaded.project, Project::default(), "input {raw:?}");
            assert!(!loaded.is_clean());
        }
    }
}
