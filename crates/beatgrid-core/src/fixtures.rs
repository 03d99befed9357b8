use crate::model::{
    DEFAULT_VOLUME, PianoNote, PianoRoll, Project, STEPS_PER_LOOP, StepGrid, Volumes,
};

const DEMO_BPM: f64 = 118.0;
const DEMO_MELODY: [(usize, usize); 6] = [(0, 4), (3, 7), (6, 4), (8, 2), (11, 7), (14, 9)];

/// Fixed project used by the CLI and the scenario tests. Kick on every beat
/// with a backbeat snare over eighth-note hats.
#[must_use]
pub fn demo_project() -> Project {
    let kick: [bool; STEPS_PER_LOOP] = std::array::from_fn(|step| step % 4 == 0);
    let snare: [bool; STEPS_PER_LOOP] = std::array::from_fn(|step| step % 8 == 4);
    let hats: [bool; STEPS_PER_LOOP] = std::array::from_fn(|step| step % 2 == 0);
    let synth: [bool; STEPS_PER_LOOP] = std::array::from_fn(|step| step == 15);

    let mut piano_notes = PianoRoll::default();
    for (step, note_index) in DEMO_MELODY {
        piano_notes.insert_unique(PianoNote::new(step, note_index));
    }

    let mut volumes = Volumes::default();
    volumes.set(0, 0.9);
    volumes.set(2, 0.45);

    Project {
        bpm: DEMO_BPM,
        sequence: StepGrid::from_rows(vec![kick, snare, hats, synth]),
        piano_notes,
        volumes,
    }
}

/// Kick on step 0 and nothing else.
#[must_use]
pub fn single_kick_project(bpm: f64) -> Project {
    let mut project = Project::new(bpm, DEFAULT_VOLUME);
    project.sequence.toggle(0, 0);
    project
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_pattern_has_expected_density() {
        let project = demo_project();
        assert_eq!(project.sequence.active_count(), 4 + 2 + 8 + 1);
        assert_eq!(project.piano_notes.len(), DEMO_MELODY.len());
        assert!(project.sequence.is_active(1, 12));
        assert!(!project.sequence.is_active(1, 8));
    }
}
