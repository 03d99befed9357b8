use beatgrid_core::{
    Engine, Project,
    model::{INSTRUMENT_COUNT, NOTES_PER_OCTAVE, PianoNote, STEPS_PER_LOOP, note_frequency_hz},
};
use proptest::prelude::*;

#[test]
fn piano_roll_maps_rows_to_equal_temperament() {
    assert!((note_frequency_hz(11) - 261.63).abs() < 0.01);
    assert!((note_frequency_hz(0) - 261.63 * 2_f64.powf(11.0 / 12.0)).abs() < 0.01);
    assert!((PianoNote::new(5, 2).frequency_hz() - 261.63 * 2_f64.powf(9.0 / 12.0)).abs() < 0.01);
}

#[test]
fn double_click_on_a_note_leaves_the_roll_unchanged() {
    let mut engine = Engine::default();
    engine.toggle_note(2, 3).expect("valid note");
    engine.toggle_note(9, 0).expect("valid note");
    let before = engine.piano_notes().clone();

    assert!(engine.toggle_note(4, 7).expect("valid note"));
    assert!(!engine.toggle_note(4, 7).expect("valid note"));
    assert_eq!(engine.piano_notes(), &before);

    assert!(!engine.toggle_note(2, 3).expect("valid note"));
    assert!(!engine.piano_notes().contains(2, 3));
    assert!(engine.piano_notes().contains(9, 0));
}

#[test]
fn new_notes_are_one_step_long() {
    let mut engine = Engine::default();
    engine.toggle_note(15, 11).expect("valid note");
    assert_eq!(engine.piano_notes().notes(), &[PianoNote::new(15, 11)]);
    assert_eq!(engine.piano_notes().notes()[0].length, 1);
}

#[test]
fn json_round_trip_keeps_every_edit() {
    let mut engine = Engine::default();
    engine.toggle_step(1, 4).expect("valid cell");
    engine.toggle_note(6, 5).expect("valid note");
    engine.set_volume(2, 0.25).expect("valid volume");

    let json = engine.serialize_project().expect("project should serialize");
    let mut restored = Engine::default();
    let notices = restored.deserialize_project(&String::from_utf8_lossy(&json));

    assert!(notices.is_empty());
    assert_eq!(restored.project(), engine.project());
}

#[test]
fn empty_object_loads_the_initial_state() {
    let mut engine = Engine::default();
    engine.toggle_step(0, 0).expect("valid cell");
    let notices = engine.deserialize_project("{}");

    assert!(notices.is_empty());
    assert_eq!(engine.project(), &Project::default());
    assert!((engine.tempo() - 120.0).abs() < f64::EPSILON);
}

proptest! {
    #[test]
    fn toggling_a_cell_twice_restores_the_grid(
        instrument in 0..INSTRUMENT_COUNT,
        step in 0..STEPS_PER_LOOP,
        seed_cells in prop::collection::vec((0..INSTRUMENT_COUNT, 0..STEPS_PER_LOOP), 0..24),
    ) {
        let mut engine = Engine::default();
        for (row, column) in seed_cells {
            engine.toggle_step(row, column).expect("valid cell");
        }
        let before = engine.step_grid().clone();

        let first = engine.toggle_step(instrument, step).expect("valid cell");
        prop_assert_eq!(first, !before.is_active(instrument, step));
        engine.toggle_step(instrument, step).expect("valid cell");
        prop_assert_eq!(engine.step_grid(), &before);
    }

    #[test]
    fn notes_stay_unique_under_any_click_sequence(
        clicks in prop::collection::vec((0..STEPS_PER_LOOP, 0..NOTES_PER_OCTAVE), 0..64),
    ) {
        let mut engine = Engine::default();
        for (step, note_index) in clicks {
            engine.toggle_note(step, note_index).expect("valid note");
        }

        let notes = engine.piano_notes().notes();
        for (position, note) in notes.iter().enumerate() {
            prop_assert!(
                notes[position + 1..]
                    .iter()
                    .all(|other| (other.step, other.note_index) != (note.step, note.note_index))
            );
        }
    }
}
