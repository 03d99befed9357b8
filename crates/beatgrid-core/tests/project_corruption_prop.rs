use beatgrid_core::{
    Project,
    fixtures::demo_project,
    model::{INSTRUMENT_COUNT, NOTES_PER_OCTAVE, STEPS_PER_LOOP, is_valid_bpm},
    persistence::{deserialize_project, load_project, project_to_json, save_project},
};
use proptest::prelude::*;

fn assert_well_formed(project: &Project) {
    assert!(is_valid_bpm(project.bpm));
    assert_eq!(project.sequence.rows().len(), INSTRUMENT_COUNT);
    for note in project.piano_notes.notes() {
        assert!(note.step < STEPS_PER_LOOP);
        assert!(note.note_index < NOTES_PER_OCTAVE);
        assert!(note.length >= 1);
    }
    assert!(
        project
            .volumes
            .as_slice()
            .iter()
            .all(|volume| (0.0..=1.0).contains(volume))
    );
}

#[test]
fn saved_project_loads_back_unchanged() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("projects/demo.beatgrid.json");
    save_project(&path, &demo_project()).expect("saving fixture project should work");

    let loaded = load_project(&path).expect("reading saved project should work");
    assert!(loaded.is_clean(), "notices: {:?}", loaded.notices);
    assert_eq!(loaded.project, demo_project());
}

#[test]
fn missing_file_is_an_io_error() {
    let temp = tempfile::tempdir().expect("tempdir should be creatable");
    assert!(load_project(&temp.path().join("absent.json")).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_project_bytes_load_as_a_valid_project(raw in prop::collection::vec(any::<u8>(), 0..4096)) {
        let text = String::from_utf8_lossy(&raw);
        let loaded = deserialize_project(&text);
        assert_well_formed(&loaded.project);
    }

    #[test]
    fn truncated_project_payloads_load_as_a_valid_project(prefix_len in 0usize..4096usize) {
        let payload = project_to_json(&demo_project()).expect("fixture should serialize");
        let truncated = &payload[..prefix_len.min(payload.len())];
        let loaded = deserialize_project(&String::from_utf8_lossy(truncated));
        assert_well_formed(&loaded.project);
        if truncated.len() < payload.len() {
            prop_assert!(!loaded.is_clean());
        }
    }

    #[test]
    fn mutated_project_payloads_load_as_a_valid_project(index in 0usize..4096usize, delta in any::<u8>()) {
        let mut payload = project_to_json(&demo_project()).expect("fixture should serialize");
        let target = index % payload.len();
        payload[target] ^= delta.max(1);
        let loaded = deserialize_project(&String::from_utf8_lossy(&payload));
        assert_well_formed(&loaded.project);
    }

    #[test]
    fn arbitrary_field_values_never_escape_their_ranges(
        bpm in any::<f64>(),
        step in any::<i64>(),
        note_index in any::<i64>(),
        volume in any::<f64>(),
    ) {
        let raw = serde_json::json!({
            "bpm": bpm,
            "sequence": [[true]],
            "pianoNotes": [{"step": step, "noteIndex": note_index, "length": 1}],
            "volumes": [volume, volume, volume, volume],
        });
        let loaded = deserialize_project(&raw.to_string());
        assert_well_formed(&loaded.project);
    }
}
