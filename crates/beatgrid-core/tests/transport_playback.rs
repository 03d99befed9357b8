use beatgrid_core::{
    AudioSink, Engine, GraphBuilder, Project, SynthesisKind, VoiceGraph,
    fixtures::{demo_project, single_kick_project},
};

/// Sink that keeps every connected voice and lets the test move its clock.
#[derive(Debug)]
struct RecordingSink {
    now: f64,
    suspended: bool,
    voices: Vec<VoiceGraph>,
}

impl RecordingSink {
    fn suspended() -> Self {
        Self {
            now: 0.0,
            suspended: true,
            voices: Vec::new(),
        }
    }

    fn kinds(&self) -> Vec<SynthesisKind> {
        self.voices.iter().map(|voice| voice.kind).collect()
    }
}

impl AudioSink for RecordingSink {
    fn sample_rate(&self) -> u32 {
        44_100
    }

    fn current_time(&self) -> f64 {
        self.now
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) {
        self.suspended = false;
    }

    fn connect(&mut self, voice: VoiceGraph) {
        self.voices.push(voice);
    }
}

fn engine_with(project: Project) -> Engine {
    Engine::new(project, GraphBuilder::seeded(0))
}

#[test]
fn first_tick_on_a_kick_only_pattern_triggers_one_kick() {
    let mut engine = engine_with(single_kick_project(120.0));
    let mut sink = RecordingSink::suspended();

    assert!(engine.start(&mut sink));
    assert!(!sink.suspended, "start should resume the sink");

    let triggered = engine.tick(&mut sink);
    assert_eq!(triggered, 1);
    assert_eq!(sink.kinds(), vec![SynthesisKind::Kick]);
    assert!(sink.voices[0].start_time.abs() < f64::EPSILON);
    assert_eq!(engine.playing_step(), Some(0));
    assert_eq!(engine.current_step(), 1);
}

#[test]
fn start_then_stop_leaves_step_zero_and_no_ticks() {
    let mut engine = engine_with(demo_project());
    let mut sink = RecordingSink::suspended();

    engine.start(&mut sink);
    engine.stop();
    assert!(!engine.is_running());
    assert_eq!(engine.current_step(), 0);
    assert_eq!(engine.playing_step(), None);

    for tick in 1..=20 {
        sink.now = f64::from(tick) * 0.125;
        assert_eq!(engine.tick(&mut sink), 0);
    }
    assert!(sink.voices.is_empty());
}

#[test]
fn steps_land_on_the_tempo_grid_regardless_of_host_jitter() {
    let mut engine = engine_with(single_kick_project(120.0));
    let mut sink = RecordingSink::suspended();
    engine.start(&mut sink);

    for poll_time in [0.0, 0.13, 0.21, 0.4, 0.47, 0.52, 0.71, 0.9, 1.1, 1.33, 1.52, 1.7, 1.9, 2.05] {
        sink.now = poll_time;
        engine.tick(&mut sink);
    }

    let starts: Vec<f64> = sink.voices.iter().map(|voice| voice.start_time).collect();
    assert_eq!(starts, vec![0.0, 2.0]);
}

#[test]
fn synth_row_and_piano_notes_share_the_tonal_voice() {
    let mut project = Project::default();
    project.sequence.toggle(3, 0);
    project.piano_notes.toggle(0, 11);
    project.piano_notes.toggle(0, 0);
    let mut engine = engine_with(project);
    let mut sink = RecordingSink::suspended();

    engine.start(&mut sink);
    assert_eq!(engine.tick(&mut sink), 3);
    assert_eq!(
        sink.kinds(),
        vec![SynthesisKind::Synth, SynthesisKind::Synth, SynthesisKind::Synth]
    );
    assert!(sink.voices.iter().all(|voice| voice.delay.is_some()));
}

#[test]
fn start_is_idempotent_while_running() {
    let mut engine = engine_with(single_kick_project(120.0));
    let mut sink = RecordingSink::suspended();
    assert!(engine.start(&mut sink));
    engine.tick(&mut sink);
    sink.now = 0.05;
    assert!(!engine.start(&mut sink));
    assert_eq!(engine.current_step(), 1);
}
