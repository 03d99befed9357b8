//! Walks the loop and turns active cells and piano-roll notes into voices.

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::{
    graph::GraphBuilder,
    model::{
        INSTRUMENTS, MAX_BPM, MIN_BPM, Project, STEPS_PER_LOOP, SYNTH_INSTRUMENT_INDEX,
        SynthesisKind, is_valid_bpm,
    },
    recipes::recipe_for,
    sink::{AudioSink, OfflineSink, RealtimeSink, RenderedBuffer, validate_frame_count},
    time,
    transport::Transport,
};

pub const DEFAULT_RENDER_LOOPS: u32 = 4;
pub const DEFAULT_BLOCK_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub sample_rate: u32,
    pub loops: u32,
    /// Extra frames after the last loop so echoes are not cut off. Zero keeps
    /// exported files the conventional length.
    pub tail_seconds: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            sample_rate: crate::model::DEFAULT_SAMPLE_RATE,
            loops: DEFAULT_RENDER_LOOPS,
            tail_seconds: 0.0,
        }
    }
}

impl RenderOptions {
    #[must_use]
    pub fn frame_count(&self, bpm: f64) -> u64 {
        let tail = (self.tail_seconds.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        time::offline_frame_count(self.sample_rate, bpm, self.loops).saturating_add(tail)
    }

    #[must_use]
    pub fn step_count(&self) -> u64 {
        u64::from(self.loops) * STEPS_PER_LOOP as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiveOptions {
    pub block_size: usize,
    pub look_ahead: f64,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            look_ahead: crate::transport::DEFAULT_LOOK_AHEAD_SECONDS,
        }
    }
}

/// Triggers everything due on `step` at `start_time`: grid cells first in
/// instrument order, then piano-roll notes in list order. Returns the number
/// of voices started.
pub fn dispatch_step<S: AudioSink + ?Sized>(
    project: &Project,
    step: usize,
    start_time: f64,
    sink: &mut S,
    builder: &mut GraphBuilder,
) -> usize {
    let step = step % STEPS_PER_LOOP;
    let mut triggered = 0;

    for instrument in project.sequence.active_instruments(step) {
        let Some(definition) = INSTRUMENTS.get(instrument) else {
            continue;
        };
        let volume = project.volumes.get(instrument);
        builder.trigger(sink, &definition.recipe(), start_time, volume);
        triggered += 1;
    }

    let tonal_volume = project.volumes.get(SYNTH_INSTRUMENT_INDEX);
    for note in project.piano_notes.notes_at(step) {
        let recipe = recipe_for(SynthesisKind::Synth, note.frequency_hz());
        builder.trigger(sink, &recipe, start_time, tonal_volume);
        triggered += 1;
    }

    triggered
}

/// Schedules every step of `options.loops` repetitions against an offline sink
/// and renders it.
#[instrument(skip(project, builder), fields(bpm = project.bpm, sample_rate = options.sample_rate, loops = options.loops))]
pub fn render_offline(
    project: &Project,
    options: &RenderOptions,
    builder: &mut GraphBuilder,
) -> Result<RenderedBuffer> {
    if !is_valid_bpm(project.bpm) {
        bail!("cannot render at tempo {} bpm, expected {MIN_BPM}..={MAX_BPM}", project.bpm);
    }

    let frame_count = options.frame_count(project.bpm);
    let mut sink = OfflineSink::new(options.sample_rate, frame_count)
        .context("failed to create offline render target")?;

    let mut voices = 0;
    for index in 0..options.step_count() {
        let start_time = time::step_start_seconds(0.0, index, project.bpm);
        voices += dispatch_step(
            project,
            (index % STEPS_PER_LOOP as u64) as usize,
            start_time,
            &mut sink,
            builder,
        );
    }

    debug!(voices, frame_count, "offline schedule built");
    let buffer = sink.start_rendering();
    info!(
        frames = buffer.frame_count(),
        peak = buffer.peak(),
        "offline render finished"
    );
    Ok(buffer)
}

/// Plays `project` through a transport and a real-time sink, pulling
/// `live.block_size` frames at a time the way an audio callback would, and
/// keeps the same number of frames an offline render would produce.
#[instrument(skip(project, builder), fields(bpm = project.bpm, sample_rate = options.sample_rate, block_size = live.block_size))]
pub fn capture_live(
    project: &Project,
    options: &RenderOptions,
    live: &LiveOptions,
    builder: &mut GraphBuilder,
) -> Result<RenderedBuffer> {
    if !is_valid_bpm(project.bpm) {
        bail!("cannot capture at tempo {} bpm, expected {MIN_BPM}..={MAX_BPM}", project.bpm);
    }
    if live.block_size == 0 {
        bail!("block size must be at least one frame");
    }

    let frame_count = validate_frame_count(options.frame_count(project.bpm))
        .context("invalid capture length")?;

    let mut sink =
        RealtimeSink::new(options.sample_rate).context("failed to create realtime sink")?;
    let mut transport = Transport::new(project.bpm, live.look_ahead);
    sink.resume();
    transport.start(sink.current_time());

    let step_limit = options.step_count();
    let mut left = vec![0.0_f32; frame_count];
    let mut right = vec![0.0_f32; frame_count];
    let mut cursor = 0;
    let mut voices = 0;

    while cursor < frame_count {
        for scheduled in transport.poll(sink.current_time()) {
            if scheduled.index < step_limit {
                voices += dispatch_step(project, scheduled.step, scheduled.time, &mut sink, builder);
            }
        }

        let end = (cursor + live.block_size).min(frame_count);
        sink.render_block(&mut left[cursor..end], &mut right[cursor..end]);
        cursor = end;
    }

    transport.stop();
    debug!(voices, frames = frame_count, "live capture finished");
    Ok(RenderedBuffer::from_equal_channels(options.sample_rate, left, right))
}
