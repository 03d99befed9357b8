use std::{path::Path, time::Duration};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::EngineConfig,
    export::{self, ExportGate, ExportJob},
    graph::GraphBuilder,
    model::{
        INSTRUMENT_COUNT, NOTES_PER_OCTAVE, PianoRoll, Project, STEPS_PER_LOOP, StepGrid, Volumes,
        is_valid_bpm,
    },
    persistence::{self, LoadNotice},
    renderer::{self, LiveOptions, RenderOptions, dispatch_step},
    sink::{AudioSink, RenderedBuffer},
    transport::Transport,
};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid tempo: {0} bpm")]
    InvalidTempo(f64),
    #[error("instrument index out of range: {0}")]
    InstrumentOutOfRange(usize),
    #[error("step index out of range: {0}")]
    StepOutOfRange(usize),
    #[error("note index out of range: {0}")]
    NoteOutOfRange(usize),
    #[error("invalid volume: {0}")]
    InvalidVolume(f32),
    #[error("an export is already in progress")]
    ExportInProgress,
    #[error("render failed: {0}")]
    RenderFailed(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Io(format!("{value:#}"))
    }
}

fn render_failed(error: &anyhow::Error) -> EngineError {
    EngineError::RenderFailed(format!("{error:#}"))
}

/// The sequencer. Owns the project, the live transport and the noise stream;
/// the audio output is always passed in by the caller.
#[derive(Debug)]
pub struct Engine {
    project: Project,
    transport: Transport,
    builder: GraphBuilder,
    render_options: RenderOptions,
    live_options: LiveOptions,
    export_gate: ExportGate,
}

impl Default for Engine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl Engine {
    #[must_use]
    pub fn new(project: Project, builder: GraphBuilder) -> Self {
        let live_options = LiveOptions::default();
        Self {
            transport: Transport::new(project.bpm, live_options.look_ahead),
            project,
            builder,
            render_options: RenderOptions::default(),
            live_options,
            export_gate: ExportGate::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        let project = Project::new(config.project.default_bpm, config.project.default_volume);
        let builder = config
            .audio
            .noise_seed
            .map_or_else(GraphBuilder::default, GraphBuilder::seeded);
        let live_options = config.live_options();

        Self {
            transport: Transport::new(project.bpm, live_options.look_ahead),
            project,
            builder,
            render_options: config.render_options(),
            live_options,
            export_gate: ExportGate::default(),
        }
    }

    #[must_use]
    pub fn project(&self) -> &Project {
        &self.project
    }

    #[must_use]
    pub fn step_grid(&self) -> &StepGrid {
        &self.project.sequence
    }

    #[must_use]
    pub fn piano_notes(&self) -> &PianoRoll {
        &self.project.piano_notes
    }

    #[must_use]
    pub fn volumes(&self) -> &Volumes {
        &self.project.volumes
    }

    #[must_use]
    pub fn tempo(&self) -> f64 {
        self.project.bpm
    }

    #[must_use]
    pub fn render_options(&self) -> &RenderOptions {
        &self.render_options
    }

    #[must_use]
    pub fn live_options(&self) -> &LiveOptions {
        &self.live_options
    }

    #[must_use]
    pub fn export_gate(&self) -> &ExportGate {
        &self.export_gate
    }

    #[instrument(skip(self))]
    pub fn toggle_step(&mut self, instrument: usize, step: usize) -> Result<bool, EngineError> {
        if instrument >= INSTRUMENT_COUNT {
            return Err(EngineError::InstrumentOutOfRange(instrument));
        }
        if step >= STEPS_PER_LOOP {
            return Err(EngineError::StepOutOfRange(step));
        }

        let active = self
            .project
            .sequence
            .toggle(instrument, step)
            .ok_or(EngineError::InstrumentOutOfRange(instrument))?;
        debug!(active, "step toggled");
        Ok(active)
    }

    /// Adds a one-step note at `(step, note_index)` or removes the one there.
    /// Returns `true` when a note was added.
    #[instrument(skip(self))]
    pub fn toggle_note(&mut self, step: usize, note_index: usize) -> Result<bool, EngineError> {
        if step >= STEPS_PER_LOOP {
            return Err(EngineError::StepOutOfRange(step));
        }
        if note_index >= NOTES_PER_OCTAVE {
            return Err(EngineError::NoteOutOfRange(note_index));
        }

        let inserted = self.project.piano_notes.toggle(step, note_index);
        debug!(inserted, notes = self.project.piano_notes.len(), "note toggled");
        Ok(inserted)
    }

    #[instrument(skip(self))]
    pub fn set_volume(&mut self, instrument: usize, volume: f32) -> Result<f32, EngineError> {
        if !volume.is_finite() {
            return Err(EngineError::InvalidVolume(volume));
        }

        let stored = self
            .project
            .volumes
            .set(instrument, volume)
            .ok_or(EngineError::InstrumentOutOfRange(instrument))?;
        debug!(stored, "volume set");
        Ok(stored)
    }

    /// Changes the tempo. While playing this is a stop followed by a start,
    /// so the loop restarts at step 0 on the new grid.
    #[instrument(skip(self, sink))]
    pub fn set_tempo<S: AudioSink + ?Sized>(
        &mut self,
        bpm: f64,
        sink: &mut S,
    ) -> Result<(), EngineError> {
        if !is_valid_bpm(bpm) {
            warn!("rejected tempo");
            return Err(EngineError::InvalidTempo(bpm));
        }

        self.project.bpm = bpm;
        if self.transport.is_running() {
            self.stop();
            self.transport.set_bpm(bpm);
            self.start(sink);
        } else {
            self.transport.set_bpm(bpm);
        }
        info!(tick_ms = self.tick_interval().as_secs_f64() * 1000.0, "tempo changed");
        Ok(())
    }

    /// Starts playback at step 0, resuming `sink` first if it is suspended.
    #[instrument(skip(self, sink), fields(bpm = self.project.bpm))]
    pub fn start<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> bool {
        if self.transport.is_running() {
            return false;
        }
        if sink.is_suspended() {
            sink.resume();
        }
        self.transport.start(sink.current_time())
    }

    #[instrument(skip(self))]
    pub fn stop(&mut self) -> bool {
        self.transport.stop()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    /// The next step to be dispatched; 0 while stopped.
    #[must_use]
    pub fn current_step(&self) -> usize {
        self.transport.current_step()
    }

    #[must_use]
    pub fn playing_step(&self) -> Option<usize> {
        self.transport.playing_step()
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.transport.tick_interval()
    }

    /// Dispatches every step that falls due by the sink's clock. Returns the
    /// number of voices triggered; always 0 while stopped.
    pub fn tick<S: AudioSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let due = self.transport.poll(sink.current_time());
        due.into_iter()
            .map(|scheduled| {
                dispatch_step(
                    &self.project,
                    scheduled.step,
                    scheduled.time,
                    sink,
                    &mut self.builder,
                )
            })
            .sum()
    }

    /// Swaps in a new project. Playback stops so the loop re-anchors on the
    /// new tempo.
    #[instrument(skip(self, project), fields(bpm = project.bpm))]
    pub fn replace_project(&mut self, project: Project) {
        if self.transport.stop() {
            debug!("playback stopped for project replacement");
        }
        self.transport.set_bpm(project.bpm);
        self.project = project;
        info!(triggers = self.project.trigger_count(), "project replaced");
    }

    #[must_use]
    pub fn snapshot(&self) -> Project {
        self.project.clone()
    }

    pub fn serialize_project(&self) -> Result<Vec<u8>, EngineError> {
        Ok(persistence::project_to_json(&self.project)?)
    }

    /// Loads project JSON, defaulting every malformed field. Returns the
    /// notices for the fields that were defaulted.
    #[instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub fn deserialize_project(&mut self, raw: &str) -> Vec<LoadNotice> {
        let loaded = persistence::deserialize_project(raw);
        self.replace_project(loaded.project);
        loaded.notices
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn save_project(&self, path: &Path) -> Result<(), EngineError> {
        persistence::save_project(path, &self.project)?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn load_project(&mut self, path: &Path) -> Result<Vec<LoadNotice>, EngineError> {
        let loaded = persistence::load_project(path)?;
        self.replace_project(loaded.project);
        Ok(loaded.notices)
    }

    /// Offline render of a snapshot, independent of live playback.
    #[instrument(skip(self), fields(bpm = self.project.bpm))]
    pub fn render_offline(&mut self) -> Result<RenderedBuffer, EngineError> {
        let snapshot = self.snapshot();
        let mut builder = self.builder.fork();
        renderer::render_offline(&snapshot, &self.render_options, &mut builder)
            .map_err(|error| render_failed(&error))
    }

    #[instrument(skip(self), fields(bpm = self.project.bpm))]
    pub fn render_to_wav(&mut self) -> Result<Vec<u8>, EngineError> {
        let permit = self
            .export_gate
            .try_acquire()
            .ok_or(EngineError::ExportInProgress)?;

        let snapshot = self.snapshot();
        let mut builder = self.builder.fork();
        let bytes = export::render_wav_bytes(&snapshot, &self.render_options, &mut builder)
            .map_err(|error| render_failed(&error))?;
        info!(export_id = %permit.id(), bytes = bytes.len(), "wav rendered");
        Ok(bytes)
    }

    /// Renders and writes a WAV file. A failed render leaves `path` untouched.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn export_wav(&mut self, path: &Path) -> Result<(), EngineError> {
        let bytes = self.render_to_wav()?;
        export::write_wav_file(path, &bytes)?;
        Ok(())
    }

    #[instrument(skip(self), fields(bpm = self.project.bpm))]
    pub fn spawn_export(&mut self) -> Result<ExportJob, EngineError> {
        let Some(permit) = self.export_gate.try_acquire() else {
            warn!("export rejected, another export is in flight");
            return Err(EngineError::ExportInProgress);
        };
        let builder = self.builder.fork();
        Ok(export::spawn_export(
            self.snapshot(),
            self.render_options,
            builder,
            permit,
        ))
    }
}
