//! Audio sinks: where voices end up.
//!
//! The sequencer never holds a global output. Whoever hosts it owns a sink and
//! passes it into every call that can produce sound.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::{
    graph::VoiceGraph,
    time::frame_to_seconds,
    voice::{ActiveVoice, VoiceMixer},
    wav::{BITS_PER_SAMPLE, WAV_HEADER_BYTES},
};

pub const RENDER_CHANNELS: usize = 2;
pub const MIN_SAMPLE_RATE: u32 = 3_000;
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Longest render whose 16-bit stereo data still fits the WAV size fields.
pub const MAX_RENDER_FRAMES: u64 = (u32::MAX as u64 - WAV_HEADER_BYTES as u64)
    / (RENDER_CHANNELS as u64 * BITS_PER_SAMPLE as u64 / 8);

/// Destination for scheduled voices, either a real-time output or an
/// offline accumulator.
pub trait AudioSink {
    fn sample_rate(&self) -> u32;

    /// Current position of the sink's own clock, in seconds.
    fn current_time(&self) -> f64;

    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) {}

    fn connect(&mut self, voice: VoiceGraph);
}

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("sample rate {0} Hz is outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE}")]
    UnsupportedSampleRate(u32),
    #[error("render length must be at least one frame")]
    EmptyRender,
    #[error("render length of {0} frames exceeds the {MAX_RENDER_FRAMES}-frame wav limit")]
    TooLong(u64),
    #[error("channel lengths differ: {left} left, {right} right")]
    ChannelMismatch { left: usize, right: usize },
}

pub fn validate_sample_rate(sample_rate: u32) -> Result<(), RenderError> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
        Ok(())
    } else {
        Err(RenderError::UnsupportedSampleRate(sample_rate))
    }
}

/// Checks a render length before anything is allocated for it.
pub fn validate_frame_count(frame_count: u64) -> Result<usize, RenderError> {
    if frame_count == 0 {
        return Err(RenderError::EmptyRender);
    }
    if frame_count > MAX_RENDER_FRAMES {
        return Err(RenderError::TooLong(frame_count));
    }
    usize::try_from(frame_count).map_err(|_| RenderError::TooLong(frame_count))
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedBuffer {
    sample_rate: u32,
    channels: [Vec<f32>; RENDER_CHANNELS],
}

impl RenderedBuffer {
    pub fn new(sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> Result<Self, RenderError> {
        if left.len() != right.len() {
            return Err(RenderError::ChannelMismatch {
                left: left.len(),
                right: right.len(),
            });
        }
        Ok(Self::from_equal_channels(sample_rate, left, right))
    }

    pub(crate) fn from_equal_channels(sample_rate: u32, left: Vec<f32>, right: Vec<f32>) -> Self {
        debug_assert_eq!(left.len(), right.len());
        Self {
            sample_rate,
            channels: [left, right],
        }
    }

    #[must_use]
    pub fn silent(sample_rate: u32, frame_count: usize) -> Self {
        Self::from_equal_channels(sample_rate, vec![0.0; frame_count], vec![0.0; frame_count])
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.channels[0].len()
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        RENDER_CHANNELS
    }

    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        frame_to_seconds(self.frame_count() as u64, self.sample_rate)
    }

    #[must_use]
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0_f32, |peak, sample| peak.max(sample.abs()))
    }

    pub fn interleaved(&self) -> impl Iterator<Item = f32> + '_ {
        let [left, right] = &self.channels;
        left.iter()
            .zip(right.iter())
            .flat_map(|(left, right)| [*left, *right])
    }
}

/// Renders a fixed number of frames ahead of time. Its clock stays at zero
/// while voices are being scheduled; [`OfflineSink::start_rendering`] is
/// one-shot and consumes the sink.
#[derive(Debug)]
pub struct OfflineSink {
    sample_rate: u32,
    frame_count: usize,
    mixer: VoiceMixer,
}

impl OfflineSink {
    pub fn new(sample_rate: u32, frame_count: u64) -> Result<Self, RenderError> {
        validate_sample_rate(sample_rate)?;
        let frame_count = validate_frame_count(frame_count)?;

        Ok(Self {
            sample_rate,
            frame_count,
            mixer: VoiceMixer::default(),
        })
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.mixer.len()
    }

    #[instrument(skip(self), fields(sample_rate = self.sample_rate, frames = self.frame_count, voices = self.mixer.len()))]
    pub fn start_rendering(mut self) -> RenderedBuffer {
        let mut mono = vec![0.0_f32; self.frame_count];
        self.mixer.render(0, &mut mono);
        debug!(truncated_voices = self.mixer.len(), "offline render completed");
        let right = mono.clone();
        RenderedBuffer::from_equal_channels(self.sample_rate, mono, right)
    }
}

impl AudioSink for OfflineSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn connect(&mut self, voice: VoiceGraph) {
        self.mixer
            .add(ActiveVoice::new(voice, self.sample_rate, 0));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Suspended,
    Running,
}

/// Output whose clock is the number of frames pulled by the host's audio
/// callback. Starts suspended; a suspended sink outputs silence and its
/// clock does not move.
#[derive(Debug)]
pub struct RealtimeSink {
    sample_rate: u32,
    state: SinkState,
    frames_rendered: u64,
    mixer: VoiceMixer,
    scratch: Vec<f32>,
}

impl RealtimeSink {
    pub fn new(sample_rate: u32) -> Result<Self, RenderError> {
        validate_sample_rate(sample_rate)?;
        Ok(Self {
            sample_rate,
            state: SinkState::Suspended,
            frames_rendered: 0,
            mixer: VoiceMixer::default(),
            scratch: Vec::new(),
        })
    }

    #[must_use]
    pub fn state(&self) -> SinkState {
        self.state
    }

    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    #[must_use]
    pub fn active_voices(&self) -> usize {
        self.mixer.len()
    }

    pub fn suspend(&mut self) {
        if self.state == SinkState::Running {
            self.state = SinkState::Suspended;
            debug!(frames_rendered = self.frames_rendered, "realtime sink suspended");
        }
    }

    pub fn render_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        if self.state == SinkState::Suspended {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }

        self.scratch.resize(frames, 0.0);
        self.mixer.render(self.frames_rendered, &mut self.scratch);
        left[..frames].copy_from_slice(&self.scratch);
        right[..frames].copy_from_slice(&self.scratch);
        self.frames_rendered += frames as u64;
    }
}

impl AudioSink for RealtimeSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        frame_to_seconds(self.frames_rendered, self.sample_rate)
    }

    fn is_suspended(&self) -> bool {
        self.state == SinkState::Suspended
    }

    fn resume(&mut self) {
        if self.state == SinkState::Suspended {
            self.state = SinkState::Running;
            info!(sample_rate = self.sample_rate, "realtime sink resumed");
        }
    }

    fn connect(&mut self, voice: VoiceGraph) {
        self.mixer
            .add(ActiveVoice::new(voice, self.sample_rate, self.frames_rendered));
    }
}
