//! Sample-level rendering of scheduled voices.

use std::f64::consts::PI;

use crate::{
    graph::{BiquadNode, DelayNode, FilterKind, SourceNode, VoiceGraph, Waveform},
    time::{frame_to_seconds, seconds_to_frame},
};

/// Second-order IIR section (Direct Form II Transposed), coefficients from the
/// Audio EQ Cookbook with Web Audio's Q conventions.
#[derive(Debug, Clone)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    fn new(node: &BiquadNode, sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        let frequency = node.frequency.clamp(1.0, nyquist * 0.999);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();

        let (b0, b1, b2, a0, a1, a2) = match node.kind {
            FilterKind::BandPass => {
                let alpha = sin_w0 / (2.0 * node.q.max(1e-4));
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterKind::HighPass => {
                let resonance = 10_f64.powf(node.q / 20.0);
                let alpha = sin_w0 / (2.0 * resonance);
                let b0 = (1.0 + cos_w0) / 2.0;
                (
                    b0,
                    -(1.0 + cos_w0),
                    b0,
                    1.0 + alpha,
                    -2.0 * cos_w0,
                    1.0 - alpha,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }
}

#[derive(Debug, Clone)]
struct FeedbackDelay {
    line: Vec<f64>,
    cursor: usize,
    feedback: f64,
}

impl FeedbackDelay {
    fn new(node: &DelayNode, sample_rate: f64) -> Self {
        let frames = (node.effective_delay_time() * sample_rate).round().max(1.0) as usize;
        Self {
            line: vec![0.0; frames],
            cursor: 0,
            feedback: node.feedback,
        }
    }

    /// Returns the sample written one delay period ago and stores
    /// `input + feedback × output` in its place.
    fn process(&mut self, input: f64) -> f64 {
        let output = self.line[self.cursor];
        self.line[self.cursor] = input + self.feedback * output;
        self.cursor = (self.cursor + 1) % self.line.len();
        output
    }
}

#[derive(Debug, Clone)]
pub struct ActiveVoice {
    graph: VoiceGraph,
    sample_rate: u32,
    start_frame: u64,
    stop_frame: u64,
    end_frame: u64,
    phase: f64,
    buffer_cursor: usize,
    filter: Option<Biquad>,
    delay: Option<FeedbackDelay>,
}

impl ActiveVoice {
    /// Voices scheduled before `earliest_frame` start at `earliest_frame`.
    #[must_use]
    pub fn new(graph: VoiceGraph, sample_rate: u32, earliest_frame: u64) -> Self {
        let rate = f64::from(sample_rate.max(1));
        let scheduled_start = seconds_to_frame(graph.start_time, sample_rate);
        let start_frame = scheduled_start.max(earliest_frame);
        let lateness = start_frame - scheduled_start;
        let stop_frame = seconds_to_frame(graph.stop_time, sample_rate)
            .saturating_add(lateness)
            .max(start_frame);
        let end_frame = seconds_to_frame(graph.end_time(), sample_rate)
            .saturating_add(lateness)
            .max(stop_frame);

        Self {
            filter: graph.filter.as_ref().map(|node| Biquad::new(node, rate)),
            delay: graph.delay.as_ref().map(|node| FeedbackDelay::new(node, rate)),
            graph,
            sample_rate,
            start_frame,
            stop_frame,
            end_frame,
            phase: 0.0,
            buffer_cursor: 0,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &VoiceGraph {
        &self.graph
    }

    #[must_use]
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    #[must_use]
    pub fn end_frame(&self) -> u64 {
        self.end_frame
    }

    #[must_use]
    pub fn is_finished(&self, frame: u64) -> bool {
        frame >= self.end_frame
    }

    /// Adds this voice into `out`, whose first element is `block_start`.
    /// Blocks must be rendered in order with no gaps.
    pub fn render_add(&mut self, block_start: u64, out: &mut [f32]) {
        let block_end = block_start + out.len() as u64;
        let first = self.start_frame.max(block_start);
        let last = self.end_frame.min(block_end);
        for frame in first..last {
            let index = (frame - block_start) as usize;
            out[index] += self.next_sample(frame) as f32;
        }
    }

    fn next_sample(&mut self, frame: u64) -> f64 {
        let time = frame_to_seconds(frame, self.sample_rate);
        let source = if frame < self.stop_frame {
            self.source_sample(time)
        } else {
            0.0
        };

        let filtered = match self.filter.as_mut() {
            Some(filter) => filter.process(source),
            None => source,
        };
        let shaped = filtered * self.graph.gain.gain.value_at(time);

        match self.delay.as_mut() {
            Some(delay) => delay.process(shaped),
            None => shaped,
        }
    }

    fn source_sample(&mut self, time: f64) -> f64 {
        match &self.graph.source {
            SourceNode::Oscillator(oscillator) => {
                let sample = match oscillator.waveform {
                    Waveform::Sine => (2.0 * PI * self.phase).sin(),
                    Waveform::Square => {
                        if self.phase < 0.5 {
                            1.0
                        } else {
                            -1.0
                        }
                    }
                };
                let increment =
                    oscillator.frequency.value_at(time) / f64::from(self.sample_rate.max(1));
                self.phase = (self.phase + increment).rem_euclid(1.0);
                sample
            }
            SourceNode::Buffer(samples) => {
                let sample = samples.get(self.buffer_cursor).copied().unwrap_or(0.0);
                self.buffer_cursor += 1;
                f64::from(sample)
            }
        }
    }
}

/// Sums active voices block by block. The real-time and offline sinks both
/// render through this, so a voice sounds the same on either.
#[derive(Debug, Clone, Default)]
pub struct VoiceMixer {
    voices: Vec<ActiveVoice>,
}

impl VoiceMixer {
    pub fn add(&mut self, voice: ActiveVoice) {
        self.voices.push(voice);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    #[must_use]
    pub fn voices(&self) -> &[ActiveVoice] {
        &self.voices
    }

    /// Mixes every voice into `mono` (overwritten) starting at `block_start`,
    /// then drops voices that have finished.
    pub fn render(&mut self, block_start: u64, mono: &mut [f32]) {
        mono.fill(0.0);
        for voice in &mut self.voices {
            voice.render_add(block_start, mono);
        }
        let block_end = block_start + mono.len() as u64;
        self.voices.retain(|voice| !voice.is_finished(block_end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::GraphBuilder,
        recipes::{self, Recipe},
    };

    const RATE: u32 = 48_000;

    fn render_voice(recipe: &Recipe, frames: usize, block: usize) -> Vec<f32> {
        let mut builder = GraphBuilder::seeded(11);
        let graph = builder.build(RATE, recipe, 0.0, 1.0);
        let mut mixer = VoiceMixer::default();
        mixer.add(ActiveVoice::new(graph, RATE, 0));

        let mut out = vec![0.0; frames];
        let mut scratch = vec![0.0; block];
        let mut cursor = 0;
        while cursor < frames {
            let end = (cursor + block).min(frames);
            let chunk = &mut scratch[..end - cursor];
            mixer.render(cursor as u64, chunk);
            out[cursor..end].copy_from_slice(chunk);
            cursor = end;
        }
        out
    }

    fn sine_gain(node: &BiquadNode, frequency: f64) -> f64 {
        let rate = f64::from(RATE);
        let mut filter = Biquad::new(node, rate);
        let settle = RATE as usize / 2;
        let mut input_energy = 0.0;
        let mut output_energy = 0.0;
        for frame in 0..RATE as usize {
            let input = (2.0 * PI * frequency * frame as f64 / rate).sin();
            let output = filter.process(input);
            if frame >= settle {
                input_energy += input * input;
                output_energy += output * output;
            }
        }
        (output_energy / input_energy).sqrt()
    }

    #[test]
    fn hihat_filter_removes_lows_and_keeps_highs() {
        let node = &recipes::HIHAT.filter;
        assert!(sine_gain(node, 200.0) < 0.01);
        assert!(sine_gain(node, 1_000.0) < 0.05);
        let high = sine_gain(node, 15_000.0);
        assert!((0.8..1.3).contains(&high), "gain at 15 kHz was {high}");
    }

    #[test]
    fn snare_filter_peaks_at_its_center() {
        let node = &recipes::SNARE.filter;
        let center = sine_gain(node, 1_000.0);
        assert!((center - 1.0).abs() < 0.05, "gain at 1 kHz was {center}");
        assert!(sine_gain(node, 100.0) < 0.15);
        assert!(sine_gain(node, 10_000.0) < 0.15);
        assert!(sine_gain(node, 500.0) < center);
        assert!(sine_gain(node, 2_000.0) < center);
    }

    #[test]
    fn block_size_does_not_change_output() {
        let recipe = Recipe::Tone(recipes::tone(330.0));
        let whole = render_voice(&recipe, 60_000, 60_000);
        let chunked = render_voice(&recipe, 60_000, 128);
        assert_eq!(whole, chunked);
    }

    #[test]
    fn kick_is_silent_after_it_stops() {
        let out = render_voice(&Recipe::Kick(recipes::KICK), 20_000, 512);
        let stop = seconds_to_frame(0.2, RATE) as usize;
        assert!(out[..stop].iter().any(|sample| sample.abs() > 0.1));
        assert!(out[stop..].iter().all(|sample| *sample == 0.0));
    }

    #[test]
    fn synth_echo_rings_after_the_oscillator_stops() {
        let out = render_voice(&Recipe::Tone(recipes::tone(440.0)), 96_000, 256);
        let after_stop = &out[48_000..60_000];
        assert!(after_stop.iter().any(|sample| sample.abs() > 1e-3));
    }

    #[test]
    fn late_voices_start_at_the_earliest_frame() {
        let mut builder = GraphBuilder::seeded(1);
        let graph = builder.build(RATE, &Recipe::Kick(recipes::KICK), 0.0, 1.0);
        let voice = ActiveVoice::new(graph, RATE, 1_000);
        assert_eq!(voice.start_frame(), 1_000);
        assert_eq!(voice.end_frame(), 1_000 + 9_600);
    }

    #[test]
    fn finished_voices_are_released() {
        let mut builder = GraphBuilder::seeded(5);
        let mut mixer = VoiceMixer::default();
        let graph = builder.build(RATE, &Recipe::Noise(recipes::HIHAT), 0.0, 1.0);
        mixer.add(ActiveVoice::new(graph, RATE, 0));
        let mut block = vec![0.0; 4_096];
        mixer.render(0, &mut block);
        assert_eq!(mixer.len(), 0);
    }
}
