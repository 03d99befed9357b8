//! Voice graphs and the builder that schedules them.
//!
//! A voice is a fixed chain: source → optional biquad → gain envelope →
//! optional feedback delay → sink. Every time-varying parameter is an
//! [`AudioParam`] holding absolute-time automation events, so the same graph
//! renders identically on any sink whose clock it was scheduled against.

use tracing::trace;

use crate::{
    model::SynthesisKind,
    recipes::{KickRecipe, NoiseRecipe, Recipe, ToneRecipe},
    rng::NoiseRng,
    sink::AudioSink,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamEvent {
    SetValue {
        value: f64,
        time: f64,
    },
    LinearRamp {
        value: f64,
        end_time: f64,
    },
    ExponentialRamp {
        value: f64,
        end_time: f64,
    },
    SetTarget {
        target: f64,
        start_time: f64,
        time_constant: f64,
    },
}

impl ParamEvent {
    #[must_use]
    pub fn time(&self) -> f64 {
        match *self {
            Self::SetValue { time, .. } => time,
            Self::LinearRamp { end_time, .. } | Self::ExponentialRamp { end_time, .. } => end_time,
            Self::SetTarget { start_time, .. } => start_time,
        }
    }
}

/// Automatable parameter following the Web Audio `AudioParam` timeline rules:
/// ramps run from the previous event to their own end time, and a target
/// approach runs from its start until the next event.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioParam {
    default_value: f64,
    events: Vec<ParamEvent>,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    time: f64,
    value: f64,
    approach: Option<(f64, f64)>,
}

impl Anchor {
    fn evaluate(&self, time: f64) -> f64 {
        match self.approach {
            Some((target, time_constant)) if time_constant > 0.0 => {
                let elapsed = (time - self.time).max(0.0);
                target + (self.value - target) * (-elapsed / time_constant).exp()
            }
            Some((target, _)) => target,
            None => self.value,
        }
    }
}

impl AudioParam {
    #[must_use]
    pub fn new(default_value: f64) -> Self {
        Self {
            default_value,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[ParamEvent] {
        &self.events
    }

    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(ParamEvent::SetValue { value, time })
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> &mut Self {
        self.insert(ParamEvent::LinearRamp { value, end_time })
    }

    pub fn exponential_ramp_to_value_at_time(&mut self, value: f64, end_time: f64) -> &mut Self {
        self.insert(ParamEvent::ExponentialRamp { value, end_time })
    }

    pub fn set_target_at_time(
        &mut self,
        target: f64,
        start_time: f64,
        time_constant: f64,
    ) -> &mut Self {
        self.insert(ParamEvent::SetTarget {
            target,
            start_time,
            time_constant,
        })
    }

    fn insert(&mut self, event: ParamEvent) -> &mut Self {
        let at = self
            .events
            .partition_point(|existing| existing.time() <= event.time());
        self.events.insert(at, event);
        self
    }

    /// Parameter value at absolute `time` (seconds on the scheduling clock).
    #[must_use]
    pub fn value_at(&self, time: f64) -> f64 {
        let mut anchor = Anchor {
            time: 0.0,
            value: self.default_value,
            approach: None,
        };

        for event in &self.events {
            match *event {
                ParamEvent::SetValue { value, time: at } => {
                    if time < at {
                        break;
                    }
                    anchor = Anchor {
                        time: at,
                        value,
                        approach: None,
                    };
                }
                ParamEvent::LinearRamp { value, end_time } => {
                    let start = anchor.evaluate(anchor.time);
                    if time < end_time {
                        let span = end_time - anchor.time;
                        if span <= 0.0 {
                            return start;
                        }
                        let progress = (time - anchor.time) / span;
                        return start + (value - start) * progress;
                    }
                    anchor = Anchor {
                        time: end_time,
                        value,
                        approach: None,
                    };
                }
                ParamEvent::ExponentialRamp { value, end_time } => {
                    let start = anchor.evaluate(anchor.time);
                    if time < end_time {
                        let span = end_time - anchor.time;
                        // Opposite signs or a zero endpoint hold the start value.
                        if span <= 0.0 || start * value <= 0.0 {
                            return start;
                        }
                        let progress = (time - anchor.time) / span;
                        return start * (value / start).powf(progress);
                    }
                    anchor = Anchor {
                        time: end_time,
                        value,
                        approach: None,
                    };
                }
                ParamEvent::SetTarget {
                    target,
                    start_time,
                    time_constant,
                } => {
                    if time < start_time {
                        break;
                    }
                    anchor = Anchor {
                        time: start_time,
                        value: anchor.evaluate(start_time),
                        approach: Some((target, time_constant)),
                    };
                }
            }
        }

        anchor.evaluate(time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorNode {
    pub waveform: Waveform,
    pub frequency: AudioParam,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceNode {
    Oscillator(OscillatorNode),
    /// One-shot sample buffer at the sink rate; silent once exhausted.
    Buffer(Vec<f32>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    BandPass,
    HighPass,
}

/// `q` uses the Web Audio convention: linear for band-pass, decibels for
/// high-pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadNode {
    pub kind: FilterKind,
    pub frequency: f64,
    pub q: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GainNode {
    pub gain: AudioParam,
}

/// Fully wet delay with its output fed back into its input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayNode {
    pub delay_time: f64,
    pub max_delay_time: f64,
    pub feedback: f64,
}

impl DelayNode {
    /// Echoes needed before the feedback loop falls below -80 dB.
    #[must_use]
    pub fn audible_repeats(&self) -> u32 {
        let feedback = self.feedback.abs();
        if feedback <= 0.0 {
            return 1;
        }
        if feedback >= 1.0 {
            return 64;
        }
        let repeats = (1e-4_f64.ln() / feedback.ln()).ceil();
        repeats.clamp(1.0, 64.0) as u32 + 1
    }

    #[must_use]
    pub fn effective_delay_time(&self) -> f64 {
        self.delay_time.clamp(0.0, self.max_delay_time)
    }

    #[must_use]
    pub fn tail_seconds(&self) -> f64 {
        self.effective_delay_time() * f64::from(self.audible_repeats())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceGraph {
    pub kind: SynthesisKind,
    pub source: SourceNode,
    pub filter: Option<BiquadNode>,
    pub gain: GainNode,
    pub delay: Option<DelayNode>,
    pub start_time: f64,
    pub stop_time: f64,
}

impl VoiceGraph {
    /// Last moment the voice can still be audible, delay tail included.
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.stop_time + self.delay.map_or(0.0, |delay| delay.tail_seconds())
    }
}

/// Turns recipes into scheduled voices. Owns the noise generator so that
/// every sink sees the same stream for the same trigger order.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    rng: NoiseRng,
}

impl GraphBuilder {
    #[must_use]
    pub fn new(rng: NoiseRng) -> Self {
        Self { rng }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(NoiseRng::from_seed(seed))
    }

    #[must_use]
    pub fn fork(&mut self) -> Self {
        Self::seeded(self.rng.next_seed())
    }

    /// Builds one voice for `recipe` starting at `start_time` on the sink's
    /// clock and connects it. Voices are fire-and-forget.
    pub fn trigger<S: AudioSink + ?Sized>(
        &mut self,
        sink: &mut S,
        recipe: &Recipe,
        start_time: f64,
        volume: f32,
    ) {
        let voice = self.build(sink.sample_rate(), recipe, start_time, volume);
        trace!(
            kind = ?voice.kind,
            start_time,
            stop_time = voice.stop_time,
            volume,
            "voice triggered"
        );
        sink.connect(voice);
    }

    #[must_use]
    pub fn build(
        &mut self,
        sample_rate: u32,
        recipe: &Recipe,
        start_time: f64,
        volume: f32,
    ) -> VoiceGraph {
        let volume = f64::from(volume.clamp(0.0, 1.0));
        match recipe {
            Recipe::Kick(kick) => kick_voice(kick, start_time, volume),
            Recipe::Noise(noise) => self.noise_voice(noise, sample_rate, start_time, volume),
            Recipe::Tone(tone) => tone_voice(tone, start_time, volume),
        }
    }

    fn noise_voice(
        &mut self,
        recipe: &NoiseRecipe,
        sample_rate: u32,
        start_time: f64,
        volume: f64,
    ) -> VoiceGraph {
        let length = (f64::from(sample_rate) * recipe.duration).floor() as usize;
        let scale = volume as f32;
        let samples = (0..length)
            .map(|_| self.rng.next_bipolar() * scale)
            .collect();

        let mut gain = AudioParam::new(1.0);
        gain.set_value_at_time(volume * recipe.gain_scale, start_time)
            .exponential_ramp_to_value_at_time(recipe.end_gain, start_time + recipe.duration);

        VoiceGraph {
            kind: recipe.kind,
            source: SourceNode::Buffer(samples),
            filter: Some(recipe.filter),
            gain: GainNode { gain },
            delay: None,
            start_time,
            stop_time: start_time + recipe.duration,
        }
    }
}

fn kick_voice(recipe: &KickRecipe, start_time: f64, volume: f64) -> VoiceGraph {
    let end = start_time + recipe.duration;

    let mut frequency = AudioParam::new(440.0);
    frequency
        .set_value_at_time(recipe.start_frequency, start_time)
        .exponential_ramp_to_value_at_time(recipe.end_frequency, end);

    let mut gain = AudioParam::new(1.0);
    gain.set_value_at_time(volume, start_time)
        .exponential_ramp_to_value_at_time(recipe.end_gain, end);

    VoiceGraph {
        kind: SynthesisKind::Kick,
        source: SourceNode::Oscillator(OscillatorNode {
            waveform: Waveform::Sine,
            frequency,
        }),
        filter: None,
        gain: GainNode { gain },
        delay: None,
        start_time,
        stop_time: end,
    }
}

fn tone_voice(recipe: &ToneRecipe, start_time: f64, volume: f64) -> VoiceGraph {
    let mut frequency = AudioParam::new(440.0);
    frequency.set_value_at_time(recipe.frequency, start_time);

    let mut gain = AudioParam::new(1.0);
    gain.set_value_at_time(0.0, start_time)
        .linear_ramp_to_value_at_time(volume, start_time + recipe.attack)
        .linear_ramp_to_value_at_time(
            volume * recipe.sustain_ratio,
            start_time + recipe.decay_end,
        )
        .set_target_at_time(
            0.0,
            start_time + recipe.release_start,
            recipe.release_time_constant,
        );

    VoiceGraph {
        kind: SynthesisKind::Synth,
        source: SourceNode::Oscillator(OscillatorNode {
            waveform: recipe.waveform,
            frequency,
        }),
        filter: None,
        gain: GainNode { gain },
        delay: Some(recipe.delay),
        start_time,
        stop_time: start_time + recipe.duration,
    }
}
