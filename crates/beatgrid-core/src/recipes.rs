//! Synthesis recipes: the fixed numeric parameters behind each instrument.
//!
//! Every recipe is plain data. Turning a recipe into a scheduled voice is the
//! job of [`crate::graph::GraphBuilder`]; nothing here touches a sink.

use crate::{
    graph::{BiquadNode, DelayNode, FilterKind, Waveform},
    model::{Instrument, SynthesisKind},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KickRecipe {
    pub start_frequency: f64,
    /// Exponential ramps cannot reach zero, so the glide ends just above it.
    pub end_frequency: f64,
    pub end_gain: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseRecipe {
    pub kind: SynthesisKind,
    pub duration: f64,
    pub filter: BiquadNode,
    /// Multiplier applied to the trigger volume at the start of the envelope.
    pub gain_scale: f64,
    pub end_gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneRecipe {
    pub waveform: Waveform,
    pub frequency: f64,
    pub attack: f64,
    pub decay_end: f64,
    pub sustain_ratio: f64,
    pub release_start: f64,
    pub release_time_constant: f64,
    pub duration: f64,
    pub delay: DelayNode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Recipe {
    Kick(KickRecipe),
    Noise(NoiseRecipe),
    Tone(ToneRecipe),
}

impl Recipe {
    #[must_use]
    pub fn kind(&self) -> SynthesisKind {
        match self {
            Self::Kick(_) => SynthesisKind::Kick,
            Self::Noise(noise) => noise.kind,
            Self::Tone(_) => SynthesisKind::Synth,
        }
    }

    /// Seconds between the trigger and the source stopping. Delay tails ring
    /// on past this point.
    #[must_use]
    pub fn source_duration(&self) -> f64 {
        match self {
            Self::Kick(kick) => kick.duration,
            Self::Noise(noise) => noise.duration,
            Self::Tone(tone) => tone.duration,
        }
    }
}

pub const KICK: KickRecipe = KickRecipe {
    start_frequency: 150.0,
    end_frequency: 0.001,
    end_gain: 0.001,
    duration: 0.2,
};

pub const SNARE: NoiseRecipe = NoiseRecipe {
    kind: SynthesisKind::Snare,
    duration: 0.2,
    filter: BiquadNode {
        kind: FilterKind::BandPass,
        frequency: 1_000.0,
        q: 1.0,
    },
    gain_scale: 1.0,
    end_gain: 0.01,
};

pub const HIHAT: NoiseRecipe = NoiseRecipe {
    kind: SynthesisKind::HiHat,
    duration: 0.05,
    filter: BiquadNode {
        kind: FilterKind::HighPass,
        frequency: 7_000.0,
        q: 1.0,
    },
    gain_scale: 0.5,
    end_gain: 0.01,
};

pub const SYNTH_ECHO: DelayNode = DelayNode {
    delay_time: 0.25,
    max_delay_time: 0.5,
    feedback: 0.4,
};

/// Square lead with a short attack, a decay to 30 % and a slow release.
#[must_use]
pub fn tone(frequency: f64) -> ToneRecipe {
    ToneRecipe {
        waveform: Waveform::Square,
        frequency,
        attack: 0.01,
        decay_end: 0.2,
        sustain_ratio: 0.3,
        release_start: 0.5,
        release_time_constant: 0.3,
        duration: 1.0,
        delay: SYNTH_ECHO,
    }
}

/// `frequency` only matters for the tonal voice; drums are tuned by their recipe.
#[must_use]
pub fn recipe_for(kind: SynthesisKind, frequency: f64) -> Recipe {
    match kind {
        SynthesisKind::Kick => Recipe::Kick(KICK),
        SynthesisKind::Snare => Recipe::Noise(SNARE),
        SynthesisKind::HiHat => Recipe::Noise(HIHAT),
        SynthesisKind::Synth => Recipe::Tone(tone(frequency)),
    }
}

impl Instrument {
    #[must_use]
    pub fn recipe(&self) -> Recipe {
        recipe_for(self.kind, self.base_frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::INSTRUMENTS;

    #[test]
    fn catalog_recipes_match_instrument_kinds() {
        for instrument in INSTRUMENTS {
            assert_eq!(instrument.recipe().kind(), instrument.kind);
        }
    }

    #[test]
    fn tonal_recipe_keeps_requested_pitch() {
        match recipe_for(SynthesisKind::Synth, 523.25) {
            Recipe::Tone(tone) => {
                assert!((tone.frequency - 523.25).abs() < f64::EPSILON);
                assert!((tone.duration - 1.0).abs() < f64::EPSILON);
            }
            other => panic!("expected tonal recipe, got {other:?}"),
        }
    }

    #[test]
    fn hihat_is_shorter_and_quieter_than_snare() {
        assert!(HIHAT.duration < SNARE.duration);
        assert!(HIHAT.gain_scale < SNARE.gain_scale);
    }
}
