use std::time::Duration;

pub const STEPS_PER_BEAT: u32 = 4;
pub const BEATS_PER_LOOP: u32 = 4;

#[must_use]
pub fn seconds_per_beat(bpm: f64) -> f64 {
    if !bpm.is_finite() || bpm <= 0.0 {
        return 0.0;
    }

    60.0 / bpm
}

#[must_use]
pub fn step_duration_seconds(bpm: f64) -> f64 {
    seconds_per_beat(bpm) / f64::from(STEPS_PER_BEAT)
}

/// Nominal host timer period for live playback: one sixteenth note.
#[must_use]
pub fn tick_interval(bpm: f64) -> Duration {
    let millis = seconds_per_beat(bpm) * 1000.0 / f64::from(STEPS_PER_BEAT);
    Duration::from_secs_f64(millis / 1000.0)
}

/// Absolute start time of the `index`-th step after `anchor`. Both the live
/// scheduler and the offline renderer derive step times from this, never by
/// accumulating durations.
#[must_use]
pub fn step_start_seconds(anchor: f64, index: u64, bpm: f64) -> f64 {
    anchor + index as f64 * step_duration_seconds(bpm)
}

/// First frame at or after `seconds`.
#[must_use]
pub fn seconds_to_frame(seconds: f64, sample_rate: u32) -> u64 {
    if seconds <= 0.0 || sample_rate == 0 {
        return 0;
    }

    (seconds * f64::from(sample_rate) - 1e-6).ceil().max(0.0) as u64
}

#[must_use]
pub fn frame_to_seconds(frame: u64, sample_rate: u32) -> f64 {
    if sample_rate == 0 {
        return 0.0;
    }

    frame as f64 / f64::from(sample_rate)
}

/// Export length convention: `sample_rate × loops × seconds_per_beat × 4`
/// frames, truncated.
#[must_use]
pub fn offline_frame_count(sample_rate: u32, bpm: f64, loops: u32) -> u64 {
    let frames = f64::from(sample_rate)
        * f64::from(loops)
        * seconds_per_beat(bpm)
        * f64::from(BEATS_PER_LOOP);
    frames.max(0.0).floor() as u64
}
