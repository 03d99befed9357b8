use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{model::STEPS_PER_LOOP, time};

pub const DEFAULT_LOOK_AHEAD_SECONDS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Stopped,
    Running,
}

/// A step whose triggers are due, with the absolute sink time they must start at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledStep {
    /// Steps since `start`, never wrapped.
    pub index: u64,
    pub step: usize,
    pub time: f64,
}

/// Live playback clock.
///
/// The host calls [`Transport::poll`] from a timer firing roughly every
/// [`Transport::tick_interval`]. Step `n` always lands on
/// `anchor + n × step_duration` measured on the sink's clock, and anything due
/// within the look-ahead window is handed out early, so a late or jittery host
/// timer costs latency but never shifts the grid.
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    bpm: f64,
    look_ahead: f64,
    anchor_time: f64,
    next_index: u64,
    playing_step: Option<usize>,
}

impl Transport {
    #[must_use]
    pub fn new(bpm: f64, look_ahead: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            bpm,
            look_ahead: look_ahead.max(0.0),
            anchor_time: 0.0,
            next_index: 0,
            playing_step: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    #[must_use]
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    #[must_use]
    pub fn current_step(&self) -> usize {
        (self.next_index % STEPS_PER_LOOP as u64) as usize
    }

    #[must_use]
    pub fn playing_step(&self) -> Option<usize> {
        self.playing_step
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        time::tick_interval(self.bpm)
    }

    /// Step times are measured from the start anchor, so a running transport
    /// should be restarted after a tempo change.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm;
    }

    pub fn start(&mut self, now: f64) -> bool {
        if self.is_running() {
            debug!("start ignored, transport already running");
            return false;
        }

        self.state = TransportState::Running;
        self.anchor_time = now;
        self.next_index = 0;
        self.playing_step = None;
        info!(bpm = self.bpm, anchor_time = now, "transport started");
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }

        self.state = TransportState::Stopped;
        self.next_index = 0;
        self.playing_step = None;
        info!("transport stopped");
        true
    }

    /// Hands out steps due before `now + look_ahead`, at most one loop's worth
    /// per call. Steps more than one step duration in the past are skipped
    /// rather than played in a burst.
    pub fn poll(&mut self, now: f64) -> Vec<ScheduledStep> {
        if !self.is_running() {
            return Vec::new();
        }

        let step_duration = time::step_duration_seconds(self.bpm);
        if step_duration <= 0.0 {
            return Vec::new();
        }
        let horizon = now + self.look_ahead;
        let mut due = Vec::new();

        while due.len() < STEPS_PER_LOOP {
            let target = time::step_start_seconds(self.anchor_time, self.next_index, self.bpm);
            if target > horizon {
                break;
            }

            let step = self.current_step();
            if target + step_duration < now {
                let first_live = ((now - self.anchor_time) / step_duration - 1.0).ceil();
                let resume_at = (first_live as u64).max(self.next_index + 1);
                warn!(
                    step,
                    target,
                    now,
                    dropped = resume_at - self.next_index,
                    "dropping late steps"
                );
                self.next_index = resume_at;
                continue;
            }

            due.push(ScheduledStep {
                index: self.next_index,
                step,
                time: target,
            });
            self.playing_step = Some(step);
            self.next_index += 1;
        }

        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_dispatches_step_zero_at_start_time() {
        let mut transport = Transport::new(120.0, 0.0);
        transport.start(3.0);
        let due = transport.poll(3.0);
        assert_eq!(
            due,
            vec![ScheduledStep {
                index: 0,
                step: 0,
                time: 3.0
            }]
        );
        assert_eq!(transport.current_step(), 1);
    }

    #[test]
    fn look_ahead_schedules_future_steps_at_exact_times() {
        let mut transport = Transport::new(120.0, 0.3);
        transport.start(0.0);
        let due = transport.poll(0.0);
        let times: Vec<f64> = due.iter().map(|step| step.time).collect();
        assert_eq!(times, vec![0.0, 0.125, 0.25]);
        assert!(transport.poll(0.01).is_empty());
    }

    #[test]
    fn step_index_wraps_after_one_loop() {
        let mut transport = Transport::new(120.0, 0.0);
        transport.start(0.0);
        let due: Vec<ScheduledStep> = (0..=40)
            .flat_map(|tick| transport.poll(f64::from(tick) * 0.05))
            .collect();
        assert_eq!(due.len(), 17);
        assert_eq!(due[16].step, 0);
        assert_eq!(due[16].index, 16);
    }

    #[test]
    fn stalled_host_skips_stale_steps() {
        let mut transport = Transport::new(120.0, 0.0);
        transport.start(0.0);
        let due = transport.poll(1.0);
        assert_eq!(due.first().map(|step| step.index), Some(7));
        assert_eq!(due.last().map(|step| step.index), Some(8));
    }

    #[test]
    fn long_stall_skips_in_one_jump() {
        let mut transport = Transport::new(120.0, 0.0);
        transport.start(0.0);
        let due = transport.poll(3_600.0);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].index, 28_799);
        assert_eq!(due[1].index, 28_800);
        assert!((due[1].time - 3_600.0).abs() < 1e-9);
    }

    #[test]
    fn one_poll_never_hands_out_more_than_a_loop() {
        let mut transport = Transport::new(120.0, 10.0);
        transport.start(0.0);
        let first = transport.poll(0.0);
        assert_eq!(first.len(), STEPS_PER_LOOP);
        assert_eq!(first.last().map(|step| step.index), Some(15));

        let second = transport.poll(0.0);
        assert_eq!(second.len(), STEPS_PER_LOOP);
        assert_eq!(second[0].index, 16);
        assert!((second[0].time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn stopped_transport_never_dispatches() {
        let mut transport = Transport::new(120.0, 0.1);
        assert!(transport.poll(0.0).is_empty());
        transport.start(0.0);
        transport.stop();
        assert!(transport.poll(5.0).is_empty());
        assert_eq!(transport.current_step(), 0);
        assert_eq!(transport.playing_step(), None);
    }
}
