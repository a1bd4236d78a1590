//! In-process injection-moulding machine simulator.
//!
//! One moulding cycle runs PreInjection → Injection → Holding → Cooling →
//! Waiting and repeats. Each stage drives the four sensors with a ramp, a
//! constant level or a sine wave inside the stage's nominal range, plus
//! Gaussian noise of 5% of that range.
//!
//! With small probability a stage carries an anomaly: one sensor grows
//! exponentially until it leaves its range by more than half the range width.
//! The machine then sits in `PartReplacement` for 30 seconds before starting a
//! fresh cycle.

use std::time::{Duration, Instant};

use mc_common::{now_timestamp_us, FailureLabel, Sample, StageLabel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{SampleSource, SourceError};

const NOISE_FRACTION: f64 = 0.05;
const CATASTROPHE_TOLERANCE: f64 = 0.5;
const PART_REPLACEMENT_SECS: f64 = 30.0;
const DEFAULT_ANOMALY_PROBABILITY: f64 = 0.1;

/// Stage of the simulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineStage {
    PreInjection,
    Injection,
    Holding,
    Cooling,
    Waiting,
    PartReplacement,
}

impl MachineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            MachineStage::PreInjection => "PreInjection",
            MachineStage::Injection => "Injection",
            MachineStage::Holding => "Holding",
            MachineStage::Cooling => "Cooling",
            MachineStage::Waiting => "Waiting",
            MachineStage::PartReplacement => "PartReplacement",
        }
    }

    fn next(self) -> MachineStage {
        match self {
            MachineStage::PreInjection => MachineStage::Injection,
            MachineStage::Injection => MachineStage::Holding,
            MachineStage::Holding => MachineStage::Cooling,
            MachineStage::Cooling => MachineStage::Waiting,
            MachineStage::Waiting | MachineStage::PartReplacement => MachineStage::PreInjection,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    RampUp,
    RampDown,
    Constant,
    Periodic { period_secs: f64 },
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    low: f64,
    high: f64,
    shape: Shape,
}

impl Channel {
    const fn new(low: f64, high: f64, shape: Shape) -> Self {
        Channel { low, high, shape }
    }

    fn width(&self) -> f64 {
        (self.high - self.low).abs()
    }

    fn base_value(&self, elapsed: f64, duration: f64) -> f64 {
        let progress = if duration > 0.0 {
            (elapsed / duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        match self.shape {
            Shape::RampUp => self.low + progress * (self.high - self.low),
            Shape::RampDown => self.high - progress * (self.high - self.low),
            Shape::Constant => (self.low + self.high) / 2.0,
            Shape::Periodic { period_secs } => {
                let offset = (self.high + self.low) / 2.0;
                let amplitude = (self.high - self.low) / 2.0;
                offset + amplitude * (std::f64::consts::TAU * elapsed / period_secs).sin()
            }
        }
    }

    fn is_catastrophic(&self, value: f64) -> bool {
        let tolerance = CATASTROPHE_TOLERANCE * self.width();
        value < self.low - tolerance || value > self.high + tolerance
    }
}

/// Nominal behaviour of one stage.
#[derive(Debug, Clone, Copy)]
struct StageProfile {
    base_secs: f64,
    /// Whether the duration varies by ±20% per cycle.
    jitter: bool,
    /// melt_temp, injection_pressure, vibration_amplitude, vibration_frequency
    channels: [Channel; 4],
    anomaly_eligible: bool,
}

const VIB_PERIOD: Shape = Shape::Periodic { period_secs: 2.0 };

fn profile(stage: MachineStage) -> StageProfile {
    use Shape::*;
    match stage {
        MachineStage::PreInjection => StageProfile {
            base_secs: 5.0,
            jitter: true,
            channels: [
                Channel::new(50.0, 250.0, RampUp),
                Channel::new(0.0, 100.0, Constant),
                Channel::new(0.0, 0.5, Constant),
                Channel::new(5.0, 15.0, VIB_PERIOD),
            ],
            anomaly_eligible: true,
        },
        MachineStage::Injection => StageProfile {
            base_secs: 2.0,
            jitter: true,
            channels: [
                Channel::new(220.0, 280.0, Constant),
                Channel::new(500.0, 2000.0, RampUp),
                Channel::new(0.5, 2.0, Constant),
                Channel::new(40.0, 60.0, VIB_PERIOD),
            ],
            anomaly_eligible: true,
        },
        MachineStage::Holding => StageProfile {
            base_secs: 3.0,
            jitter: false,
            channels: [
                Channel::new(220.0, 280.0, Constant),
                Channel::new(300.0, 1000.0, Constant),
                Channel::new(0.2, 1.0, Constant),
                Channel::new(20.0, 40.0, VIB_PERIOD),
            ],
            anomaly_eligible: true,
        },
        MachineStage::Cooling => StageProfile {
            base_secs: 5.0,
            jitter: true,
            channels: [
                Channel::new(50.0, 100.0, RampDown),
                Channel::new(0.0, 100.0, Constant),
                Channel::new(0.0, 0.5, Constant),
                Channel::new(5.0, 15.0, VIB_PERIOD),
            ],
            anomaly_eligible: true,
        },
        MachineStage::Waiting => StageProfile {
            base_secs: 30.0,
            jitter: false,
            channels: [
                Channel::new(30.0, 40.0, Constant),
                Channel::new(0.0, 50.0, Constant),
                Channel::new(0.0, 0.2, Constant),
                Channel::new(5.0, 10.0, VIB_PERIOD),
            ],
            anomaly_eligible: false,
        },
        // Machine stopped: readings idle at the Waiting levels.
        MachineStage::PartReplacement => StageProfile {
            base_secs: PART_REPLACEMENT_SECS,
            jitter: false,
            channels: profile(MachineStage::Waiting).channels,
            anomaly_eligible: false,
        },
    }
}

/// Where the simulator takes its notion of elapsed time from.
#[derive(Debug, Clone, Copy)]
enum TimeBase {
    Wall { started: Instant },
    /// Advance a fixed step per read. Deterministic for tests and replays.
    Stepped { step_secs: f64, now_secs: f64 },
}

/// Seedable injection-moulding simulator.
#[derive(Debug)]
pub struct MouldingSimulator {
    rng: StdRng,
    seed: Option<u64>,
    time: TimeBase,
    epoch_us: u64,
    stage: MachineStage,
    stage_started: f64,
    stage_duration: f64,
    /// Index of the sensor running away in this stage.
    anomaly: Option<usize>,
    anomaly_probability: f64,
    cycles: u64,
    catastrophes: u64,
}

impl MouldingSimulator {
    /// Simulator with a fixed random sequence. Stage timing follows the
    /// wall clock, so readings are reproducible only together with
    /// [`MouldingSimulator::with_step`].
    pub fn seeded(seed: u64) -> Self {
        Self::build(StdRng::seed_from_u64(seed), Some(seed))
    }

    pub fn from_entropy() -> Self {
        Self::build(StdRng::from_os_rng(), None)
    }

    fn build(rng: StdRng, seed: Option<u64>) -> Self {
        let mut sim = MouldingSimulator {
            rng,
            seed,
            time: TimeBase::Wall {
                started: Instant::now(),
            },
            epoch_us: now_timestamp_us(),
            stage: MachineStage::PreInjection,
            stage_started: 0.0,
            stage_duration: 0.0,
            anomaly: None,
            anomaly_probability: DEFAULT_ANOMALY_PROBABILITY,
            cycles: 0,
            catastrophes: 0,
        };
        sim.enter(MachineStage::PreInjection, 0.0);
        sim
    }

    /// Advance simulated time by `step` per read instead of following the
    /// wall clock.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.time = TimeBase::Stepped {
            step_secs: step.as_secs_f64(),
            now_secs: 0.0,
        };
        self
    }

    /// Probability that a stage carries an anomaly. Applies from the next
    /// stage entry.
    pub fn with_anomaly_probability(mut self, probability: f64) -> Self {
        self.anomaly_probability = probability.clamp(0.0, 1.0);
        let now = self.stage_started;
        self.enter(self.stage, now);
        self
    }

    pub fn stage(&self) -> MachineStage {
        self.stage
    }

    /// Completed moulding cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Anomalies that escalated to a part replacement.
    pub fn catastrophes(&self) -> u64 {
        self.catastrophes
    }

    fn elapsed_secs(&mut self) -> f64 {
        match &mut self.time {
            TimeBase::Wall { started } => started.elapsed().as_secs_f64(),
            TimeBase::Stepped {
                step_secs,
                now_secs,
            } => {
                let now = *now_secs;
                *now_secs += *step_secs;
                now
            }
        }
    }

    fn enter(&mut self, stage: MachineStage, now: f64) {
        let profile = profile(stage);
        self.stage = stage;
        self.stage_started = now;
        self.stage_duration = if profile.jitter {
            profile.base_secs * self.rng.random_range(0.8..1.2)
        } else {
            profile.base_secs
        };
        self.anomaly = if profile.anomaly_eligible && self.rng.random_bool(self.anomaly_probability)
        {
            Some(self.rng.random_range(0..4))
        } else {
            None
        };
    }

    fn gaussian(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    fn step(&mut self, now: f64) -> (MachineStage, [f64; 4]) {
        while now - self.stage_started >= self.stage_duration {
            let boundary = self.stage_started + self.stage_duration;
            if self.stage == MachineStage::Waiting {
                self.cycles += 1;
            }
            let next = self.stage.next();
            self.enter(next, boundary);
        }

        let profile = profile(self.stage);
        let elapsed = now - self.stage_started;
        let mut values = [0.0; 4];
        for (i, channel) in profile.channels.iter().enumerate() {
            let mut value = channel.base_value(elapsed, self.stage_duration);
            if self.anomaly == Some(i) {
                value *= (elapsed / 2.0).exp();
            }
            values[i] = value + self.gaussian() * channel.width() * NOISE_FRACTION;
        }

        let stage = self.stage;
        if stage != MachineStage::PartReplacement
            && profile
                .channels
                .iter()
                .zip(values.iter())
                .any(|(channel, value)| channel.is_catastrophic(*value))
        {
            self.catastrophes += 1;
            tracing::debug!(stage = stage.as_str(), "simulated catastrophic failure");
            self.enter(MachineStage::PartReplacement, now);
        }
        (stage, values)
    }
}

impl SampleSource for MouldingSimulator {
    fn read_sample(&mut self) -> Result<Sample, SourceError> {
        let now = self.elapsed_secs();
        let (stage, values) = self.step(now);
        Ok(Sample {
            timestamp_us: self.epoch_us + (now * 1_000_000.0) as u64,
            melt_temp: values[0],
            injection_pressure: values[1],
            vibration_amplitude: values[2],
            vibration_frequency: values[3],
            stage: StageLabel::new(stage.as_str()),
            failure_label: FailureLabel::None,
        })
    }

    fn describe(&self) -> String {
        match self.seed {
            Some(seed) => format!("sim://{}", seed),
            None => "sim://".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn stepped(seed: u64) -> MouldingSimulator {
        MouldingSimulator::seeded(seed).with_step(Duration::from_millis(100))
    }

    #[test]
    fn test_same_seed_same_readings() {
        let mut a = stepped(7);
        let mut b = stepped(7);
        for _ in 0..200 {
            let sa = a.read_sample().unwrap();
            let sb = b.read_sample().unwrap();
            assert_eq!(sa.stage, sb.stage);
            assert_eq!(sa.melt_temp.to_bits(), sb.melt_temp.to_bits());
        }
    }

    #[test]
    fn test_stages_follow_cycle() {
        let mut sim = stepped(3).with_anomaly_probability(0.0);
        let mut order = Vec::new();
        for _ in 0..600 {
            let stage = sim.read_sample().unwrap().stage.as_str().to_string();
            if order.last() != Some(&stage) {
                order.push(stage);
            }
        }
        assert_eq!(
            &order[..6],
            &["PreInjection", "Injection", "Holding", "Cooling", "Waiting", "PreInjection"]
        );
        assert_eq!(sim.cycles(), 1);
        assert_eq!(sim.catastrophes(), 0);
    }

    #[test]
    fn test_anomaly_leads_to_part_replacement() {
        let mut sim = stepped(11).with_anomaly_probability(1.0);
        let stages: HashSet<String> = (0..100)
            .map(|_| sim.read_sample().unwrap().stage.as_str().to_string())
            .collect();
        assert!(stages.contains("PartReplacement"));
        assert!(sim.catastrophes() >= 1);
    }

    #[test]
    fn test_part_replacement_lasts_thirty_seconds() {
        let mut sim = stepped(5).with_anomaly_probability(1.0);
        let mut reads_in_replacement = 0;
        let mut seen = false;
        for _ in 0..1000 {
            let sample = sim.read_sample().unwrap();
            if sample.stage.as_str() == "PartReplacement" {
                seen = true;
                reads_in_replacement += 1;
            } else if seen {
                break;
            }
        }
        // 30 s at 100 ms per read, give or take the boundary read.
        assert!((299..=301).contains(&reads_in_replacement), "{reads_in_replacement}");
    }

    #[test]
    fn test_timestamps_monotonic_and_finite_values() {
        let mut sim = stepped(1);
        let mut last = 0;
        for _ in 0..500 {
            let s = sim.read_sample().unwrap();
            assert!(s.timestamp_us >= last);
            last = s.timestamp_us;
            assert!(s.melt_temp.is_finite());
            assert!(s.vibration_frequency.is_finite());
            assert_eq!(s.failure_label, FailureLabel::None);
        }
    }

    #[test]
    fn test_ramp_shapes() {
        let up = Channel::new(50.0, 250.0, Shape::RampUp);
        assert_eq!(up.base_value(0.0, 5.0), 50.0);
        assert_eq!(up.base_value(10.0, 5.0), 250.0);
        let down = Channel::new(50.0, 100.0, Shape::RampDown);
        assert_eq!(down.base_value(2.5, 5.0), 75.0);
        assert!(up.is_catastrophic(351.0));
        assert!(!up.is_catastrophic(349.0));
    }
}
