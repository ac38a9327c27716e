//! Driving-regime kinematics engine
//!
//! A regime is one kinematic behavior segment of the train. Regimes are
//! immutable values: when the optimizer moves a boundary it builds a new
//! regime and re-simulates, it never patches a cached profile in place.

use anyhow::{ensure, Result};
use ordered_float::OrderedFloat;

use super::physics::{step_time, step_time_reverse, TrainPhysics};
use super::types::{slope_at, IntervalPoint, RuntimeResult};
use super::units::{Acceleration, Length, Slope, Speed, Time};

/// The four driving regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegimeKind {
    /// Full traction up to the allowed speed.
    Acceleration,
    /// Hold the entry speed; traction exactly cancels resistance.
    Cruising,
    /// Traction cut, resistance only.
    Coasting,
    /// Constant service braking.
    Braking,
}

impl RegimeKind {
    /// Net acceleration of the train under this regime at speed `v`.
    pub fn net_acceleration(self, tp: &TrainPhysics, v: Speed, slope: Slope) -> Acceleration {
        let resistance = tp.resistive_force(v, slope) / tp.effective_mass();
        let driving = match self {
            Self::Cruising => resistance,
            Self::Coasting => Acceleration::ZERO,
            Self::Braking => tp.deceleration(),
            Self::Acceleration => tp.tractive_force(v) / tp.effective_mass(),
        };
        driving - resistance
    }
}

/// One driving regime over `[start, end]`.
///
/// `vel0` is the entry speed for forward-simulated regimes and the exit
/// speed for backward-simulated ones (braking, resistive coasting), since
/// those are solved from their known end state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivingRegime {
    pub kind: RegimeKind,
    pub start: Length,
    pub end: Length,
    pub vel0: Speed,
    pub t0: Time,
}

impl DrivingRegime {
    pub fn new(kind: RegimeKind, start: Length, end: Length, vel0: Speed, t0: Time) -> Self {
        Self {
            kind,
            start,
            end,
            vel0,
            t0,
        }
    }

    /// Simulates this regime over `[start, end]` (not necessarily the
    /// regime's own bounds) with a fixed position step.
    ///
    /// Forward simulation interprets `velocity` as the entry speed,
    /// backward simulation as the exit speed. The first and last samples
    /// lie exactly on `start` and `end`.
    #[allow(clippy::too_many_arguments)]
    pub fn simulate(
        &self,
        tp: &TrainPhysics,
        points: &[IntervalPoint],
        start: Length,
        end: Length,
        velocity: Speed,
        time_offset: Time,
        step: Length,
        reverse: bool,
    ) -> Result<Vec<RuntimeResult>> {
        let allowed = check_simulation_params(tp, points, start, end, velocity, time_offset, step)?;
        if reverse {
            self.simulate_backward(tp, points, start, end, velocity, time_offset, step, allowed)
        } else {
            self.simulate_forward(tp, points, start, end, velocity, time_offset, step, allowed)
        }
    }

    /// Simulates over the regime's own bounds, picking the simulation
    /// direction: braking is always solved backward from its exit speed,
    /// and so is coasting when resistance makes its net acceleration
    /// negative (a frictionless coast is just a forward cruise).
    pub fn run(
        &self,
        tp: &TrainPhysics,
        points: &[IntervalPoint],
        step: Length,
    ) -> Result<Vec<RuntimeResult>> {
        let reverse = match self.kind {
            RegimeKind::Braking => true,
            RegimeKind::Coasting => {
                let slope = slope_at(points, self.start);
                self.kind.net_acceleration(tp, self.vel0, slope) < Acceleration::ZERO
            }
            _ => false,
        };
        self.simulate(
            tp,
            points,
            self.start,
            self.end,
            self.vel0,
            self.t0,
            step,
            reverse,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn simulate_forward(
        &self,
        tp: &TrainPhysics,
        points: &[IntervalPoint],
        start: Length,
        end: Length,
        vel_start: Speed,
        time_offset: Time,
        step: Length,
        allowed: Speed,
    ) -> Result<Vec<RuntimeResult>> {
        let steps = ((end - start) / step).round() as usize;

        let mut samples = Vec::with_capacity(steps + 1);
        let mut time = time_offset;
        let mut velocity = vel_start;
        let mut prev_pos = start;
        samples.push(RuntimeResult::new(time, prev_pos, velocity));

        for k in 1..=steps {
            // the last step lands on the boundary exactly
            let pos = if k == steps {
                end
            } else {
                start + step * k as f64
            };
            let slope = slope_at(points, prev_pos);
            let acc = self.kind.net_acceleration(tp, velocity, slope);

            match step_time(acc, velocity, prev_pos, pos)? {
                Some((dt, next_velocity)) => {
                    time += dt;
                    velocity = next_velocity.clamp(Speed::ZERO, allowed);
                }
                None => {
                    // the train stops short of this step; the rest of the
                    // profile is unreachable
                    time = Time::invalid();
                    velocity = Speed::ZERO;
                }
            }
            debug_assert!(velocity <= allowed);

            samples.push(RuntimeResult::new(time, pos, velocity));
            prev_pos = pos;
        }

        Ok(samples)
    }

    #[allow(clippy::too_many_arguments)]
    fn simulate_backward(
        &self,
        tp: &TrainPhysics,
        points: &[IntervalPoint],
        start: Length,
        end: Length,
        vel_end: Speed,
        time_offset: Time,
        step: Length,
        allowed: Speed,
    ) -> Result<Vec<RuntimeResult>> {
        let steps = ((end - start) / step).round() as usize;

        // Walk from the known end state toward the start; each sample's
        // time field temporarily holds the duration of the step leading
        // up to it.
        let mut samples = Vec::with_capacity(steps + 1);
        let mut velocity = vel_end;
        let mut prev_pos = end;
        samples.push(RuntimeResult::new(Time::ZERO, prev_pos, velocity));

        for k in 1..=steps {
            let pos = if k == steps {
                start
            } else {
                end - step * k as f64
            };
            let slope = slope_at(points, pos);
            let acc = self.kind.net_acceleration(tp, velocity, slope);

            let (dt, prev_velocity) = step_time_reverse(acc, velocity, pos, prev_pos)?;
            velocity = prev_velocity.clamp(Speed::ZERO, allowed);
            debug_assert!(velocity <= allowed);

            samples.push(RuntimeResult::new(dt, pos, velocity));
            prev_pos = pos;
        }

        // Reverse into path order and turn per-step durations into
        // accumulated times based at the caller's offset.
        samples.reverse();
        let mut accumulated = time_offset;
        for sample in &mut samples {
            let step_duration = sample.time;
            sample.time = accumulated;
            accumulated += step_duration;
        }

        Ok(samples)
    }
}

/// A regime together with its simulated profile. Rebuilt wholesale whenever
/// a boundary changes.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeRun {
    pub regime: DrivingRegime,
    pub samples: Vec<RuntimeResult>,
}

impl RegimeRun {
    /// Simulates `regime` over its own bounds.
    pub fn new(
        regime: DrivingRegime,
        tp: &TrainPhysics,
        points: &[IntervalPoint],
        step: Length,
    ) -> Result<Self> {
        let samples = regime.run(tp, points, step)?;
        Ok(Self { regime, samples })
    }

    /// Minimum and maximum speed reached over the simulated profile.
    pub fn speed_range(&self) -> (Speed, Speed) {
        let min = self
            .samples
            .iter()
            .map(|r| OrderedFloat(r.speed.as_m_s()))
            .min()
            .map_or(Speed::invalid(), |v| Speed::from_m_s(v.into_inner()));
        let max = self
            .samples
            .iter()
            .map(|r| OrderedFloat(r.speed.as_m_s()))
            .max()
            .map_or(Speed::invalid(), |v| Speed::from_m_s(v.into_inner()));
        (min, max)
    }

    /// Time spent traversing this regime.
    pub fn transit_time(&self) -> Time {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => Time::ZERO,
        }
    }
}

/// Validates the shared simulation preconditions and returns the allowed
/// maximum speed over the simulated range.
fn check_simulation_params(
    tp: &TrainPhysics,
    points: &[IntervalPoint],
    start: Length,
    end: Length,
    velocity: Speed,
    time_offset: Time,
    step: Length,
) -> Result<Speed> {
    ensure!(
        !points.is_empty(),
        "simulation needs at least one interval point"
    );
    ensure!(
        points
            .iter()
            .all(|p| p.speed_limit == points[0].speed_limit),
        "all interval points of a simulated range must share one speed limit"
    );
    ensure!(start >= Length::ZERO, "simulation start must not be negative");
    ensure!(start < end, "simulation start must lie before its end");
    ensure!(step > Length::ZERO, "position step must be positive");
    ensure!(
        (end - start).is_multiple_of(step),
        "simulated range must be a whole number of position steps"
    );
    ensure!(velocity >= Speed::ZERO, "boundary speed must not be negative");
    ensure!(
        time_offset >= Time::ZERO,
        "time offset must not be negative"
    );

    let allowed = tp.allowed_speed(points[0].speed_limit);
    ensure!(
        velocity <= allowed,
        "boundary speed exceeds the allowed maximum of {allowed}"
    );
    Ok(allowed)
}
