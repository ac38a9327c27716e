//! Speed-interval model of the path
//!
//! Collapses the raw per-position speed-limit sequence into maximal
//! same-limit runs and carries the driving regimes the optimizer assigns
//! to each run.

use anyhow::{ensure, Context, Result};
use ordered_float::OrderedFloat;

use super::intersect::intersection_with_constant;
use super::physics::TrainPhysics;
use super::regime::{DrivingRegime, RegimeKind, RegimeRun};
use super::types::{IntervalPoint, RuntimeResult};
use super::units::{Length, Speed, Time};

/// A maximal contiguous track range sharing one speed limit.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedInterval {
    pub start: Length,
    pub end: Length,
    pub speed_limit: Speed,
    /// A halt interval ends at a scheduled stopping point.
    pub halt: bool,
    /// The raw path points making up this range.
    pub points: Vec<IntervalPoint>,
    /// Driving regimes tiling `[start, end]`, in path order.
    pub regimes: Vec<RegimeRun>,
}

impl SpeedInterval {
    pub fn new(
        start: Length,
        end: Length,
        speed_limit: Speed,
        halt: bool,
        points: Vec<IntervalPoint>,
    ) -> Self {
        Self {
            start,
            end,
            speed_limit,
            halt,
            points,
            regimes: Vec::new(),
        }
    }

    pub fn length(&self) -> Length {
        self.end - self.start
    }

    pub fn has_regime(&self, kind: RegimeKind) -> bool {
        self.regimes.iter().any(|run| run.regime.kind == kind)
    }

    /// Time the train needs to pass this interval in its last simulation.
    pub fn transit_time(&self) -> Time {
        match (self.regimes.first(), self.regimes.last()) {
            (Some(first), Some(last)) => {
                let start = first.samples.first().map_or(Time::ZERO, |s| s.time);
                let end = last.samples.last().map_or(Time::ZERO, |s| s.time);
                end - start
            }
            _ => Time::ZERO,
        }
    }

    /// The simulated sample at `pos`, from the first regime covering it.
    fn sample_at(&self, pos: Length) -> Result<&RuntimeResult> {
        ensure!(
            self.start <= pos && pos <= self.end,
            "position {pos} outside speed interval [{}, {}]",
            self.start,
            self.end
        );

        let run = self
            .regimes
            .iter()
            .find(|run| run.regime.start <= pos && pos <= run.regime.end)
            .context("position not covered by any driving regime")?;

        let idx = run.samples.partition_point(|s| s.distance < pos);
        run.samples
            .get(idx)
            .context("position not covered by the regime's samples")
    }

    pub fn time_at(&self, pos: Length) -> Result<Time> {
        Ok(self.sample_at(pos)?.time)
    }

    pub fn time_at_end(&self) -> Result<Time> {
        self.time_at(self.end)
    }

    pub fn speed_at(&self, pos: Length) -> Result<Speed> {
        Ok(self.sample_at(pos)?.speed)
    }

    /// The driving-regime kind in effect at `pos`.
    pub fn kind_at(&self, pos: Length) -> Result<RegimeKind> {
        ensure!(
            self.start <= pos && pos <= self.end,
            "position {pos} outside speed interval [{}, {}]",
            self.start,
            self.end
        );
        self.regimes
            .iter()
            .find(|run| run.regime.start <= pos && pos <= run.regime.end)
            .map(|run| run.regime.kind)
            .context("position not covered by any driving regime")
    }

    /// Valid cruising-speed candidates for this interval.
    ///
    /// The lower bound is the acceleration phase's minimum; with
    /// `safe_range` it is raised to the final phase's minimum so a cruise
    /// can never change the interval's exit speed. The upper bound is the
    /// fastest speed reached anywhere.
    pub fn cruising_speed_range(&self, safe_range: bool) -> (Speed, Speed) {
        let mut min_speed = self
            .regimes
            .first()
            .map_or(Speed::invalid(), |run| run.speed_range().0);

        if self.has_regime(RegimeKind::Coasting) || self.has_regime(RegimeKind::Braking) {
            if let Some(last) = self.regimes.last() {
                let (last_min, _) = last.speed_range();
                if safe_range && min_speed < last_min {
                    min_speed = last_min;
                }
            }
        }

        let max_speed = self
            .regimes
            .iter()
            .map(|run| OrderedFloat(run.speed_range().1.as_m_s()))
            .max()
            .map_or(Speed::invalid(), |v| Speed::from_m_s(v.into_inner()));

        (min_speed, max_speed)
    }

    /// The range over which cruising at `candidate` would replace faster
    /// driving: from the acceleration profile's first crossing of the
    /// candidate to the coasting (preferred) or braking profile's last
    /// crossing. `None` when either end is missing.
    pub fn cruising_interval(&self, candidate: Speed) -> Result<Option<(Length, Length)>> {
        ensure!(
            self.has_regime(RegimeKind::Acceleration),
            "cruising interval needs an acceleration regime"
        );
        ensure!(
            self.has_regime(RegimeKind::Coasting) || self.has_regime(RegimeKind::Braking),
            "cruising interval needs a coasting or braking regime"
        );

        let first = self.regimes.first().expect("regimes checked above");
        let Some(start) = intersection_with_constant(&first.samples, candidate, true) else {
            return Ok(None);
        };

        let mut end = None;
        if self.has_regime(RegimeKind::Coasting) && self.regimes.len() >= 2 {
            let coasting = &self.regimes[self.regimes.len() - 2];
            end = intersection_with_constant(&coasting.samples, candidate, false);
        }
        if end.is_none() {
            let last = self.regimes.last().expect("regimes checked above");
            end = intersection_with_constant(&last.samples, candidate, false);
        }

        Ok(end.map(|end| (start, end)))
    }

    /// How the interval's transit time would change when cruising at
    /// `candidate` replaced the profile over its cruising interval.
    /// Zero when no cruising interval exists.
    pub fn transit_time_difference_cruising(&self, candidate: Speed) -> Result<Time> {
        let Some((cruise_start, cruise_end)) = self.cruising_interval(candidate)? else {
            return Ok(Time::ZERO);
        };

        let dt_pre = self.time_at(cruise_start)? - self.time_at(self.start)?;
        let dt_post = self.time_at(self.end)? - self.time_at(cruise_end)?;
        let dt_cruise = (cruise_end - cruise_start) / candidate;

        Ok(dt_pre + dt_cruise + dt_post - self.transit_time())
    }
}

/// Collapses a halt-to-halt point sequence into maximal same-limit speed
/// intervals. The final run always comes out as a halt interval.
pub fn get_speed_intervals(points: &[IntervalPoint]) -> Result<Vec<SpeedInterval>> {
    if points.is_empty() {
        return Ok(Vec::new());
    }

    ensure!(
        points.len() >= 2,
        "speed intervals need at least two interval points"
    );
    ensure!(
        points[0].halt,
        "the first interval point must be a halt"
    );
    ensure!(
        points[points.len() - 1].halt,
        "the last interval point must be a halt"
    );
    ensure!(
        points.windows(2).all(|p| p[0].distance <= p[1].distance),
        "interval point distances must be non-decreasing"
    );

    let mut result = Vec::new();
    let mut current_points = vec![points[0].clone()];
    let mut start = points[0].distance;
    let mut end = points[1].distance;

    // The last point only bounds the second-to-last one, so it never opens
    // a run of its own.
    for i in 1..points.len() - 1 {
        ensure!(
            !points[i].halt,
            "no halt allowed between the first and last interval point"
        );

        if current_points[0].speed_limit == points[i].speed_limit {
            end = points[i + 1].distance;
            current_points.push(points[i].clone());
        } else {
            let speed_limit = current_points[0].speed_limit;
            result.push(SpeedInterval::new(
                start,
                end,
                speed_limit,
                false,
                std::mem::replace(&mut current_points, vec![points[i].clone()]),
            ));
            start = end;
            end = points[i + 1].distance;
        }
    }

    let speed_limit = current_points[0].speed_limit;
    result.push(SpeedInterval::new(start, end, speed_limit, true, current_points));

    Ok(result)
}

/// Re-simulates every regime of every interval in path order, rebasing
/// each regime's clock, and stitches the samples into one profile without
/// boundary duplicates.
pub fn run_complete(
    tp: &TrainPhysics,
    intervals: &mut [SpeedInterval],
    step: Length,
) -> Result<Vec<RuntimeResult>> {
    run_from(tp, intervals, step, 0)
}

/// Like [`run_complete`], but reuses the cached profiles of all intervals
/// before `from_idx`; their samples are already consistent because nothing
/// upstream of them changed.
pub fn run_from(
    tp: &TrainPhysics,
    intervals: &mut [SpeedInterval],
    step: Length,
    from_idx: usize,
) -> Result<Vec<RuntimeResult>> {
    ensure!(
        from_idx < intervals.len().max(1),
        "re-simulation start index {from_idx} out of bounds"
    );

    let mut profile: Vec<RuntimeResult> = Vec::new();
    let mut current_time = Time::ZERO;

    for (idx, interval) in intervals.iter_mut().enumerate() {
        for run in &mut interval.regimes {
            if idx >= from_idx {
                let regime = DrivingRegime {
                    t0: current_time,
                    ..run.regime
                };
                run.samples = regime.run(tp, &interval.points, step)?;
                run.regime = regime;
            }

            // drop the shared boundary sample
            if !profile.is_empty() {
                profile.pop();
            }
            profile.extend(run.samples.iter().copied());
            current_time = profile
                .last()
                .context("regime simulation produced no samples")?
                .time;
        }
    }

    Ok(profile)
}
