//! Energy-efficient train control: the halt-to-halt driving-point optimizer
//!
//! For every halt-to-halt section the optimizer searches the coasting point
//! and the cruising speed that make the simulated travel time match the
//! scheduled one, maximizing the coasting share. Searches run over plain
//! candidate structs and commit into the speed intervals only on
//! convergence.

use anyhow::{ensure, Context, Result};
use log::{debug, warn};

use super::intersect::intersection_point;
use super::physics::TrainPhysics;
use super::regime::{DrivingRegime, RegimeKind, RegimeRun};
use super::search::golden_section_min;
use super::speed_profile::{get_speed_intervals, run_complete, SpeedInterval};
use super::types::{IntervalPoint, RuntimeResult, MIN_COASTING_STEP};
use super::units::{Length, Speed, Time};

/// Tolerance of the cruising-speed golden-section search.
const CRUISING_SPEED_TOLERANCE: Speed = Speed::new(1.0);

/// One scheduled stop (or pass) of the train.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleEntry {
    pub arrival: Time,
    pub departure: Time,
    pub halt: bool,
}

impl ScheduleEntry {
    pub fn halt(arrival: Time, departure: Time) -> Self {
        Self {
            arrival,
            departure,
            halt: true,
        }
    }

    pub fn pass(time: Time) -> Self {
        Self {
            arrival: time,
            departure: time,
            halt: false,
        }
    }
}

/// Working set of one halt-to-halt section.
#[derive(Debug, Clone)]
pub struct SheepmakerData {
    pub physics: TrainPhysics,
    pub points: Vec<IntervalPoint>,
    pub step: Length,

    pub speed_intervals: Vec<SpeedInterval>,
    pub start: ScheduleEntry,
    pub end: ScheduleEntry,

    /// Stitched profile of the whole section from the last simulation.
    pub results: Vec<RuntimeResult>,
}

impl SheepmakerData {
    pub fn new(
        physics: TrainPhysics,
        points: Vec<IntervalPoint>,
        step: Length,
        start: ScheduleEntry,
        end: ScheduleEntry,
    ) -> Self {
        Self {
            physics,
            points,
            step,
            speed_intervals: Vec::new(),
            start,
            end,
            results: Vec::new(),
        }
    }

    /// Scheduled travel time of this section.
    pub fn target_duration(&self) -> Time {
        self.end.arrival - self.start.departure
    }

    /// Simulated travel time of the last full run.
    pub fn travel_time(&self) -> Time {
        match (self.results.first(), self.results.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => Time::ZERO,
        }
    }

    /// Simulated clock at the section's end.
    pub fn time_at_end(&self) -> Result<Time> {
        self.speed_intervals
            .last()
            .context("section has no speed intervals")?
            .time_at_end()
    }
}

/// Runs the optimizer over a whole path: slices it into halt-to-halt
/// sections (distances rounded onto the step grid), pairs each with its
/// schedule halts and optimizes them in path order.
pub fn sheepmaker(
    tp: &TrainPhysics,
    points: &[IntervalPoint],
    schedule: &[ScheduleEntry],
    step: Length,
    threshold: f64,
) -> Result<Vec<SheepmakerData>> {
    ensure!(points.len() >= 2, "path needs at least two interval points");
    ensure!(
        points[0].halt && points[points.len() - 1].halt,
        "path must start and end with a halt"
    );
    ensure!(
        schedule.len() >= 2,
        "schedule needs at least two entries"
    );
    ensure!(
        schedule[0].halt && schedule[schedule.len() - 1].halt,
        "schedule must start and end with a halt"
    );

    let round = |point: &IntervalPoint| {
        let mut point = point.clone();
        point.distance = point.distance.round_to_step(step);
        point
    };

    let mut sections = Vec::new();
    let mut point_start = 0;
    let mut schedule_start = 0;

    while point_start < points.len() - 1 {
        let mut section_points = vec![round(&points[point_start])];
        let mut point_end = point_start;
        for (i, point) in points.iter().enumerate().skip(point_start + 1) {
            section_points.push(round(point));
            if point.halt {
                point_end = i;
                break;
            }
        }
        ensure!(point_end > point_start, "path must end in a halt");

        let schedule_end = (schedule_start + 1..schedule.len())
            .find(|&i| schedule[i].halt)
            .context("schedule has fewer halts than the path")?;

        let mut section = SheepmakerData::new(
            tp.clone(),
            section_points,
            step,
            schedule[schedule_start],
            schedule[schedule_end],
        );
        initialize_section(&mut section)?;
        optimize_section(&mut section, threshold)?;

        debug!(
            "section {}..{}: target {}, simulated {}",
            section.points[0].distance,
            section.points[section.points.len() - 1].distance,
            section.target_duration(),
            section.travel_time()
        );
        sections.push(section);

        point_start = point_end;
        schedule_start = schedule_end;
    }

    Ok(sections)
}

/// Builds the initial regime tiling of a section: per speed interval a
/// forward acceleration toward the limit, plus a backward braking run to
/// the required exit speed wherever the interval ends in a speed drop or a
/// halt; their shared boundary is the intersection of the two profiles.
pub fn initialize_section(data: &mut SheepmakerData) -> Result<()> {
    data.speed_intervals = get_speed_intervals(&data.points)?;

    let mut current_time = Time::ZERO;
    let mut current_velocity = Speed::ZERO;

    let count = data.speed_intervals.len();
    for i in 0..count {
        let next_limit = if i + 1 < count {
            Some(data.speed_intervals[i + 1].speed_limit)
        } else {
            None
        };
        let interval = &mut data.speed_intervals[i];

        let accelerate = DrivingRegime::new(
            RegimeKind::Acceleration,
            interval.start,
            interval.end,
            current_velocity,
            current_time,
        );
        let rr_accelerate = accelerate.simulate(
            &data.physics,
            &interval.points,
            interval.start,
            interval.end,
            current_velocity,
            current_time,
            data.step,
            false,
        )?;

        let needs_braking = match next_limit {
            None => true,
            Some(limit) => interval.speed_limit > limit,
        };

        if !needs_braking {
            let last = rr_accelerate.last().context("empty acceleration profile")?;
            current_time = last.time;
            current_velocity = last.speed;
            interval.regimes = vec![RegimeRun {
                regime: accelerate,
                samples: rr_accelerate,
            }];
            continue;
        }

        let target_velocity = if interval.halt {
            Speed::ZERO
        } else {
            next_limit.unwrap_or(Speed::ZERO)
        };
        let braking = DrivingRegime::new(
            RegimeKind::Braking,
            interval.start,
            interval.end,
            target_velocity,
            current_time,
        );
        let rr_braking = braking.simulate(
            &data.physics,
            &interval.points,
            interval.start,
            interval.end,
            target_velocity,
            current_time,
            data.step,
            true,
        )?;

        let boundary = intersection_point(&rr_accelerate, &rr_braking, true)?
            .context("acceleration and braking profiles do not intersect")?;
        ensure!(
            interval.start < boundary && boundary < interval.end,
            "acceleration/braking boundary must lie strictly inside the interval"
        );

        let accelerate = DrivingRegime {
            end: boundary,
            ..accelerate
        };
        let rr_accelerate = accelerate.simulate(
            &data.physics,
            &interval.points,
            accelerate.start,
            accelerate.end,
            current_velocity,
            current_time,
            data.step,
            false,
        )?;
        current_time = rr_accelerate
            .last()
            .context("empty acceleration profile")?
            .time;

        let braking = DrivingRegime {
            start: boundary,
            t0: current_time,
            ..braking
        };
        let rr_braking = braking.simulate(
            &data.physics,
            &interval.points,
            braking.start,
            braking.end,
            braking.vel0,
            current_time,
            data.step,
            true,
        )?;
        let last = rr_braking.last().context("empty braking profile")?;
        current_time = last.time;
        current_velocity = last.speed;

        interval.regimes = vec![
            RegimeRun {
                regime: accelerate,
                samples: rr_accelerate,
            },
            RegimeRun {
                regime: braking,
                samples: rr_braking,
            },
        ];
    }

    data.results = run_complete(&data.physics, &mut data.speed_intervals, data.step)?;
    Ok(())
}

/// Optimizes every braking interval of an initialized section: insert a
/// coasting point where none exists yet, then splice in a cruising phase.
pub fn optimize_section(data: &mut SheepmakerData, threshold: f64) -> Result<()> {
    ensure!(
        data.speed_intervals.last().is_some_and(|i| i.halt),
        "last speed interval must be a halt"
    );

    for idx in 0..data.speed_intervals.len() {
        let ends_in_braking = data.speed_intervals[idx]
            .regimes
            .last()
            .is_some_and(|run| run.regime.kind == RegimeKind::Braking);
        if !ends_in_braking {
            continue;
        }

        if !data.speed_intervals[idx].has_regime(RegimeKind::Coasting) {
            set_coasting_point(data, idx, threshold)?;
        }

        // skip the cruising splice once the schedule is already met
        let target = data.target_duration();
        let deviation = (data.travel_time() - target).as_s().abs() / target.as_s().max(1.0);
        if deviation > threshold {
            update_cruising_speed(data, idx, CRUISING_SPEED_TOLERANCE)?;
        }
    }

    Ok(())
}

/// Bisection state of the coasting-point search. The point and step only
/// ever move on the simulation grid; the step halves with every probe.
#[derive(Debug, Clone, Copy)]
struct CoastingSearch {
    point: Length,
    step: Length,
    grid: Length,
    last_step_right: bool,
}

impl CoastingSearch {
    fn new(interval: &SpeedInterval, grid: Length) -> Self {
        let step = Self::halve_on_grid(interval.length(), grid);
        Self {
            point: interval.start + step,
            step,
            grid,
            last_step_right: false,
        }
    }

    /// Half of `length`, rounded down onto the simulation grid.
    fn halve_on_grid(length: Length, grid: Length) -> Length {
        grid * ((0.5 * length) / grid).floor()
    }

    /// Whether the probe step can still move the point.
    fn exhausted(&self) -> bool {
        self.step <= MIN_COASTING_STEP || self.step < self.grid
    }

    fn step_left(&mut self) -> Length {
        self.last_step_right = false;
        self.step = Self::halve_on_grid(self.step, self.grid);
        self.point -= self.step;
        self.point
    }

    fn step_right(&mut self) -> Length {
        self.last_step_right = true;
        self.step = Self::halve_on_grid(self.step, self.grid);
        self.point += self.step;
        self.point
    }

    fn repeat_last(&mut self) -> Length {
        if self.last_step_right {
            self.step_right()
        } else {
            self.step_left()
        }
    }
}

/// The best coasting candidate seen so far.
#[derive(Debug, Clone, Copy)]
struct CoastingCandidate {
    point: Length,
    boundary: Length,
    exit_speed: Speed,
}

/// Searches the coasting point of one speed interval and commits it.
///
/// From each candidate position a coasting profile is simulated forward
/// and the braking profile backward; their intersection fixes the
/// coasting/braking boundary. The candidate moves by bisection until the
/// implied travel time deviates from the target by at most `threshold`
/// (relative), or the probe step is exhausted. When the step bottoms out
/// without any intersection at all, the interval keeps its plain
/// accelerate→brake tiling.
fn set_coasting_point(data: &mut SheepmakerData, idx: usize, threshold: f64) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&threshold),
        "threshold must lie in [0, 1]"
    );

    let target_duration = data.target_duration();

    let mut search = CoastingSearch::new(&data.speed_intervals[idx], data.step);
    let braking = data.speed_intervals[idx]
        .regimes
        .last()
        .context("interval has no regimes")?
        .regime;
    ensure!(
        search.point < data.speed_intervals[idx].regimes[0].regime.end,
        "initial coasting point must lie in the acceleration regime"
    );

    let mut best: Option<CoastingCandidate> = None;
    let mut finished = false;

    while !finished {
        let interval = &data.speed_intervals[idx];
        let t0 = interval.time_at(search.point)?;
        let vel0 = interval.speed_at(search.point)?;

        let coasting = DrivingRegime::new(RegimeKind::Coasting, search.point, braking.end, vel0, t0);
        let rr_coasting = coasting.simulate(
            &data.physics,
            &interval.points,
            search.point,
            braking.end,
            vel0,
            t0,
            data.step,
            false,
        )?;
        let rr_braking = braking.simulate(
            &data.physics,
            &interval.points,
            search.point,
            braking.end,
            braking.vel0,
            t0,
            data.step,
            true,
        )?;

        let Some(boundary) = intersection_point(&rr_coasting, &rr_braking, true)? else {
            if search.exhausted() {
                finished = true;
                continue;
            }
            match best {
                None => {
                    // probe toward the interior of the interval
                    if interval.kind_at(search.point)? == RegimeKind::Acceleration {
                        search.step_right();
                    } else {
                        search.step_left();
                    }
                }
                Some(best) => {
                    search.point = best.point;
                    search.repeat_last();
                }
            }
            continue;
        };

        let coast_at_boundary = sample_at(&rr_coasting, boundary)?;
        let brake_at_boundary = sample_at(&rr_braking, boundary)?;

        let time_in_acceleration =
            interval.time_at(search.point)? - interval.time_at(interval.start)?;
        let time_in_coasting = coast_at_boundary.time - rr_coasting[0].time;
        let time_in_braking = rr_braking[rr_braking.len() - 1].time - brake_at_boundary.time;
        let next_travel_time = time_in_acceleration + time_in_coasting + time_in_braking;

        best = Some(CoastingCandidate {
            point: search.point,
            boundary,
            exit_speed: coast_at_boundary.speed,
        });

        let deviation = (next_travel_time - target_duration).as_s().abs()
            / target_duration.as_s().max(1.0);
        if next_travel_time == target_duration || deviation <= threshold {
            finished = true;
            continue;
        }
        if search.exhausted() {
            finished = true;
            continue;
        }

        if next_travel_time < target_duration {
            // arriving early: coast earlier and longer
            search.step_left();
        } else {
            search.step_right();
        }
    }

    let Some(best) = best else {
        warn!(
            "no coasting point found in [{}, {}]; keeping accelerate→brake",
            data.speed_intervals[idx].start, data.speed_intervals[idx].end
        );
        return Ok(());
    };

    debug!(
        "coasting point committed at {} (boundary {})",
        best.point, best.boundary
    );

    let t0 = data.speed_intervals[idx].time_at(best.point)?;
    let interval = &mut data.speed_intervals[idx];

    let first = interval.regimes.first_mut().context("interval has no regimes")?;
    first.regime = DrivingRegime {
        end: best.point,
        ..first.regime
    };

    let last = interval.regimes.last_mut().context("interval has no regimes")?;
    last.regime = DrivingRegime {
        start: best.boundary,
        ..last.regime
    };

    let coasting = DrivingRegime::new(
        RegimeKind::Coasting,
        best.point,
        best.boundary,
        best.exit_speed,
        t0,
    );
    let insert_at = interval.regimes.len() - 1;
    interval.regimes.insert(
        insert_at,
        RegimeRun {
            regime: coasting,
            samples: Vec::new(),
        },
    );

    data.results = run_complete(&data.physics, &mut data.speed_intervals, data.step)?;
    Ok(())
}

/// Searches the cruising speed of one speed interval by golden section
/// over the valid speed range and splices the cruising phase in.
fn update_cruising_speed(data: &mut SheepmakerData, idx: usize, tolerance: Speed) -> Result<()> {
    let target_time = data.target_duration();
    let time_at_end = data.time_at_end()?;

    let interval = &data.speed_intervals[idx];
    let (low, high) = interval.cruising_speed_range(true);

    let mut cruise_speed = low;
    if low < high {
        let objective = |candidate: f64| {
            let candidate = Speed::from_m_s(candidate);
            let diff = interval
                .transit_time_difference_cruising(candidate)
                .unwrap_or(Time::ZERO);
            ((time_at_end + diff) - target_time).as_s().abs()
        };
        cruise_speed = Speed::from_m_s(golden_section_min(
            low.as_m_s(),
            high.as_m_s(),
            tolerance.as_m_s(),
            objective,
        ));
    }

    let Some((cruise_start, cruise_end)) = interval.cruising_interval(cruise_speed)? else {
        debug!("no cruising interval at {cruise_speed}; leaving regimes unchanged");
        return Ok(());
    };

    // a degenerate splice would leave an empty neighbor regime
    if cruise_start <= interval.start || cruise_end >= interval.end || cruise_start >= cruise_end {
        debug!("cruising interval [{cruise_start}, {cruise_end}] is degenerate; skipping");
        return Ok(());
    }

    let time_at_start = interval.time_at(cruise_start)?;
    let cruising = DrivingRegime::new(
        RegimeKind::Cruising,
        cruise_start,
        cruise_end,
        cruise_speed,
        time_at_start,
    );

    debug!(
        "cruising at {} over [{}, {}]",
        cruise_speed, cruise_start, cruise_end
    );

    // decide how the follower regimes absorb the cruising phase before
    // touching anything
    let count = interval.regimes.len();
    let has_coasting = interval.has_regime(RegimeKind::Coasting);
    let braking = interval.regimes[count - 1].regime;
    let shrink_coasting = has_coasting && count >= 2 && {
        let coasting = interval.regimes[count - 2].regime;
        coasting.start <= cruise_end && cruise_end < coasting.end
    };
    if !shrink_coasting && cruise_end >= braking.end {
        debug!("cruising phase would swallow the braking regime; skipping");
        return Ok(());
    }

    let interval = &mut data.speed_intervals[idx];

    let first = interval
        .regimes
        .first_mut()
        .context("interval has no regimes")?;
    first.regime = DrivingRegime {
        end: cruise_start,
        ..first.regime
    };

    if shrink_coasting {
        // cruising eats the head of the coasting phase
        let coasting = &mut interval.regimes[count - 2];
        coasting.regime = DrivingRegime {
            start: cruise_end,
            ..coasting.regime
        };
    } else {
        if has_coasting {
            interval.regimes.remove(count - 2);
        }
        let last = interval
            .regimes
            .last_mut()
            .context("interval has no regimes")?;
        last.regime = DrivingRegime {
            start: cruise_end,
            ..last.regime
        };
    }

    interval.regimes.insert(
        1,
        RegimeRun {
            regime: cruising,
            samples: Vec::new(),
        },
    );

    data.results = run_complete(&data.physics, &mut data.speed_intervals, data.step)?;
    Ok(())
}

/// The first sample of `profile` at or after `pos`.
fn sample_at(profile: &[RuntimeResult], pos: Length) -> Result<RuntimeResult> {
    let idx = profile.partition_point(|s| s.distance < pos);
    profile
        .get(idx)
        .copied()
        .context("position not covered by the profile")
}
