//! Runge-Kutta integrator with braking-curve intersection
//!
//! The closed-form engine in `regime` advances by position steps; this
//! integrator advances by a fixed time step and is used where fidelity
//! against a braking curve matters. The exact crossing of the simulated
//! speed curve with the limit function is located by fitting a degree-4
//! polynomial through five sampling points and running a few Newton
//! iterations on it.

use anyhow::{bail, ensure, Result};

use super::physics::TrainPhysics;
use super::types::RuntimeResult;
use super::units::{Acceleration, Length, Slope, Speed, Time};

/// Fixed integration time step.
pub const DELTA_T: Time = Time::new(0.5);

/// Polynomial degree of the crossing interpolation; five sampling points.
const POLY_DEGREE: usize = 4;

/// Iteration cap of the Newton crossing search.
const MAX_NEWTON_ITERATIONS: usize = 5;

/// Residual speed below which the crossing search stops, in m/s.
const EPSILON_SPEED: f64 = 1e-6;

/// One RK4 step of dv/dt = acceleration(v, slope) over step size `h`.
/// Returns the state *delta*, not the advanced state.
pub fn rk4_step(speed: Speed, h: Time, slope: Slope, tp: &TrainPhysics) -> RuntimeResult {
    let acceleration = |v: Speed| {
        if v > tp.max_speed() {
            Acceleration::ZERO
        } else {
            tp.acceleration(v, slope)
        }
    };

    let k1_speed = acceleration(speed);

    let k2_input = speed + (h / 2.0) * k1_speed;
    let k2_speed = acceleration(k2_input);

    let k3_input = speed + (h / 2.0) * k2_speed;
    let k3_speed = acceleration(k3_input);

    let k4_input = speed + h * k3_speed;
    let k4_speed = acceleration(k4_input);

    let k1_dist = speed;
    let k2_dist = k2_input;
    let k3_dist = k3_input;
    let k4_dist = k4_input;

    RuntimeResult {
        time: h,
        distance: (h / 6.0) * (k1_dist + 2.0 * k2_dist + 2.0 * k3_dist + k4_dist),
        speed: (h / 6.0) * (k1_speed + 2.0 * k2_speed + 2.0 * k3_speed + k4_speed),
    }
}

/// Closed-form braking from `initial` down to `target` speed under constant
/// `deceleration`. Returns elapsed time, covered distance and the target
/// speed.
pub fn brake(initial: Speed, target: Speed, deceleration: Acceleration) -> Result<RuntimeResult> {
    ensure!(
        deceleration < Acceleration::ZERO,
        "braking needs a negative deceleration, got {deceleration}"
    );
    ensure!(
        initial > target,
        "braking target speed must lie below the initial speed"
    );

    let time = -(initial - target) / deceleration;
    Ok(RuntimeResult {
        time,
        distance: 0.5 * (deceleration * time) * time + initial * time,
        speed: target,
    })
}

/// Closed-form braking over a fixed `distance`; clamps to a full stop when
/// the distance outlasts the braking capability.
pub fn brake_over_distance(
    initial: Speed,
    deceleration: Acceleration,
    distance: Length,
) -> Result<RuntimeResult> {
    ensure!(
        deceleration < Acceleration::ZERO,
        "braking needs a negative deceleration, got {deceleration}"
    );
    ensure!(distance > Length::ZERO, "braking distance must be positive");

    let v_inner = initial.squared() + 2.0 * (deceleration * distance);
    if v_inner.raw() < 0.0 {
        return brake(initial, Speed::ZERO, deceleration);
    }

    let speed = v_inner.sqrt();
    Ok(RuntimeResult {
        time: (initial - speed) / -deceleration,
        distance,
        speed,
    })
}

/// The speed limit over one simulated range: a flat maximum that bends into
/// a braking curve toward `target_speed` at the range's end, dimensioned by
/// the train's constant `deceleration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedLimit {
    pub length: Length,
    pub max_speed: Speed,
    pub target_speed: Speed,
    pub deceleration: Acceleration,
}

impl SpeedLimit {
    pub fn new(
        length: Length,
        max_speed: Speed,
        target_speed: Speed,
        deceleration: Acceleration,
    ) -> Self {
        Self {
            length,
            max_speed,
            target_speed,
            deceleration,
        }
    }

    /// Whether the range ends in a speed drop at all.
    pub fn has_braking_curve(&self) -> bool {
        self.max_speed > self.target_speed
    }

    /// The distance at which braking toward `target_speed` must begin.
    pub fn brake_point(&self) -> Result<Length> {
        let braked = brake(self.max_speed, self.target_speed, self.deceleration)?;
        Ok(self.length - braked.distance)
    }

    pub fn is_in_braking_curve(&self, dist: Length) -> bool {
        if !self.has_braking_curve() {
            return false;
        }
        if dist == self.length {
            return true;
        }
        match self.brake_point() {
            Ok(point) => dist >= point,
            Err(_) => false,
        }
    }

    /// The allowed speed at `dist`.
    pub fn at(&self, dist: Length) -> Speed {
        if dist == self.length {
            return self.target_speed.min(self.max_speed);
        }
        if !self.is_in_braking_curve(dist) {
            return self.max_speed;
        }

        let v_inner = self.target_speed.squared() - 2.0 * (self.deceleration * (self.length - dist));
        debug_assert!(v_inner.raw() >= 0.0);
        v_inner.sqrt()
    }

    /// d(limit)/dt at `dist`, raw 1/s; zero before the braking curve.
    fn derivative_at(&self, dist: Length) -> f64 {
        if !self.is_in_braking_curve(dist) {
            0.0
        } else {
            self.deceleration.raw() / self.at(dist).raw()
        }
    }
}

/// Five sampling points regenerated from the last two RK4 states by
/// sub-stepping the same integrator on a finer, uniform time grid.
struct SamplingPoints {
    time: [f64; POLY_DEGREE + 1],
    dist: [f64; POLY_DEGREE + 1],
    speed: [f64; POLY_DEGREE + 1],
}

impl SamplingPoints {
    fn new(init: RuntimeResult, current: RuntimeResult, slope: Slope, tp: &TrainPhysics) -> Self {
        let mut time = [init.time.raw(); POLY_DEGREE + 1];
        let mut dist = [init.distance.raw(); POLY_DEGREE + 1];
        let mut speed = [init.speed.raw(); POLY_DEGREE + 1];

        let delta = (current.time - init.time).raw() / POLY_DEGREE as f64;
        for (i, t) in time.iter_mut().enumerate() {
            *t = init.time.raw() + delta * i as f64;
        }

        dist[POLY_DEGREE] = current.distance.raw();
        speed[POLY_DEGREE] = current.speed.raw();

        for i in 1..POLY_DEGREE {
            speed[i] = speed[i - 1];
            dist[i] = dist[i - 1];

            let h = Time::new(time[i] - time[i - 1]);
            let step = rk4_step(Speed::from_m_s(speed[i]), h, slope, tp);
            speed[i] += step.speed.raw();
            dist[i] += step.distance.raw();
        }

        Self { time, dist, speed }
    }
}

/// Newton divided-difference interpolation polynomial through the sampling
/// points, parameterized by distance.
struct NewtonInterpolator {
    coefficients: [f64; POLY_DEGREE + 1],
    xs: [f64; POLY_DEGREE + 1],
}

impl NewtonInterpolator {
    fn new(values: [f64; POLY_DEGREE + 1], xs: [f64; POLY_DEGREE + 1]) -> Self {
        let mut coefficients = values;
        for i in 0..=POLY_DEGREE {
            for k in ((i + 1)..=POLY_DEGREE).rev() {
                coefficients[k] =
                    (coefficients[k] - coefficients[k - 1]) / (xs[k] - xs[k - i - 1]);
            }
        }
        Self { coefficients, xs }
    }

    fn interpolate(&self, dist: f64) -> f64 {
        let mut result = self.coefficients[POLY_DEGREE];
        for i in (0..POLY_DEGREE).rev() {
            result = result * (dist - self.xs[i]) + self.coefficients[i];
        }
        result
    }

    fn value_and_derivative(&self, dist: f64) -> (f64, f64) {
        let mut result = self.coefficients[POLY_DEGREE];
        let mut derivative = self.coefficients[POLY_DEGREE];

        for i in (1..POLY_DEGREE).rev() {
            result = result * (dist - self.xs[i]) + self.coefficients[i];
            derivative = derivative * (dist - self.xs[i - 1]) + result;
        }
        result = result * (dist - self.xs[0]) + self.coefficients[0];

        (result, derivative)
    }
}

/// Newton iteration locating where the interpolated speed curve meets the
/// limit function; stays within the iteration cap and stops early on a
/// small residual or a flat difference.
fn interpolate_intersection(
    start: f64,
    speed: &NewtonInterpolator,
    max_speed: impl Fn(f64) -> (f64, f64),
    epsilon: f64,
) -> f64 {
    let mut x = start;
    for _ in 0..MAX_NEWTON_ITERATIONS {
        let (v, v_prime) = speed.value_and_derivative(x);
        let (m, m_prime) = max_speed(x);

        let residual = v - m;
        if residual.abs() <= epsilon {
            break;
        }
        let denominator = v_prime - m_prime;
        if denominator == 0.0 {
            break;
        }
        x -= residual / denominator;
    }
    x
}

/// Linear interpolation of the crossing between the speed curve and the
/// limit function over the last two RK4 states; the Newton start value.
fn linear_crossing(initial: RuntimeResult, current: RuntimeResult, limit: &SpeedLimit) -> Length {
    let span = (current.distance - initial.distance).raw();
    let alpha = (current.speed - initial.speed).raw() / span;
    let beta = (limit.at(current.distance) - limit.at(initial.distance)).raw() / span;

    let offset = (initial.speed - limit.at(initial.distance)).raw() / (beta - alpha);
    Length::new(initial.distance.raw() + offset)
}

fn linear_time(initial: RuntimeResult, current: RuntimeResult, dist: Length) -> Time {
    initial.time
        + (current.time - initial.time) * ((dist - initial.distance) / (current.distance - initial.distance))
}

/// Locates the exact crossing of the simulated curve with the limit
/// function between the last two RK4 states.
fn crossing_with_limit(
    second_to_last: RuntimeResult,
    last: RuntimeResult,
    slope: Slope,
    limit: &SpeedLimit,
    tp: &TrainPhysics,
) -> Result<RuntimeResult> {
    ensure!(
        second_to_last.distance < last.distance && second_to_last.time < last.time,
        "crossing search needs two ordered states"
    );

    let sps = SamplingPoints::new(second_to_last, last, slope, tp);
    let speed_poly = NewtonInterpolator::new(sps.speed, sps.dist);
    let time_poly = NewtonInterpolator::new(sps.time, sps.dist);

    let start = linear_crossing(second_to_last, last, limit);

    let max_speed = |dist: f64| {
        let dist = Length::new(dist);
        (limit.at(dist).raw(), limit.derivative_at(dist))
    };

    let distance = Length::new(interpolate_intersection(
        start.raw(),
        &speed_poly,
        max_speed,
        EPSILON_SPEED,
    ));
    let mut result = RuntimeResult {
        time: Time::new(time_poly.interpolate(distance.raw())),
        distance,
        speed: Speed::from_m_s(speed_poly.interpolate(distance.raw())),
    };

    if result.distance < second_to_last.distance || result.distance > last.distance {
        // Newton left the bracketing range; fall back to the linear guess.
        result.distance = start;
    }
    if result.time < second_to_last.time || result.time > last.time {
        result.time = linear_time(second_to_last, last, result.distance);
    }

    debug_assert!(second_to_last.time <= result.time && result.time <= last.time);
    debug_assert!(second_to_last.distance <= result.distance && result.distance <= last.distance);

    Ok(result)
}

/// Evaluates the interpolation polynomials at a fixed distance bound.
fn state_at_max_dist(
    length: Length,
    second_to_last: RuntimeResult,
    last: RuntimeResult,
    slope: Slope,
    tp: &TrainPhysics,
) -> RuntimeResult {
    let sps = SamplingPoints::new(second_to_last, last, slope, tp);
    let speed_poly = NewtonInterpolator::new(sps.speed, sps.dist);
    let time_poly = NewtonInterpolator::new(sps.time, sps.dist);

    let mut result = RuntimeResult {
        time: Time::new(time_poly.interpolate(length.raw())),
        distance: length,
        speed: Speed::from_m_s(speed_poly.interpolate(length.raw())),
    };

    if result.time < second_to_last.time || result.time > last.time {
        result.time = linear_time(second_to_last, last, result.distance);
    }
    result
}

/// RK4 forward integration from `init` until `stop_at` or until the limit
/// function is hit, whichever comes first; the boundary state is resolved
/// by interpolation.
fn accelerate_until(
    init: RuntimeResult,
    stop_at: Length,
    limit: &SpeedLimit,
    slope: Slope,
    tp: &TrainPhysics,
) -> Result<RuntimeResult> {
    let mut last = init;
    let mut second_to_last;

    loop {
        second_to_last = last;
        last += rk4_step(last.speed, DELTA_T, slope, tp);

        if !(last.distance < stop_at
            && last.speed > Speed::ZERO
            && last.speed < limit.at(last.distance))
        {
            break;
        }
    }

    let quit_due_to_dist = last.distance >= stop_at;
    let quit_due_to_speed = !quit_due_to_dist && last.speed > limit.at(last.distance);
    ensure!(
        quit_due_to_dist || quit_due_to_speed,
        "train stopped before reaching the distance bound"
    );

    let mut result = RuntimeResult::default();
    if quit_due_to_dist {
        result = state_at_max_dist(stop_at, second_to_last, last, slope, tp);
    }

    let redo_result = result.speed > limit.at(stop_at);
    if quit_due_to_speed || redo_result {
        result = crossing_with_limit(second_to_last, last, slope, limit, tp)?;
        if quit_due_to_dist {
            result.distance = stop_at;
        }
        result.speed = limit.at(result.distance);
    }

    debug_assert!(result.distance <= stop_at);
    debug_assert!(result.speed <= limit.at(result.distance));

    Ok(result)
}

/// RK4 acceleration over a range of `max_dist` whose limit drops to
/// `target_speed` at its end; stops at `stop_at`.
///
/// The crossing with the braking curve (where one exists) is resolved
/// exactly, so the result respects both the flat limit and the curve.
pub fn accelerate(
    initial_speed: Speed,
    max_speed: Speed,
    target_speed: Speed,
    max_dist: Length,
    deceleration: Acceleration,
    slope: Slope,
    stop_at: Length,
    tp: &TrainPhysics,
) -> Result<RuntimeResult> {
    ensure!(
        deceleration < Acceleration::ZERO,
        "braking needs a negative deceleration"
    );
    ensure!(max_dist > Length::ZERO, "range length must be positive");
    ensure!(stop_at > Length::ZERO, "distance bound must be positive");
    ensure!(
        initial_speed < max_speed,
        "cannot accelerate at or above the maximum speed"
    );

    let limit = SpeedLimit::new(max_dist, max_speed, target_speed, deceleration);

    let init = RuntimeResult {
        time: Time::ZERO,
        distance: Length::ZERO,
        speed: initial_speed,
    };

    let result = if !limit.has_braking_curve() {
        accelerate_until(init, stop_at, &limit, slope, tp)?
    } else {
        let braking_point = limit.brake_point()?;
        if stop_at < braking_point {
            // stops before the curve begins; the flat limit alone rules
            accelerate_until(init, stop_at, &limit, slope, tp)?
        } else {
            let mut state = init;
            if !braking_point.is_zero() {
                state = accelerate_until(state, braking_point, &limit, slope, tp)?;
            }
            if state.distance == braking_point && state.speed < limit.at(braking_point) {
                state = accelerate_until(state, stop_at, &limit, slope, tp)?;
            }
            state
        }
    };

    if result.speed > max_speed {
        bail!("integration exceeded the maximum speed");
    }

    Ok(result)
}
