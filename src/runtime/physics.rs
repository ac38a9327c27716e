//! Train physics and closed-form kinematic step solvers
//!
//! The tractive effort curve is piecewise quadratic in speed, the running
//! resistance is a Davis-form quadratic plus a grade term. Both are
//! externally supplied and immutable; the runtime only ever evaluates them.

use anyhow::{ensure, Result};

use super::units::{Acceleration, Force, Length, Mass, Slope, Speed, Time};

/// Standard gravity in m/s^2.
pub const GRAVITY: f64 = 9.81;

/// One piece of the tractive-force curve: `force = a*v^2 + b*v + c` for
/// speeds in `[from, to)`. Coefficients are raw SI (N·s²/m², N·s/m, N).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TractivePiece {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub from: Speed,
    pub to: Speed,
}

impl TractivePiece {
    pub fn new(a: f64, b: f64, c: f64, from: Speed, to: Speed) -> Self {
        Self { a, b, c, from, to }
    }

    fn force_at(&self, v: Speed) -> Force {
        let v = v.as_m_s();
        Force::from_n(self.a * v * v + self.b * v + self.c)
    }
}

/// Piecewise quadratic tractive-force curve.
#[derive(Debug, Clone, PartialEq)]
pub struct TractiveCurve {
    pieces: Vec<TractivePiece>,
}

impl TractiveCurve {
    pub fn new(pieces: Vec<TractivePiece>) -> Result<Self> {
        ensure!(
            !pieces.is_empty(),
            "tractive curve needs at least one piece"
        );
        for pair in pieces.windows(2) {
            ensure!(
                pair[0].to == pair[1].from,
                "tractive curve pieces must be contiguous"
            );
        }
        Ok(Self { pieces })
    }

    /// Tractive force at speed `v`; zero outside the curve's speed range.
    pub fn force_at(&self, v: Speed) -> Force {
        let last = self.pieces.len() - 1;
        for (idx, piece) in self.pieces.iter().enumerate() {
            let upper_ok = if idx == last {
                v <= piece.to
            } else {
                v < piece.to
            };
            if v >= piece.from && upper_ok {
                return piece.force_at(v);
            }
        }
        Force::ZERO
    }
}

/// Davis-form running resistance `drag*v^2 + dampening*v + rolling`, raw SI
/// coefficients (N·s²/m², N·s/m, N).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResistanceCurve {
    pub drag: f64,
    pub dampening: f64,
    pub rolling: f64,
}

impl ResistanceCurve {
    pub fn new(drag: f64, dampening: f64, rolling: f64) -> Self {
        Self {
            drag,
            dampening,
            rolling,
        }
    }

    /// A resistance curve that is identically zero.
    pub fn frictionless() -> Self {
        Self::default()
    }

    fn force_at(&self, v: Speed) -> Force {
        let v = v.as_m_s();
        Force::from_n(self.drag * v * v + self.dampening * v + self.rolling)
    }
}

/// Immutable physical description of one train.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainPhysics {
    name: String,
    mass: Mass,
    /// Rotating-mass surcharge on the translatory mass; 1.0 when not modeled.
    mass_factor: f64,
    max_speed: Speed,
    deceleration: Acceleration,
    tractive: TractiveCurve,
    resistance: ResistanceCurve,
}

impl TrainPhysics {
    pub fn new(
        name: impl Into<String>,
        mass: Mass,
        max_speed: Speed,
        deceleration: Acceleration,
        tractive: TractiveCurve,
        resistance: ResistanceCurve,
    ) -> Result<Self> {
        ensure!(mass > Mass::ZERO, "train mass must be positive");
        ensure!(max_speed > Speed::ZERO, "train max speed must be positive");
        ensure!(
            deceleration < Acceleration::ZERO,
            "braking deceleration must be negative"
        );
        Ok(Self {
            name: name.into(),
            mass,
            mass_factor: 1.0,
            max_speed,
            deceleration,
            tractive,
            resistance,
        })
    }

    pub fn with_mass_factor(mut self, factor: f64) -> Self {
        self.mass_factor = factor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mass(&self) -> Mass {
        self.mass
    }

    /// Translatory mass plus the rotating-mass surcharge.
    pub fn effective_mass(&self) -> Mass {
        self.mass * self.mass_factor
    }

    pub fn max_speed(&self) -> Speed {
        self.max_speed
    }

    /// The speed the train may actually run under `limit`.
    pub fn allowed_speed(&self, limit: Speed) -> Speed {
        limit.min(self.max_speed)
    }

    /// Constant braking deceleration, always negative.
    pub fn deceleration(&self) -> Acceleration {
        self.deceleration
    }

    pub fn tractive_force(&self, v: Speed) -> Force {
        self.tractive.force_at(v)
    }

    /// Running resistance plus grade resistance on `slope`.
    pub fn resistive_force(&self, v: Speed, slope: Slope) -> Force {
        let grade = Force::from_n(self.mass.raw() * GRAVITY * slope.sin());
        self.resistance.force_at(v) + grade
    }

    /// Net acceleration under full traction.
    pub fn acceleration(&self, v: Speed, slope: Slope) -> Acceleration {
        (self.tractive_force(v) - self.resistive_force(v, slope)) / self.effective_mass()
    }

    /// Net acceleration with traction cut, i.e. resistance only.
    pub fn natural_acceleration(&self, v: Speed, slope: Slope) -> Acceleration {
        -self.resistive_force(v, slope) / self.effective_mass()
    }
}

/// Both roots of `0 = 0.5*acc*t^2 + vel*t - distance`, the time to cover
/// `distance` from speed `vel` under constant `acc`, via the reduced
/// quadratic. A complex root pair comes out as NaN.
pub fn travel_time_roots(acc: Acceleration, vel: Speed, distance: Length) -> (Time, Time) {
    let p_half = vel.raw() / acc.raw();
    let q = -2.0 * distance.raw() / acc.raw();
    let root = (p_half * p_half - q).sqrt();
    (Time::new(-p_half + root), Time::new(-p_half - root))
}

/// Time and exit speed for one forward step from `start` to `end` under
/// constant `acc`, entering at `vel0`.
///
/// `None` when the step cannot be covered: the quadratic has no real root
/// (the train stops short) or no non-negative one.
pub fn step_time(
    acc: Acceleration,
    vel0: Speed,
    start: Length,
    end: Length,
) -> Result<Option<(Time, Speed)>> {
    ensure!(vel0 >= Speed::ZERO, "entry speed must not be negative");
    ensure!(start >= Length::ZERO, "step start must not be negative");
    ensure!(start < end, "step start must lie before step end");

    if acc == Acceleration::ZERO {
        if vel0 == Speed::ZERO {
            return Ok(None);
        }
        return Ok(Some(((end - start) / vel0, vel0)));
    }

    let (t1, t2) = travel_time_roots(acc, vel0, end - start);
    let dt = [t1, t2]
        .into_iter()
        .filter(|t| *t >= Time::ZERO)
        .reduce(Time::min);

    Ok(dt.map(|dt| (dt, acc * dt + vel0)))
}

/// Time and entry speed for one backward step: the train leaves `end` at
/// `vel1` after decelerating over `[start, end]` with constant negative
/// `acc`; solves for the unknown speed at `start`.
pub fn step_time_reverse(
    acc: Acceleration,
    vel1: Speed,
    start: Length,
    end: Length,
) -> Result<(Time, Speed)> {
    ensure!(
        acc < Acceleration::ZERO,
        "backward stepping needs a negative acceleration"
    );
    ensure!(vel1 >= Speed::ZERO, "exit speed must not be negative");
    ensure!(start >= Length::ZERO, "step start must not be negative");
    ensure!(start < end, "step start must lie before step end");

    // Mirror the deceleration into a forward acceleration from vel1: the
    // covered distance and elapsed time are the same in both directions.
    let (t1, t2) = travel_time_roots(-acc, vel1, end - start);
    let dt = [t1, t2]
        .into_iter()
        .filter(|t| *t >= Time::ZERO)
        .reduce(Time::min);

    let dt = match dt {
        Some(dt) if dt.is_valid() => dt,
        _ => anyhow::bail!("no real solution for backward step"),
    };

    Ok((dt, vel1 - acc * dt))
}
