//! Core value types shared across the runtime
//!
//! These are plain immutable data carriers; all behavior lives in the
//! engine modules.

use std::ops::{Add, AddAssign};

use super::units::{Length, Slope, Speed, Time};

/// Smallest probe step of the coasting-point search; below this the
/// optimizer gives up on coasting for the interval.
pub const MIN_COASTING_STEP: Length = Length::new(1.0);

/// Default relative travel-time change below which the coasting-point
/// search is considered converged.
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// One sample of a simulated motion profile.
///
/// A simulated regime yields a finite, ordered sequence of these; the first
/// and last samples lie exactly on the regime's distance boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuntimeResult {
    pub time: Time,
    pub distance: Length,
    pub speed: Speed,
}

impl RuntimeResult {
    pub fn new(time: Time, distance: Length, speed: Speed) -> Self {
        Self {
            time,
            distance,
            speed,
        }
    }
}

/// Component-wise sum, used to advance a state by an integration delta.
impl Add for RuntimeResult {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            time: self.time + rhs.time,
            distance: self.distance + rhs.distance,
            speed: self.speed + rhs.speed,
        }
    }
}

impl AddAssign for RuntimeResult {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// What kind of path element a record marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// A scheduled stopping point.
    Halt,
    /// A signal the train passes.
    Signal,
    /// A speed-limit change board.
    SpeedLimit,
    /// Any other element whose passing time is of interest.
    Marker,
}

/// A path element whose arrival/departure time must be reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub kind: RecordKind,
    pub distance: Length,
}

impl Record {
    pub fn new(name: impl Into<String>, kind: RecordKind, distance: Length) -> Self {
        Self {
            name: name.into(),
            kind,
            distance,
        }
    }
}

/// One boundary point of the path description.
///
/// Everything a point carries (limit, slope, brake-path length) holds from
/// this point's distance up to the next point's distance.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalPoint {
    pub distance: Length,
    pub speed_limit: Speed,
    pub slope: Slope,
    pub brake_path_length: Length,
    pub halt: bool,
    pub records: Vec<Record>,
}

impl IntervalPoint {
    pub fn new(distance: Length, speed_limit: Speed) -> Self {
        Self {
            distance,
            speed_limit,
            slope: Slope::FLAT,
            brake_path_length: Length::ZERO,
            halt: false,
            records: Vec::new(),
        }
    }

    /// A point that is a scheduled halt, carrying its own halt record.
    pub fn halt(distance: Length, speed_limit: Speed) -> Self {
        Self {
            halt: true,
            records: vec![Record::new("halt", RecordKind::Halt, distance)],
            ..Self::new(distance, speed_limit)
        }
    }

    pub fn with_slope(mut self, slope: Slope) -> Self {
        self.slope = slope;
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }
}

/// The slope in effect at `position`, i.e. the slope of the last point at
/// or before it.
pub fn slope_at(points: &[IntervalPoint], position: Length) -> Slope {
    points
        .iter()
        .take_while(|p| p.distance <= position)
        .last()
        .or_else(|| points.first())
        .map(|p| p.slope)
        .unwrap_or(Slope::FLAT)
}
