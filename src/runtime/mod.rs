//! Standalone train-runtime module
//!
//! This module contains the complete kinematics engine and the EETC
//! optimizer. It has no I/O surface of its own: the path description,
//! the train physics and the schedule come in as plain values, the
//! motion profiles and timestamped records go out the same way.

mod events;
mod intersect;
mod physics;
mod regime;
pub mod rk4;
mod search;
mod sheepmaker;
mod speed_profile;
mod types;
mod units;

pub use events::{emit_record_events, RecordEvent};
pub use intersect::{intersection_point, intersection_with_constant};
pub use physics::{
    step_time, step_time_reverse, travel_time_roots, ResistanceCurve, TractiveCurve,
    TractivePiece, TrainPhysics, GRAVITY,
};
pub use regime::{DrivingRegime, RegimeKind, RegimeRun};
pub use search::{golden_section_max, golden_section_min};
pub use sheepmaker::{
    initialize_section, optimize_section, sheepmaker, ScheduleEntry, SheepmakerData,
};
pub use speed_profile::{get_speed_intervals, run_complete, run_from, SpeedInterval};
pub use types::{
    slope_at, IntervalPoint, Record, RecordKind, RuntimeResult, DEFAULT_THRESHOLD,
    MIN_COASTING_STEP,
};
pub use units::{Acceleration, Force, Length, Mass, Slope, Speed, SpeedSquared, Time};
