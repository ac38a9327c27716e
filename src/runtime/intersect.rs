//! Intersection logic between simulated motion profiles
//!
//! Regime boundaries are fixed where two profiles cross in speed. The scan
//! keeps the *latest* crossing it finds: later crossings are only reachable
//! after earlier ones, so they maximize the coasting distance.

use anyhow::{ensure, Result};

use super::types::RuntimeResult;
use super::units::{Length, Speed, Time};

/// Finds where two profiles sharing the same sample positions cross in
/// speed.
///
/// Returns the distance of the latest crossing, `None` when the profiles
/// never cross. A crossing between two samples is reported at the earlier
/// sample's distance, so the result is always on the sampling grid. The
/// scan stops at invalid (NaN) sample times, which mark the unreachable
/// remainder of a profile. `ignore_border` skips the first sample pair.
pub fn intersection_point(
    a: &[RuntimeResult],
    b: &[RuntimeResult],
    ignore_border: bool,
) -> Result<Option<Length>> {
    ensure!(
        a.len() >= 2 && b.len() >= 2,
        "both profiles must have at least two samples"
    );
    ensure!(
        a.len() == b.len(),
        "both profiles must have the same number of samples"
    );
    ensure!(
        a[0].distance == b[0].distance && a[a.len() - 1].distance == b[b.len() - 1].distance,
        "both profiles must cover the same distance range"
    );

    let first = if ignore_border { 1 } else { 0 };
    let mut latest: Option<Length> = None;

    for i in first..a.len() - 1 {
        ensure!(
            a[i].distance == b[i].distance && a[i + 1].distance == b[i + 1].distance,
            "profiles must share their sample positions"
        );

        if !a[i].time.is_valid()
            || !b[i].time.is_valid()
            || !a[i + 1].time.is_valid()
            || !b[i + 1].time.is_valid()
        {
            break;
        }
        if a[i].time < Time::ZERO
            || b[i].time < Time::ZERO
            || a[i + 1].time < Time::ZERO
            || b[i + 1].time < Time::ZERO
        {
            break;
        }

        if a[i].speed == b[i].speed {
            latest = Some(a[i].distance);
            continue;
        }
        if a[i + 1].speed == b[i + 1].speed {
            latest = Some(a[i + 1].distance);
            continue;
        }

        let delta_here = a[i].speed - b[i].speed;
        let delta_next = a[i + 1].speed - b[i + 1].speed;
        if delta_here.is_negative() != delta_next.is_negative() {
            latest = Some(a[i].distance);
        }
    }

    Ok(latest)
}

/// Finds where a profile crosses a constant target speed.
///
/// With `search_first` the scan returns the earliest crossing, otherwise
/// the latest; for the latest-crossing search the final sample itself
/// counts when it sits exactly on the target.
pub fn intersection_with_constant(
    a: &[RuntimeResult],
    speed: Speed,
    search_first: bool,
) -> Option<Length> {
    let mut latest: Option<Length> = None;

    for i in 0..a.len().saturating_sub(1) {
        if a[i].speed == speed {
            latest = Some(a[i].distance);
            if search_first {
                return latest;
            }
            continue;
        }
        if a[i + 1].speed == speed {
            latest = Some(a[i + 1].distance);
            if search_first {
                return latest;
            }
            continue;
        }

        let delta_here = a[i].speed - speed;
        let delta_next = a[i + 1].speed - speed;
        if delta_here.is_negative() != delta_next.is_negative() {
            latest = Some(a[i].distance);
            if search_first {
                return latest;
            }
        }
    }

    if !search_first {
        if let Some(last) = a.last() {
            if last.speed == speed {
                return Some(last.distance);
            }
        }
    }

    latest
}
