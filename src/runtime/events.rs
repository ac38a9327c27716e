//! Timestamped record emission
//!
//! After a section is finalized, every record carried by its path points
//! gets an arrival/departure timestamp from the simulated profile and is
//! handed to an injected callback, in strictly increasing distance order.

use anyhow::{Context, Result};

use super::sheepmaker::SheepmakerData;
use super::types::Record;
use super::units::Time;

/// One timestamped record of the driven path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordEvent<'a> {
    pub record: &'a Record,
    pub arrival: Time,
    pub departure: Time,
}

/// Walks the records of the finalized sections in path order and invokes
/// `on_event` for each.
///
/// Timestamps are absolute: the section's scheduled departure plus the
/// simulated travel time to the record. A final halt departs per schedule,
/// every other record departs when it arrives. The halt shared by two
/// consecutive sections is reported once, with the earlier section.
pub fn emit_record_events<'a>(
    sections: &'a [SheepmakerData],
    mut on_event: impl FnMut(RecordEvent<'a>),
) -> Result<()> {
    let mut previous_distance = None;

    for (section_idx, section) in sections.iter().enumerate() {
        let base = section.start.departure;
        let last_point = section.points.len() - 1;

        for (point_idx, point) in section.points.iter().enumerate() {
            // the shared boundary halt was already reported by the
            // previous section
            if section_idx > 0 && point_idx == 0 {
                continue;
            }

            for record in &point.records {
                let idx = section
                    .results
                    .partition_point(|s| s.distance < record.distance);
                let sample = section
                    .results
                    .get(idx)
                    .or_else(|| section.results.last())
                    .context("section has no simulated profile")?;

                let arrival = base + sample.time;
                let departure = if point.halt && point_idx == last_point {
                    section.end.departure
                } else {
                    arrival
                };

                debug_assert!(previous_distance.map_or(true, |d| d <= record.distance));
                previous_distance = Some(record.distance);

                on_event(RecordEvent {
                    record,
                    arrival,
                    departure,
                });
            }
        }
    }

    Ok(())
}
