//! End-to-end optimizer tests: initial tiling, coasting convergence and
//! record emission.

use train_runtime::runtime::{
    emit_record_events, sheepmaker, Acceleration, IntervalPoint, Length, Mass, Record,
    RecordKind, RegimeKind, ResistanceCurve, ScheduleEntry, SheepmakerData, Speed, Time,
    TractiveCurve, TractivePiece, TrainPhysics, DEFAULT_THRESHOLD,
};

fn frictionless_train() -> TrainPhysics {
    let tractive = TractiveCurve::new(vec![TractivePiece::new(
        1_000.0,
        10_000.0,
        100_000.0,
        Speed::from_m_s(0.0),
        Speed::from_m_s(300.0),
    )])
    .unwrap();

    TrainPhysics::new(
        "frictionless-test-train",
        Mass::from_kg(400_000.0),
        Speed::from_km_h(62.0),
        Acceleration::from_m_s2(-1.5),
        tractive,
        ResistanceCurve::frictionless(),
    )
    .unwrap()
}

fn halt(distance: f64, limit: f64) -> IntervalPoint {
    IntervalPoint::halt(Length::from_m(distance), Speed::from_m_s(limit))
}

fn point(distance: f64, limit: f64) -> IntervalPoint {
    IntervalPoint::new(Length::from_m(distance), Speed::from_m_s(limit))
}

/// An unreachable schedule; the optimizer falls toward the fastest run.
fn tight_schedule(halts: usize) -> Vec<ScheduleEntry> {
    vec![ScheduleEntry::halt(Time::ZERO, Time::ZERO); halts]
}

/// Asserts that the regimes of every interval tile it without gaps.
fn assert_tiling(section: &SheepmakerData) {
    for interval in &section.speed_intervals {
        let regimes = &interval.regimes;
        assert!(!regimes.is_empty());
        assert_eq!(regimes.first().unwrap().regime.start, interval.start);
        assert_eq!(regimes.last().unwrap().regime.end, interval.end);
        for pair in regimes.windows(2) {
            assert_eq!(pair[0].regime.end, pair[1].regime.start);
        }
        for run in regimes {
            assert!(run.regime.start < run.regime.end);
            assert_eq!(
                run.samples.first().unwrap().distance,
                run.regime.start
            );
            assert_eq!(run.samples.last().unwrap().distance, run.regime.end);
        }
    }
}

#[test]
fn initialization_tiles_a_single_interval() {
    let train = frictionless_train();
    let points = vec![halt(0.0, 14.0), halt(1000.0, 14.0)];

    let sections = sheepmaker(
        &train,
        &points,
        &tight_schedule(2),
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .unwrap();

    assert_eq!(sections.len(), 1);
    let section = &sections[0];
    assert_tiling(section);

    // the run starts and ends at standstill
    assert_eq!(section.results.first().unwrap().speed, Speed::ZERO);
    assert_eq!(section.results.last().unwrap().speed, Speed::ZERO);

    // no sample exceeds the limit
    let limit = Speed::from_m_s(14.0);
    assert!(section.results.iter().all(|s| s.speed <= limit));
}

#[test]
fn coasting_converges_to_the_scheduled_travel_time() {
    let train = frictionless_train();
    let points = vec![halt(0.0, 14.0), halt(1000.0, 14.0)];
    let step = Length::from_m(1.0);
    let threshold = 0.02;

    // measure the fastest achievable run first
    let fastest = sheepmaker(&train, &points, &tight_schedule(2), step, threshold)
        .unwrap()
        .remove(0)
        .travel_time();

    // then give the schedule 20% slack
    let target = fastest * 1.2;
    let schedule = vec![
        ScheduleEntry::halt(Time::ZERO, Time::ZERO),
        ScheduleEntry::halt(target, target),
    ];
    let sections = sheepmaker(&train, &points, &schedule, step, threshold).unwrap();
    let section = &sections[0];

    let deviation = (section.travel_time() - target).as_s().abs() / target.as_s();
    assert!(
        deviation <= threshold,
        "travel time {} missed target {} by {}",
        section.travel_time(),
        target,
        deviation
    );

    // accelerate, coast and brake exactly tile the interval
    assert_tiling(section);
    let kinds: Vec<RegimeKind> = section.speed_intervals[0]
        .regimes
        .iter()
        .map(|run| run.regime.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            RegimeKind::Acceleration,
            RegimeKind::Coasting,
            RegimeKind::Braking
        ]
    );

    // coasting bought the slack: slower than the fastest run, never above
    // the limit
    assert!(section.travel_time() > fastest);
    let limit = Speed::from_m_s(14.0);
    assert!(section.results.iter().all(|s| s.speed <= limit));
}

#[test]
fn limit_drop_gets_a_braking_regime_per_interval() {
    let train = frictionless_train();
    let points = vec![halt(0.0, 14.0), point(600.0, 10.0), halt(1200.0, 10.0)];

    let sections = sheepmaker(
        &train,
        &points,
        &tight_schedule(2),
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .unwrap();

    assert_eq!(sections.len(), 1);
    let section = &sections[0];
    assert_eq!(section.speed_intervals.len(), 2);
    assert_tiling(section);

    // both intervals end in braking: toward the lower limit, then the halt
    for interval in &section.speed_intervals {
        assert_eq!(
            interval.regimes.last().unwrap().regime.kind,
            RegimeKind::Braking
        );
    }

    // the train crosses the limit change at the lower limit
    let boundary = section.speed_intervals[0].end;
    let at_boundary = section.speed_intervals[0].speed_at(boundary).unwrap();
    assert!(at_boundary <= Speed::from_m_s(10.0));

    // per-interval speed caps hold
    for interval in &section.speed_intervals {
        for run in &interval.regimes {
            assert!(run.samples.iter().all(|s| s.speed <= interval.speed_limit));
        }
    }
}

#[test]
fn interior_halt_splits_the_path_into_sections() {
    let train = frictionless_train();
    let points = vec![halt(0.0, 14.0), halt(600.0, 14.0), halt(1200.0, 14.0)];
    let schedule = vec![
        ScheduleEntry::halt(Time::ZERO, Time::ZERO),
        ScheduleEntry::halt(Time::from_s(80.0), Time::from_s(110.0)),
        ScheduleEntry::halt(Time::from_s(190.0), Time::from_s(190.0)),
    ];

    let sections = sheepmaker(
        &train,
        &points,
        &schedule,
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .unwrap();

    assert_eq!(sections.len(), 2);
    for section in &sections {
        assert_tiling(section);
        // every section pulls away from a standstill and halts again
        assert_eq!(section.results.first().unwrap().speed, Speed::ZERO);
        assert_eq!(section.results.last().unwrap().speed, Speed::ZERO);
    }
    assert_eq!(sections[0].target_duration(), Time::from_s(80.0));
    assert_eq!(sections[1].target_duration(), Time::from_s(80.0));
}

#[test]
fn schedule_passes_are_skipped_when_slicing() {
    let train = frictionless_train();
    let points = vec![halt(0.0, 14.0), halt(1000.0, 14.0)];
    let schedule = vec![
        ScheduleEntry::halt(Time::ZERO, Time::ZERO),
        ScheduleEntry::pass(Time::from_s(40.0)),
        ScheduleEntry::halt(Time::from_s(95.0), Time::from_s(95.0)),
    ];

    let sections = sheepmaker(
        &train,
        &points,
        &schedule,
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .unwrap();

    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].target_duration(), Time::from_s(95.0));
}

#[test]
fn malformed_inputs_are_rejected() {
    let train = frictionless_train();

    // path without boundary halts
    assert!(sheepmaker(
        &train,
        &[point(0.0, 14.0), halt(1000.0, 14.0)],
        &tight_schedule(2),
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .is_err());

    // schedule without a closing halt
    let open_schedule = vec![
        ScheduleEntry::halt(Time::ZERO, Time::ZERO),
        ScheduleEntry::pass(Time::from_s(40.0)),
    ];
    assert!(sheepmaker(
        &train,
        &[halt(0.0, 14.0), halt(1000.0, 14.0)],
        &open_schedule,
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .is_err());

    // fewer schedule halts than path halts
    assert!(sheepmaker(
        &train,
        &[halt(0.0, 14.0), halt(500.0, 14.0), halt(1000.0, 14.0)],
        &tight_schedule(2),
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .is_err());
}

#[test]
fn record_events_come_out_in_path_order() {
    let train = frictionless_train();
    let points = vec![
        halt(0.0, 14.0),
        point(400.0, 14.0).with_record(Record::new(
            "signal-a",
            RecordKind::Signal,
            Length::from_m(400.0),
        )),
        halt(800.0, 14.0),
        halt(1600.0, 14.0),
    ];
    let schedule = vec![
        ScheduleEntry::halt(Time::ZERO, Time::ZERO),
        ScheduleEntry::halt(Time::from_s(100.0), Time::from_s(130.0)),
        ScheduleEntry::halt(Time::from_s(240.0), Time::from_s(240.0)),
    ];

    let sections = sheepmaker(
        &train,
        &points,
        &schedule,
        Length::from_m(1.0),
        DEFAULT_THRESHOLD,
    )
    .unwrap();
    assert_eq!(sections.len(), 2);

    let mut events = Vec::new();
    emit_record_events(&sections, |event| {
        events.push((
            event.record.name.clone(),
            event.record.distance,
            event.arrival,
            event.departure,
        ));
    })
    .unwrap();

    // one event per record: three halts plus the signal, shared halt
    // reported once
    assert_eq!(events.len(), 4);
    for pair in events.windows(2) {
        assert!(pair[0].1 <= pair[1].1);
        assert!(pair[0].2 <= pair[1].2);
    }

    // the signal departs the moment it arrives
    let signal = events.iter().find(|e| e.0 == "signal-a").unwrap();
    assert_eq!(signal.2, signal.3);

    // the intermediate halt departs per schedule
    let mid_halt = &events[2];
    assert_eq!(mid_halt.1, Length::from_m(800.0));
    assert_eq!(mid_halt.3, Time::from_s(130.0));
}
