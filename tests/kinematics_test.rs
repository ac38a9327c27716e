//! Driving-regime engine, intersection and search tests
//!
//! The sample values of the profile tests are the analytic solutions for a
//! frictionless test train (no running resistance, 62 km/h top speed).

use train_runtime::runtime::rk4;
use train_runtime::runtime::{
    golden_section_max, golden_section_min, intersection_point, intersection_with_constant,
    step_time, step_time_reverse, travel_time_roots, Acceleration, DrivingRegime, IntervalPoint,
    Length, Mass, RegimeKind, ResistanceCurve, RuntimeResult, Speed, Time, TractiveCurve,
    TractivePiece, TrainPhysics,
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

fn line(limit: Speed) -> Vec<IntervalPoint> {
    vec![IntervalPoint::new(Length::from_m(0.0), limit)]
}

fn sample(time: f64, distance: f64, speed: f64) -> RuntimeResult {
    RuntimeResult::new(
        Time::from_s(time),
        Length::from_m(distance),
        Speed::from_m_s(speed),
    )
}

fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn cruising_profile_holds_constant_speed() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(62.0));
    let regime = DrivingRegime::new(
        RegimeKind::Cruising,
        Length::from_m(0.0),
        Length::from_m(15.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    let profile = regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(3.0),
            Speed::from_m_s(1.0),
            Time::ZERO,
            Length::from_m(1.0),
            false,
        )
        .unwrap();

    let expected = [
        sample(0.0, 0.0, 1.0),
        sample(1.0, 1.0, 1.0),
        sample(2.0, 2.0, 1.0),
        sample(3.0, 3.0, 1.0),
    ];
    assert_eq!(profile, expected);
}

#[test]
fn accelerating_profile_first_samples() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(62.0));
    let regime = DrivingRegime::new(
        RegimeKind::Acceleration,
        Length::from_m(0.0),
        Length::from_m(15.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    let profile = regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(3.0),
            Speed::from_m_s(1.0),
            Time::ZERO,
            Length::from_m(1.0),
            false,
        )
        .unwrap();

    assert_eq!(profile.len(), 4);
    assert_eq!(profile[0], sample(0.0, 0.0, 1.0));
    assert_close(profile[1].time.as_s(), 0.890077, 1e-3);
    assert_eq!(profile[1].distance, Length::from_m(1.0));
    assert_close(profile[1].speed.as_m_s(), 1.247, 1e-3);
}

#[test]
fn accelerating_profile_respects_time_offset() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(62.0));
    let regime = DrivingRegime::new(
        RegimeKind::Acceleration,
        Length::from_m(0.0),
        Length::from_m(15.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    let profile = regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(3.0),
            Speed::from_m_s(1.0),
            Time::from_s(5.0),
            Length::from_m(1.0),
            false,
        )
        .unwrap();

    assert_close(profile[0].time.as_s(), 5.0, 1e-12);
    assert_close(profile[1].time.as_s(), 5.890077, 1e-3);
}

#[test]
fn braking_profile_is_solved_backward() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(62.07));
    let regime = DrivingRegime::new(
        RegimeKind::Braking,
        Length::from_m(0.0),
        Length::from_m(15.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    // exit speed zero at 3 m; entry speed comes out of the backward solve
    let profile = regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(3.0),
            Speed::from_m_s(0.0),
            Time::ZERO,
            Length::from_m(1.0),
            true,
        )
        .unwrap();

    let expected = [
        sample(0.0, 0.0, 3.0),
        sample(0.367_007, 1.0, 2.449_490),
        sample(0.845_299, 2.0, 1.732_051),
        sample(2.0, 3.0, 0.0),
    ];
    assert_eq!(profile.len(), expected.len());
    for (actual, expected) in profile.iter().zip(expected.iter()) {
        assert_close(actual.time.as_s(), expected.time.as_s(), 1e-5);
        assert_eq!(actual.distance, expected.distance);
        assert_close(actual.speed.as_m_s(), expected.speed.as_m_s(), 1e-5);
    }
}

#[test]
fn braking_profile_respects_time_offset() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(62.07));
    let regime = DrivingRegime::new(
        RegimeKind::Braking,
        Length::from_m(0.0),
        Length::from_m(15.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    let profile = regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(3.0),
            Speed::from_m_s(0.0),
            Time::from_s(5.0),
            Length::from_m(1.0),
            true,
        )
        .unwrap();

    assert_close(profile[0].time.as_s(), 5.0, 1e-12);
    assert_close(profile[1].time.as_s(), 5.367_007, 1e-5);
    assert_close(profile[3].time.as_s(), 7.0, 1e-5);
}

#[test]
fn profile_boundaries_are_exact_and_speed_is_clamped() {
    let train = frictionless_train();
    let allowed = train.max_speed();
    let points = line(Speed::from_m_s(62.0));
    let regime = DrivingRegime::new(
        RegimeKind::Acceleration,
        Length::from_m(0.0),
        Length::from_m(200.0),
        Speed::ZERO,
        Time::ZERO,
    );

    let profile = regime
        .run(&train, &points, Length::from_m(1.0))
        .unwrap();

    assert_eq!(profile.first().unwrap().distance, Length::from_m(0.0));
    assert_eq!(profile.last().unwrap().distance, Length::from_m(200.0));
    assert!(profile.iter().all(|s| s.speed <= allowed));
    // the limit plateau is actually reached
    assert_eq!(profile.last().unwrap().speed, allowed);
}

#[test]
fn simulation_is_idempotent() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(62.0));
    let regime = DrivingRegime::new(
        RegimeKind::Acceleration,
        Length::from_m(0.0),
        Length::from_m(50.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    let first = regime.run(&train, &points, Length::from_m(1.0)).unwrap();
    let second = regime.run(&train, &points, Length::from_m(1.0)).unwrap();
    assert_eq!(first, second);
}

#[test]
fn simulation_rejects_malformed_input() {
    let train = frictionless_train();
    let points = line(Speed::from_m_s(10.0));
    let regime = DrivingRegime::new(
        RegimeKind::Acceleration,
        Length::from_m(0.0),
        Length::from_m(10.0),
        Speed::from_m_s(1.0),
        Time::ZERO,
    );

    // start at or after end
    assert!(regime
        .simulate(
            &train,
            &points,
            Length::from_m(5.0),
            Length::from_m(5.0),
            Speed::from_m_s(1.0),
            Time::ZERO,
            Length::from_m(1.0),
            false,
        )
        .is_err());

    // non-positive step
    assert!(regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(10.0),
            Speed::from_m_s(1.0),
            Time::ZERO,
            Length::from_m(0.0),
            false,
        )
        .is_err());

    // entry speed above the allowed maximum
    assert!(regime
        .simulate(
            &train,
            &points,
            Length::from_m(0.0),
            Length::from_m(10.0),
            Speed::from_m_s(11.0),
            Time::ZERO,
            Length::from_m(1.0),
            false,
        )
        .is_err());

    // mixed speed limits over the simulated range
    let mixed = vec![
        IntervalPoint::new(Length::from_m(0.0), Speed::from_m_s(10.0)),
        IntervalPoint::new(Length::from_m(5.0), Speed::from_m_s(20.0)),
    ];
    assert!(regime
        .simulate(
            &train,
            &mixed,
            Length::from_m(0.0),
            Length::from_m(10.0),
            Speed::from_m_s(1.0),
            Time::ZERO,
            Length::from_m(1.0),
            false,
        )
        .is_err());
}

#[test]
fn step_time_with_zero_acceleration() {
    let (dt, v1) = step_time(
        Acceleration::ZERO,
        Speed::from_m_s(1.0),
        Length::from_m(0.0),
        Length::from_m(1.0),
    )
    .unwrap()
    .unwrap();
    assert_eq!(dt, Time::from_s(1.0));
    assert_eq!(v1, Speed::from_m_s(1.0));
}

#[test]
fn step_time_with_positive_acceleration() {
    let (dt, v1) = step_time(
        Acceleration::from_m_s2(1.0),
        Speed::from_m_s(1.0),
        Length::from_m(0.0),
        Length::from_m(1.0),
    )
    .unwrap()
    .unwrap();
    assert_close(dt.as_s(), 0.732, 1e-3);
    assert_close(v1.as_m_s(), 1.732, 1e-3);
}

#[test]
fn step_time_with_negative_acceleration() {
    let (dt, v1) = step_time(
        Acceleration::from_m_s2(-0.5),
        Speed::from_m_s(2.0),
        Length::from_m(0.0),
        Length::from_m(1.0),
    )
    .unwrap()
    .unwrap();
    assert_close(dt.as_s(), 0.536, 1e-3);
    assert_close(v1.as_m_s(), 1.732, 1e-3);
}

#[test]
fn step_time_without_real_root_is_none() {
    // decelerating at -1 m/s^2 from 1 m/s stops after 0.5 m
    let result = step_time(
        Acceleration::from_m_s2(-1.0),
        Speed::from_m_s(1.0),
        Length::from_m(0.0),
        Length::from_m(1.0),
    )
    .unwrap();
    assert!(result.is_none());
}

#[test]
fn step_time_reverse_recovers_entry_speed() {
    let (dt, v0) = step_time_reverse(
        Acceleration::from_m_s2(-1.0),
        Speed::ZERO,
        Length::from_m(0.0),
        Length::from_m(1.0),
    )
    .unwrap();
    assert_close(dt.as_s(), 1.414_213_6, 1e-6);
    assert_close(v0.as_m_s(), 1.414_213_6, 1e-6);
}

#[test]
fn travel_time_roots_cases() {
    let (t1, t2) = travel_time_roots(
        Acceleration::from_m_s2(1.0),
        Speed::ZERO,
        Length::from_m(0.0),
    );
    assert_eq!(t1.as_s(), 0.0);
    assert_eq!(t2.as_s(), 0.0);

    let (t1, t2) = travel_time_roots(
        Acceleration::from_m_s2(1.0),
        Speed::from_m_s(0.5),
        Length::from_m(0.0),
    );
    assert_eq!(t1.as_s(), 0.0);
    assert_eq!(t2.as_s(), -1.0);

    // no real root: both come out NaN
    let (t1, t2) = travel_time_roots(
        Acceleration::from_m_s2(1.0),
        Speed::ZERO,
        Length::from_m(-0.5),
    );
    assert!(!t1.is_valid());
    assert!(!t2.is_valid());
}

#[test]
fn intersection_none_for_parallel_profiles() {
    let a = vec![sample(0.0, 0.0, 1.0), sample(1.0, 1.0, 2.0), sample(2.0, 2.0, 3.0)];
    let b = vec![sample(0.0, 0.0, 0.0), sample(1.0, 1.0, 1.0), sample(2.0, 2.0, 2.0)];
    assert_eq!(intersection_point(&a, &b, false).unwrap(), None);
}

#[test]
fn intersection_at_equal_sample() {
    let a = vec![sample(0.0, 0.0, 1.0), sample(0.0, 1.0, 2.0), sample(0.0, 2.0, 3.0)];
    let b = vec![sample(0.0, 0.0, 2.0), sample(0.0, 1.0, 2.0), sample(0.0, 2.0, 2.0)];
    assert_eq!(
        intersection_point(&a, &b, false).unwrap(),
        Some(Length::from_m(1.0))
    );
}

#[test]
fn intersection_keeps_latest_crossing() {
    let a = vec![sample(0.0, 0.0, 1.0), sample(0.0, 1.0, 1.0), sample(0.0, 2.0, 1.0)];
    let b = vec![sample(0.0, 0.0, 3.0), sample(0.0, 1.0, 2.0), sample(0.0, 2.0, 1.0)];
    assert_eq!(
        intersection_point(&a, &b, false).unwrap(),
        Some(Length::from_m(2.0))
    );
}

#[test]
fn intersection_between_samples_reports_grid_point() {
    let a = vec![sample(0.0, 0.0, 1.0), sample(0.0, 1.0, 2.0), sample(0.0, 2.0, 3.0)];
    let b = vec![sample(0.0, 0.0, 1.5), sample(0.0, 1.0, 1.5), sample(0.0, 2.0, 1.5)];
    assert_eq!(
        intersection_point(&a, &b, false).unwrap(),
        Some(Length::from_m(0.0))
    );
}

#[test]
fn intersection_stops_at_invalid_samples() {
    let a = vec![
        sample(0.0, 0.0, 1.0),
        sample(0.5, 1.0, 3.0),
        RuntimeResult::new(Time::invalid(), Length::from_m(2.0), Speed::ZERO),
    ];
    let b = vec![sample(0.0, 0.0, 2.0), sample(0.5, 1.0, 2.0), sample(1.0, 2.0, 2.0)];
    // the crossing before the invalid tail still counts
    assert_eq!(
        intersection_point(&a, &b, false).unwrap(),
        Some(Length::from_m(0.0))
    );
}

#[test]
fn intersection_rejects_mismatched_profiles() {
    let a = vec![sample(0.0, 0.0, 1.0), sample(1.0, 1.0, 2.0)];
    let b = vec![sample(0.0, 0.0, 1.0), sample(1.0, 2.0, 2.0)];
    assert!(intersection_point(&a, &b, false).is_err());

    let short = vec![sample(0.0, 0.0, 1.0)];
    assert!(intersection_point(&a, &short, false).is_err());
}

#[test]
fn constant_intersection_on_flat_profile() {
    let a = vec![sample(0.0, 0.0, 1.0), sample(0.0, 1.0, 1.0), sample(0.0, 2.0, 1.0)];
    assert_eq!(
        intersection_with_constant(&a, Speed::from_m_s(1.0), true),
        Some(Length::from_m(0.0))
    );
    assert_eq!(
        intersection_with_constant(&a, Speed::from_m_s(1.0), false),
        Some(Length::from_m(2.0))
    );
}

#[test]
fn constant_intersection_misses() {
    let rising = vec![sample(0.0, 0.0, 2.0), sample(0.0, 1.0, 3.0), sample(0.0, 2.0, 4.0)];
    assert_eq!(
        intersection_with_constant(&rising, Speed::from_m_s(1.0), false),
        None
    );

    let falling = vec![sample(0.0, 0.0, 4.0), sample(0.0, 1.0, 3.0), sample(0.0, 2.0, 2.0)];
    assert_eq!(
        intersection_with_constant(&falling, Speed::from_m_s(5.0), false),
        None
    );
}

#[test]
fn constant_intersection_crossings() {
    let rising = vec![sample(0.0, 0.0, 0.0), sample(0.0, 1.0, 1.0), sample(0.0, 2.0, 2.0)];
    assert_eq!(
        intersection_with_constant(&rising, Speed::from_m_s(1.0), false),
        Some(Length::from_m(1.0))
    );

    let falling = vec![sample(0.0, 0.0, 4.0), sample(0.0, 1.0, 2.0), sample(0.0, 2.0, 0.0)];
    assert_eq!(
        intersection_with_constant(&falling, Speed::from_m_s(1.0), false),
        Some(Length::from_m(1.0))
    );
}

#[test]
fn golden_section_finds_parabola_minimum() {
    let min = golden_section_min(-10.0, 10.0, 0.01, |x| (x - 5.0) * (x - 5.0));
    assert_close(min, 5.0, 0.01);

    let min = golden_section_min(-10.0, 10.0, 0.01, |x| (x + 5.0) * (x + 5.0) - 5.0);
    assert_close(min, -5.0, 0.01);
}

#[test]
fn golden_section_finds_parabola_maximum() {
    let max = golden_section_max(-10.0, 10.0, 0.01, |x| -((x - 5.0) * (x - 5.0)));
    assert_close(max, 5.0, 0.01);
}

#[test]
fn rk4_closed_form_brake() {
    let result = rk4::brake(
        Speed::from_m_s(10.0),
        Speed::ZERO,
        Acceleration::from_m_s2(-1.0),
    )
    .unwrap();
    assert_close(result.time.as_s(), 10.0, 1e-9);
    assert_close(result.distance.as_m(), 50.0, 1e-9);
    assert_eq!(result.speed, Speed::ZERO);
}

#[test]
fn rk4_brake_over_distance() {
    let result = rk4::brake_over_distance(
        Speed::from_m_s(10.0),
        Acceleration::from_m_s2(-1.0),
        Length::from_m(50.0),
    )
    .unwrap();
    assert_close(result.speed.as_m_s(), 0.0, 1e-6);
    assert_close(result.time.as_s(), 10.0, 1e-6);

    // more distance than the stop needs: clamps to the full stop
    let clamped = rk4::brake_over_distance(
        Speed::from_m_s(10.0),
        Acceleration::from_m_s2(-1.0),
        Length::from_m(100.0),
    )
    .unwrap();
    assert_close(clamped.distance.as_m(), 50.0, 1e-9);
}

#[test]
fn rk4_speed_limit_braking_curve() {
    let limit = rk4::SpeedLimit::new(
        Length::from_m(100.0),
        Speed::from_m_s(10.0),
        Speed::ZERO,
        Acceleration::from_m_s2(-0.5),
    );

    assert!(limit.has_braking_curve());
    assert_close(limit.brake_point().unwrap().as_m(), 0.0, 1e-9);
    assert_close(limit.at(Length::from_m(50.0)).as_m_s(), 50.0_f64.sqrt(), 1e-9);
    assert_eq!(limit.at(Length::from_m(100.0)), Speed::ZERO);

    let flat = rk4::SpeedLimit::new(
        Length::from_m(100.0),
        Speed::from_m_s(10.0),
        Speed::from_m_s(10.0),
        Acceleration::from_m_s2(-0.5),
    );
    assert!(!flat.has_braking_curve());
    assert_eq!(flat.at(Length::from_m(30.0)), Speed::from_m_s(10.0));
}

#[test]
fn rk4_accelerate_stops_at_flat_limit() {
    let train = frictionless_train();
    let max = train.max_speed();

    let result = rk4::accelerate(
        Speed::ZERO,
        max,
        max,
        Length::from_m(500.0),
        Acceleration::from_m_s2(-1.5),
        train_runtime::runtime::Slope::FLAT,
        Length::from_m(500.0),
        &train,
    )
    .unwrap();

    assert!(result.distance > Length::from_m(0.0));
    assert!(result.distance < Length::from_m(500.0));
    assert_close(result.speed.as_m_s(), max.as_m_s(), 1e-6);
}

#[test]
fn rk4_accelerate_lands_on_braking_curve() {
    let train = frictionless_train();
    let max = train.max_speed();
    let length = Length::from_m(120.0);

    let result = rk4::accelerate(
        Speed::from_m_s(5.0),
        max,
        Speed::ZERO,
        length,
        Acceleration::from_m_s2(-1.5),
        train_runtime::runtime::Slope::FLAT,
        length,
        &train,
    )
    .unwrap();

    let limit = rk4::SpeedLimit::new(length, max, Speed::ZERO, Acceleration::from_m_s2(-1.5));
    assert!(limit.is_in_braking_curve(result.distance));
    assert_close(
        result.speed.as_m_s(),
        limit.at(result.distance).as_m_s(),
        1e-6,
    );
    assert!(result.time > Time::ZERO);
}
