use anyhow::Result;
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use train_runtime::runtime::{
    emit_record_events, sheepmaker, Acceleration, IntervalPoint, Length, Mass, Record,
    RecordKind, ResistanceCurve, ScheduleEntry, SheepmakerData, Slope, Speed, Time,
    TractiveCurve, TractivePiece, TrainPhysics,
};

#[derive(Parser)]
#[command(name = "train_runtime")]
#[command(about = "Train kinematics and energy-efficient driving-plan demo")]
struct Cli {
    /// Position step of the simulation grid in meters
    #[arg(long, default_value = "1.0")]
    step: f64,

    /// Number of speed-limit segments per generated line
    #[arg(long, default_value = "4")]
    segments: usize,

    /// RNG seed for the generated line profile
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Relative travel-time tolerance of the optimizer
    #[arg(long, default_value = "0.01")]
    threshold: f64,

    /// Schedule slack on top of the fastest run, as a factor
    #[arg(long, default_value = "1.15")]
    slack: f64,

    /// Dwell time at intermediate halts in seconds
    #[arg(long, default_value = "45.0")]
    dwell: f64,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let step = Length::from_m(cli.step);
    let train = demo_train()?;
    let points = generate_line(cli.segments, cli.seed, &train);

    println!("Generated line:");
    for point in &points {
        println!(
            "  {:>8.0} m  limit {:>5.1} km/h  slope {:>6.2} per mille{}",
            point.distance.as_m(),
            point.speed_limit.as_km_h(),
            point.slope.as_radians().tan() * 1000.0,
            if point.halt { "  [halt]" } else { "" }
        );
    }
    println!();

    // First pass against an unreachable schedule measures the fastest run
    // each section can manage.
    let tight = vec![ScheduleEntry::halt(Time::ZERO, Time::ZERO); count_halts(&points)];
    let fastest = sheepmaker(&train, &points, &tight, step, cli.threshold)?;

    println!("Fastest achievable run:");
    print_sections(&fastest);

    // Second pass against a slackened schedule lets the optimizer trade
    // the slack for coasting.
    let relaxed_schedule = relax_schedule(&fastest, cli.slack, Time::from_s(cli.dwell));
    let relaxed = sheepmaker(&train, &points, &relaxed_schedule, step, cli.threshold)?;

    println!();
    println!("Energy-efficient run ({}x slack):", cli.slack);
    print_sections(&relaxed);

    println!();
    println!("Timestamped records:");
    emit_record_events(&relaxed, |event| {
        println!(
            "  {:>8.0} m  {:<12} arr {:>8.1} s  dep {:>8.1} s",
            event.record.distance.as_m(),
            event.record.name,
            event.arrival.as_s(),
            event.departure.as_s()
        );
    })?;

    Ok(())
}

/// A 400 t demo train with a two-piece tractive curve and Davis running
/// resistance.
fn demo_train() -> Result<TrainPhysics> {
    let tractive = TractiveCurve::new(vec![
        TractivePiece::new(0.0, 0.0, 300_000.0, Speed::from_m_s(0.0), Speed::from_m_s(10.0)),
        TractivePiece::new(
            0.0,
            -4_000.0,
            340_000.0,
            Speed::from_m_s(10.0),
            Speed::from_m_s(45.0),
        ),
    ])?;
    let resistance = ResistanceCurve::new(12.0, 60.0, 2_600.0);

    Ok(TrainPhysics::new(
        "demo-train",
        Mass::from_t(400.0),
        Speed::from_km_h(140.0),
        Acceleration::from_m_s2(-0.6),
        tractive,
        resistance,
    )?
    .with_mass_factor(1.06))
}

/// Generates a reproducible random line: a halt at each end, one halt in
/// the middle, and random limits/slopes in between. Segment lengths leave
/// enough room to brake from each limit to the next.
fn generate_line(segments: usize, seed: u64, train: &TrainPhysics) -> Vec<IntervalPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let limits_km_h = [60.0, 80.0, 100.0, 120.0, 140.0];
    let deceleration = train.deceleration().as_m_s2().abs();

    let segments = segments.max(2);
    let limits: Vec<Speed> = (0..segments)
        .map(|_| Speed::from_km_h(limits_km_h[rng.random_range(0..limits_km_h.len())]))
        .collect();

    let mut points = Vec::new();
    let mut distance = 0.0;
    let halt_after = segments / 2;

    for (idx, limit) in limits.iter().enumerate() {
        let exit_speed = if idx + 1 == segments || idx + 1 == halt_after {
            Speed::ZERO
        } else {
            limits[idx + 1]
        };
        let braking_need = (limit.as_m_s().powi(2) - exit_speed.as_m_s().powi(2)).max(0.0)
            / (2.0 * deceleration);
        let length = (rng.random_range(8..=25) as f64 * 100.0).max(braking_need + 400.0);

        let point = if idx == 0 || idx == halt_after {
            IntervalPoint::halt(Length::from_m(distance), *limit)
        } else {
            // gentle uphills only: a descent can outweigh the running
            // resistance and turn coasting into a forward regime
            IntervalPoint::new(Length::from_m(distance), *limit)
                .with_slope(Slope::from_per_mille(rng.random_range(0.0..4.0)))
                .with_record(Record::new(
                    format!("board-{idx}"),
                    RecordKind::SpeedLimit,
                    Length::from_m(distance),
                ))
        };
        points.push(point);
        distance += (length / 100.0).round() * 100.0;
    }

    points.push(IntervalPoint::halt(
        Length::from_m(distance),
        limits[segments - 1],
    ));
    points
}

fn count_halts(points: &[IntervalPoint]) -> usize {
    points.iter().filter(|p| p.halt).count()
}

/// Builds a schedule giving each section its fastest travel time times
/// `slack`, with `dwell` at every intermediate halt.
fn relax_schedule(fastest: &[SheepmakerData], slack: f64, dwell: Time) -> Vec<ScheduleEntry> {
    let mut schedule = vec![ScheduleEntry::halt(Time::ZERO, Time::ZERO)];
    let mut clock = Time::ZERO;

    for (idx, section) in fastest.iter().enumerate() {
        let arrival = clock + section.travel_time() * slack;
        let departure = if idx + 1 == fastest.len() {
            arrival
        } else {
            arrival + dwell
        };
        schedule.push(ScheduleEntry::halt(arrival, departure));
        clock = departure;
    }

    schedule
}

fn print_sections(sections: &[SheepmakerData]) {
    for (idx, section) in sections.iter().enumerate() {
        println!(
            "  section {}: [{:.0} m, {:.0} m]  target {:.1} s  simulated {:.1} s",
            idx,
            section.points[0].distance.as_m(),
            section.points[section.points.len() - 1].distance.as_m(),
            section.target_duration().as_s(),
            section.travel_time().as_s()
        );
        for interval in &section.speed_intervals {
            for run in &interval.regimes {
                info!(
                    "    {:?} [{:.0} m, {:.0} m] {:.1} s",
                    run.regime.kind,
                    run.regime.start.as_m(),
                    run.regime.end.as_m(),
                    run.transit_time().as_s()
                );
            }
        }
    }
}
