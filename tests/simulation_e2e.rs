use std::time::{Duration, Instant};

use lotsim::{
    parse_records, CarRecord, CarState, ClockKind, Simulation, SimulationConfig, SimulationReport,
};

fn car(gate: &str, id: u32, arrive: u64, hold: u64) -> CarRecord {
    CarRecord::new(gate, id, arrive, hold).unwrap()
}

fn simulation(capacity: usize, clock: ClockKind, deadline: Option<Duration>) -> Simulation {
    Simulation::new(SimulationConfig {
        capacity,
        clock,
        deadline,
    })
    .unwrap()
}

fn entries_for<'a>(report: &'a SimulationReport, car_id: u32) -> Vec<&'a str> {
    let prefix = format!("Car {car_id} from ");
    report
        .log
        .iter()
        .filter(|e| e.starts_with(&prefix))
        .map(String::as_str)
        .collect()
}

fn position(report: &SimulationReport, needle: &str) -> usize {
    report
        .log
        .iter()
        .position(|e| e == needle)
        .unwrap_or_else(|| panic!("missing log entry {needle:?} in {:?}", report.log))
}

#[test]
fn single_spot_two_cars_one_waits_for_the_other() {
    let report = simulation(1, ClockKind::Virtual, None)
        .run(vec![car("Gate 1", 1, 0, 3), car("Gate 2", 2, 0, 3)])
        .unwrap();

    assert_eq!(report.total_served(), 2);
    assert_eq!(report.log.iter().filter(|e| e.ends_with(" parked.")).count(), 1);
    assert_eq!(report.log.iter().filter(|e| e.ends_with("waiting for a spot.")).count(), 1);

    let first = report.outcomes.iter().find(|o| !o.waited).unwrap();
    let second = report.outcomes.iter().find(|o| o.waited).unwrap();
    let first_left = position(
        &report,
        &format!("Car {} from {} left after 3 units.", first.car_id, first.gate),
    );
    let second_parked = position(
        &report,
        &format!("Car {} from {} parked after waiting.", second.car_id, second.gate),
    );
    assert!(first_left < second_parked);
    assert_eq!(second.parked_at, first.departed_at);
}

#[test]
fn single_spot_contention_on_wall_clock() {
    let report = simulation(1, ClockKind::Wall { unit: Duration::from_millis(20) }, None)
        .run(vec![car("Gate 1", 1, 0, 10), car("Gate 1", 2, 0, 10)])
        .unwrap();

    assert_eq!(report.total_served(), 2);
    assert_eq!(report.waited(), 1);
    assert_eq!(report.peak_occupancy, 1);
}

#[test]
fn capacity_n_with_n_cars_never_waits() {
    const N: u32 = 6;
    let records: Vec<CarRecord> = (1..=N).map(|id| car("Gate 1", id, 0, 2)).collect();

    for clock in [ClockKind::Virtual, ClockKind::Wall { unit: Duration::from_millis(5) }] {
        let report = simulation(N as usize, clock, None).run(records.clone()).unwrap();
        assert_eq!(report.total_served(), u64::from(N));
        assert!(report.log.iter().all(|e| !e.contains("waiting")));
        assert_eq!(report.waited(), 0);
    }
}

#[test]
fn totals_match_gates_and_parked_cars_under_load() {
    let records: Vec<CarRecord> = (1..=40u32)
        .map(|id| {
            let gate = format!("Gate {}", id % 3 + 1);
            car(&gate, id, u64::from(id % 5), u64::from(id % 4 + 1))
        })
        .collect();

    let report = simulation(3, ClockKind::Virtual, None).run(records).unwrap();

    let parked = report.outcomes.iter().filter(|o| o.parked).count() as u64;
    assert_eq!(report.total_served(), 40);
    assert_eq!(report.total_served(), parked);
    assert!(report.metrics.is_consistent());
    assert!(report.peak_occupancy <= 3);
    assert!(report.outcomes.iter().all(|o| o.final_state == CarState::Departed));
    assert_eq!(report.log.len(), 40 * 3 + report.waited());

    for outcome in &report.outcomes {
        let entries = entries_for(&report, outcome.car_id);
        assert!(entries[0].contains("arrived at time"));
        assert!(entries.last().unwrap().contains("left after"));
        if outcome.waited {
            assert_eq!(entries.len(), 4);
            assert!(entries[1].ends_with("waiting for a spot."));
            assert!(entries[2].ends_with("parked after waiting."));
        } else {
            assert_eq!(entries.len(), 3);
            assert!(entries[1].ends_with("parked."));
        }
    }
}

#[test]
fn virtual_runs_are_repeatable() {
    let records = vec![
        car("Gate 1", 1, 0, 4),
        car("Gate 2", 2, 1, 2),
        car("Gate 3", 3, 7, 1),
        car("Gate 1", 4, 9, 1),
    ];
    let a = simulation(1, ClockKind::Virtual, None).run(records.clone()).unwrap();
    let b = simulation(1, ClockKind::Virtual, None).run(records).unwrap();

    assert_eq!(a.log, b.log);
    assert_eq!(a.outcomes, b.outcomes);
    assert_eq!(a.final_time, 10);
    assert_eq!(a.waited(), 1);
    assert_eq!(a.spots_in_use, 0);
}

#[test]
fn maximal_deadline_runs_to_completion() {
    let report = simulation(2, ClockKind::Virtual, Some(Duration::MAX))
        .run(vec![car("Gate 1", 1, 0, 2), car("Gate 2", 2, 1, 2), car("Gate 3", 3, 1, 1)])
        .unwrap();

    assert!(!report.timed_out);
    assert_eq!(report.total_served(), 3);
    assert_eq!(report.spots_in_use, 0);
}

#[test]
fn empty_input_is_not_an_error() {
    let report = simulation(4, ClockKind::Virtual, None).run(Vec::new()).unwrap();
    assert_eq!(report.total_served(), 0);
    assert!(report.metrics.per_gate.is_empty());
    assert!(report.log.is_empty());
}

#[test]
fn non_positive_capacity_is_a_configuration_error() {
    for capacity in [0, -1, -10] {
        let err = Simulation::run_with_capacity(vec![car("Gate 1", 1, 0, 0)], capacity).unwrap_err();
        assert!(err.is_configuration(), "capacity {capacity}: {err}");
    }
}

#[test]
fn deadline_cancels_waiting_and_parked_cars_and_frees_spots() {
    let sim = simulation(
        1,
        ClockKind::Wall { unit: Duration::from_secs(1) },
        Some(Duration::from_millis(200)),
    );

    let started = Instant::now();
    let report = sim
        .run(vec![car("Gate 1", 1, 0, 60), car("Gate 2", 2, 0, 60), car("Gate 3", 3, 60, 1)])
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));

    assert!(report.timed_out);
    assert_eq!(report.cancelled(), 3);
    assert_eq!(report.total_served(), 1);
    assert_eq!(report.waited(), 1);
    assert_eq!(report.spots_in_use, 0);
    assert!(report.outcomes.iter().all(|o| o.final_state == CarState::Departed));

    let late = report.outcomes.iter().find(|o| o.car_id == 3).unwrap();
    assert_eq!(late.arrived_at, None);
    assert!(entries_for(&report, 3).is_empty());

    // arrived + parked, arrived + waiting; nobody left.
    assert_eq!(report.log.len(), 4);
    assert!(report.log.iter().all(|e| !e.contains("left after")));
}

#[test]
fn malformed_lines_never_reach_the_lot() {
    let parsed = parse_records(
        "Gate 1, Car 1, Arrive 0, Parks 1\n\
         Gate 1, Car 77, Arrive 0\n\
         Gate 2, Car 2, Arrive 0, Parks 1\n",
    );
    assert_eq!(parsed.rejected.len(), 1);

    let report = simulation(2, ClockKind::Virtual, None).run(parsed.records).unwrap();
    assert_eq!(report.total_served(), 2);
    assert!(entries_for(&report, 77).is_empty());
}

#[test]
fn demo_input_runs_end_to_end() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demo/input/cars.txt");
    let parsed = lotsim::load_records(path).unwrap();
    assert_eq!(parsed.records.len(), 9);
    assert_eq!(parsed.rejected.len(), 1);

    let report = simulation(4, ClockKind::Wall { unit: Duration::from_millis(2) }, None)
        .run(parsed.records)
        .unwrap();
    assert_eq!(report.total_served(), 9);
    assert_eq!(report.metrics.served_from("Gate 1"), 3);
    assert_eq!(report.metrics.served_from("Gate 2"), 3);
    assert_eq!(report.metrics.served_from("Gate 3"), 3);
    assert!(report.peak_occupancy <= 4);
}
