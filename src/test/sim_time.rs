use crate::sim::SimTime;

#[test]
fn sim_time_unit_conversions() {
    assert_eq!(SimTime::from_micros(1), SimTime(1_000));
    assert_eq!(SimTime::from_millis(1), SimTime(1_000_000));
    assert_eq!(SimTime::from_millis(2).as_micros(), 2_000);
    assert_eq!(SimTime::ZERO.after(SimTime::from_micros(3)), SimTime(3_000));
}

#[test]
fn sim_time_saturates_on_overflow() {
    assert_eq!(SimTime::from_micros(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime::from_millis(u64::MAX), SimTime(u64::MAX));
    assert_eq!(SimTime(u64::MAX - 1).after(SimTime(10)), SimTime(u64::MAX));
}

#[test]
fn sim_time_displays_in_micros() {
    assert_eq!(SimTime::from_micros(4).to_string(), "4µs");
    assert_eq!(SimTime(1_250).to_string(), "1.250µs");
}
