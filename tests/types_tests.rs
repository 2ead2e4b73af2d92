use ariston_net::{ChMode, Change, DeviceState, Field, Limits, Mode};
use chrono::Utc;

fn state() -> DeviceState {
    DeviceState {
        mode: Mode::Winter,
        ch_mode: ChMode::Scheduled,
        ch_set_temperature: 21.0,
        dhw_set_temperature: 50.0,
        detected_temperature: 19.5,
        ch_antifreeze_temperature: 5.0,
        flame: true,
        holiday_mode: false,
        online: true,
        power: true,
        ch_set_temperature_limits: None,
        dhw_set_temperature_limits: None,
        last_updated: Utc::now(),
    }
}

#[test]
fn mode_wire_values() {
    assert_eq!(Mode::Summer.as_wire(), 0);
    assert_eq!(Mode::Winter.as_wire(), 1);
    assert_eq!(Mode::Off.as_wire(), 5);
    assert_eq!(Mode::from_wire(5), Some(Mode::Off));
    assert_eq!(Mode::from_wire(2), None);
}

#[test]
fn ch_mode_wire_values() {
    assert_eq!(ChMode::Manual.as_wire(), 2);
    assert_eq!(ChMode::Scheduled.as_wire(), 3);
    assert_eq!(ChMode::from_wire(3), Some(ChMode::Scheduled));
    assert_eq!(ChMode::from_wire(0), None);
}

#[test]
fn names_are_case_insensitive() {
    assert_eq!(Mode::from_name("Winter"), Some(Mode::Winter));
    assert_eq!(Mode::from_name("OFF"), Some(Mode::Off));
    assert_eq!(Mode::from_name("auto"), None);
    assert_eq!(ChMode::from_name("Scheduled"), Some(ChMode::Scheduled));
    assert_eq!(Mode::Summer.to_string(), "summer");
}

#[test]
fn mode_change_updates_power() {
    let off = state().with_change(&Change::Mode(Mode::Off));
    assert_eq!(off.mode, Mode::Off);
    assert!(!off.power);

    let on = off.with_change(&Change::Mode(Mode::Summer));
    assert!(on.power);
}

#[test]
fn with_change_touches_one_field() {
    let base = state();
    let next = base.with_change(&Change::DhwSetTemperature(55.0));
    assert_eq!(next.dhw_set_temperature, 55.0);
    assert_eq!(next.ch_set_temperature, base.ch_set_temperature);
    assert_eq!(next.mode, base.mode);
    assert!(next.matches(&Change::DhwSetTemperature(55.0)));
    assert!(!base.matches(&Change::DhwSetTemperature(55.0)));
}

#[test]
fn change_labels() {
    assert_eq!(Change::Mode(Mode::Winter).to_string(), "mode=winter");
    assert_eq!(Change::ChSetTemperature(21.5).to_string(), "ch_set_temperature=21.5");
    assert_eq!(Change::ChMode(ChMode::Manual).field(), Field::ChMode);
    assert_eq!(Field::DhwSetTemperature.to_string(), "dhw_set_temperature");
}

#[test]
fn limits_are_inclusive() {
    let l = Limits { min: 40.0, max: 65.0 };
    assert!(l.contains(40.0));
    assert!(l.contains(65.0));
    assert!(!l.contains(65.5));
    assert!(!l.contains(39.0));
}
