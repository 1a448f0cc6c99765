use std::sync::atomic::AtomicBool;
use std::time::Duration;
use usb_watchdog::{execute, status_report, Action, Exit, Invocation, MockDevice, Session};

fn run(mock: &MockDevice, invocation: &Invocation) -> Exit {
    let running = AtomicBool::new(true);
    execute(Session::open(mock), invocation, &running)
}

#[test]
fn mode_reports_beacon() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, true, 0));

    let exit = run(&mock, &Invocation::new(Action::Mode));

    assert_eq!(exit, Exit::BeaconMode);
    assert_eq!(exit.code(), 2);
}

#[test]
fn mode_reports_watchdog() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, false, 0));

    assert_eq!(run(&mock, &Invocation::new(Action::Mode)).code(), 0);
}

#[test]
fn oneshot_detects_reboot_without_petting() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, true, false, 0));
    let mut invocation = Invocation::new(Action::Oneshot);
    invocation.detect_reboot = true;

    assert_eq!(run(&mock, &invocation).code(), 2);
    assert!(mock.writes.borrow().is_empty());
}

#[test]
fn oneshot_pets_when_reboot_not_requested() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, true, false, 0));

    assert_eq!(run(&mock, &Invocation::new(Action::Oneshot)).code(), 0);
    assert_eq!(*mock.writes.borrow(), vec![vec![0x1, 0x3]]);
}

#[test]
fn oneshot_detects_trigger() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(true, true, false, 0));
    let mut invocation = Invocation::new(Action::Oneshot);
    invocation.detect_triggered = true;

    assert_eq!(run(&mock, &invocation).code(), 3);
    assert!(mock.writes.borrow().is_empty());
}

#[test]
fn oneshot_reboot_checked_before_trigger() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(true, true, false, 0));
    let mut invocation = Invocation::new(Action::Oneshot);
    invocation.detect_reboot = true;
    invocation.detect_triggered = true;

    assert_eq!(run(&mock, &invocation), Exit::Rebooted);
}

#[test]
fn oneshot_refused_in_beacon_mode() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, true, 0));

    assert_eq!(run(&mock, &Invocation::new(Action::Oneshot)), Exit::Failure);
    assert!(mock.writes.borrow().is_empty());
}

#[test]
fn oneshot_applies_settings_first() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, false, 0));
    let mut invocation = Invocation::new(Action::Oneshot);
    invocation.delta.nonvolatile_timeout = Some(120);

    assert_eq!(run(&mock, &invocation), Exit::Success);
    assert_eq!(*mock.feature_writes.borrow(), vec![vec![0x3, 120, 0]]);
    assert_eq!(mock.writes.borrow().len(), 1);
}

#[test]
fn status_timeout_is_a_failure() {
    let mock = MockDevice::new();

    assert_eq!(run(&mock, &Invocation::new(Action::Triggered)), Exit::Failure);
}

#[test]
fn beacon_refused_in_watchdog_mode() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, false, 0));

    let exit = run(&mock, &Invocation::new(Action::Beacon { on: true }));

    assert_eq!(exit.code(), 1);
    assert!(mock.writes.borrow().is_empty());
}

#[test]
fn beacon_switches_output() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, true, 0));

    assert_eq!(run(&mock, &Invocation::new(Action::Beacon { on: true })).code(), 0);
    assert_eq!(run(&mock, &Invocation::new(Action::Beacon { on: false })).code(), 0);
    assert_eq!(*mock.writes.borrow(), vec![vec![0x1, 0x3], vec![0x1, 0x2]]);
}

#[test]
fn rebooted_and_triggered_queries() {
    let mock = MockDevice::new();
    mock.set_idle_status(status_report(false, false, false, 0));
    assert_eq!(run(&mock, &Invocation::new(Action::Rebooted)).code(), 0);
    assert_eq!(run(&mock, &Invocation::new(Action::Triggered)).code(), 0);

    mock.set_idle_status(status_report(true, true, false, 0));
    assert_eq!(run(&mock, &Invocation::new(Action::Rebooted)).code(), 2);
    assert_eq!(run(&mock, &Invocation::new(Action::Triggered)).code(), 3);
    assert!(mock.writes.borrow().is_empty());
}

#[test]
fn continuous_stops_on_detected_reboot() {
    let mock = MockDevice::new();
    // each status read consumes two reports
    mock.push_status(status_report(false, false, false, 5));
    mock.push_status(status_report(false, false, false, 4));
    mock.push_status(status_report(false, false, false, 4));
    mock.push_status(status_report(false, false, false, 3));
    mock.set_idle_status(status_report(false, true, false, 0));
    let mut invocation = Invocation::new(Action::Continuous {
        pet_interval: Duration::from_millis(1),
    });
    invocation.detect_reboot = true;

    assert_eq!(run(&mock, &invocation), Exit::Rebooted);
    assert_eq!(mock.writes.borrow().len(), 2);
    assert_eq!(mock.reads.get(), 6);
}
