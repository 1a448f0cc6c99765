use crate::session::Session;
use crate::status::{Mode, StatusSample};
use crate::{Error, HidTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const DEFAULT_STATUS_TIMEOUT_MS: u16 = 2000;

//longest uninterrupted sleep between pets, so a stop request is noticed quickly
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// What one invocation asks the device to do.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Action {
    /// Apply settings and report them.
    Configure,
    /// Configure, then pet once.
    Oneshot,
    /// Configure, then pet every `pet_interval` until stopped or a detection fires.
    Continuous { pet_interval: Duration },
    Rebooted,
    Triggered,
    Mode,
    /// Switch the alarm output of a device in beacon mode.
    Beacon { on: bool },
}

/// Setting changes requested by one invocation, `None` leaves a setting untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigurationDelta {
    pub nonvolatile_timeout: Option<u16>,
    pub volatile_timeout: Option<u16>,
    pub nonvolatile_pinglight: Option<bool>,
    pub volatile_pinglight: Option<bool>,
    pub nonvolatile_buzzer: Option<bool>,
    pub volatile_buzzer: Option<bool>,
    pub nonvolatile_buzzer_frequency: Option<u16>,
    pub volatile_buzzer_frequency: Option<u16>,
    pub nonvolatile_beacon_mode: Option<bool>,
    pub clear_reboot_indicator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub action: Action,
    pub delta: ConfigurationDelta,
    /// Refuse to pet and exit 2 once the device reports a reboot.
    pub detect_reboot: bool,
    /// Refuse to pet and exit 3 once the device reports it triggered.
    pub detect_triggered: bool,
    pub status_timeout_ms: u16,
}

impl Invocation {
    pub fn new(action: Action) -> Self {
        Invocation {
            action,
            delta: ConfigurationDelta::default(),
            detect_reboot: false,
            detect_triggered: false,
            status_timeout_ms: DEFAULT_STATUS_TIMEOUT_MS,
        }
    }
}

/// How an invocation ended.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exit {
    Success,
    Failure,
    Interrupted,
    Rebooted,
    BeaconMode,
    Triggered,
}

impl Exit {
    /// Process exit status.
    pub fn code(self) -> i32 {
        match self {
            Exit::Success => 0,
            Exit::Failure | Exit::Interrupted => 1,
            Exit::Rebooted | Exit::BeaconMode => 2,
            Exit::Triggered => 3,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Phase {
    Opened,
    Configuring,
    Reporting,
    Petting,
    Done,
}

/// Drives one [`Invocation`] against an open session.
pub struct Runner<'a, T: HidTransport> {
    session: &'a Session<T>,
    invocation: &'a Invocation,
    running: &'a AtomicBool,
    phase: Phase,
}

impl<'a, T: HidTransport> Runner<'a, T> {
    pub fn new(session: &'a Session<T>, invocation: &'a Invocation, running: &'a AtomicBool) -> Self {
        Runner {
            session,
            invocation,
            running,
            phase: Phase::Opened,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// An interrupt seen at any phase boundary ends the run with
    /// [`Exit::Interrupted`], whatever the action got as far as.
    pub fn run(&mut self) -> Exit {
        let result = self.check_running().and_then(|_| match self.invocation.action {
            Action::Configure => self.configure_and_report(),
            Action::Oneshot => self.oneshot(),
            Action::Continuous { pet_interval } => self.continuous(pet_interval),
            Action::Rebooted => self.rebooted(),
            Action::Triggered => self.triggered(),
            Action::Mode => self.mode(),
            Action::Beacon { on } => self.beacon(on),
        });
        self.enter(Phase::Done);

        match result.and_then(|_| self.check_running()) {
            Ok(()) => Exit::Success,
            Err(exit) => exit,
        }
    }

    fn configure_and_report(&mut self) -> Result<(), Exit> {
        self.enter(Phase::Configuring);
        self.configure().map_err(|e| {
            eprintln!("Error configuring USB Watchdog: {}", e);
            Exit::Failure
        })?;

        self.enter(Phase::Reporting);
        self.report_settings().map_err(|e| {
            eprintln!("Error obtaining USB Watchdog settings: {}", e);
            Exit::Failure
        })
    }

    fn configure(&self) -> Result<(), Error> {
        let s = self.session;
        let delta = &self.invocation.delta;

        if let Some(seconds) = delta.nonvolatile_timeout {
            log::info!("Setting nonvolatile timeout to {} seconds", seconds);
            s.set_nonvolatile_timeout(seconds.into())?;
        }
        if let Some(seconds) = delta.volatile_timeout {
            log::info!("Setting volatile timeout to {} seconds", seconds);
            s.set_volatile_timeout(seconds.into())?;
        }
        if let Some(on) = delta.nonvolatile_pinglight {
            log::info!("Setting nonvolatile ping light to {}", on_off(on));
            s.set_nonvolatile_pinglight(on)?;
        }
        if let Some(on) = delta.volatile_pinglight {
            log::info!("Setting volatile ping light to {}", on_off(on));
            s.set_volatile_pinglight(on)?;
        }
        if let Some(on) = delta.nonvolatile_buzzer {
            log::info!("Setting nonvolatile buzzer to {}", on_off(on));
            s.set_nonvolatile_buzzer(on)?;
        }
        if let Some(on) = delta.volatile_buzzer {
            log::info!("Setting volatile buzzer to {}", on_off(on));
            s.set_volatile_buzzer(on)?;
        }
        if let Some(frequency) = delta.nonvolatile_buzzer_frequency {
            log::info!("Setting nonvolatile buzzer frequency to {}", frequency);
            s.set_nonvolatile_buzzer_frequency(frequency)?;
        }
        if let Some(frequency) = delta.volatile_buzzer_frequency {
            log::info!("Setting volatile buzzer frequency to {}", frequency);
            s.set_volatile_buzzer_frequency(frequency)?;
        }
        if let Some(on) = delta.nonvolatile_beacon_mode {
            log::info!("Setting nonvolatile beacon mode to {}", on_off(on));
            s.set_nonvolatile_beacon_mode(on)?;
        }
        if delta.clear_reboot_indicator {
            log::info!("Clearing reboot indicator");
            s.set_reboot_indicator()?;
        }
        Ok(())
    }

    fn report_settings(&self) -> Result<(), Error> {
        let s = self.session;
        let (major, minor) = s.get_version()?;

        log::info!("~Configuration info~");
        log::info!("Firmware version: {}.{}", major, minor);
        log::info!("Serial number: {}", s.get_serial_number()?);
        log::info!("Nonvolatile timeout: {} seconds", s.get_nonvolatile_timeout()?);
        log::info!("Volatile timeout: {} seconds", s.get_volatile_timeout()?);
        log::info!("Nonvolatile ping light: {}", on_off(s.get_nonvolatile_pinglight()?));
        log::info!("Nonvolatile buzzer: {}", on_off(s.get_nonvolatile_buzzer()?));
        log::info!("Volatile ping light: {}", on_off(s.get_volatile_pinglight()?));
        log::info!("Volatile buzzer: {}", on_off(s.get_volatile_buzzer()?));
        log::info!(
            "Nonvolatile buzzer frequency: {}",
            s.get_nonvolatile_buzzer_frequency()?
        );
        log::info!("Volatile buzzer frequency: {}", s.get_volatile_buzzer_frequency()?);
        if s.beacon_capable() {
            log::info!("Beacon mode: {}", on_off(s.get_nonvolatile_beacon_mode()?));
        }
        log::info!("Reboot indicator: {}", s.get_reboot_indicator()?);
        log::info!("~~~~~~~~~~~~~~~~~~~~");
        Ok(())
    }

    fn status(&self) -> Result<StatusSample, Exit> {
        self.session
            .read_status(self.invocation.status_timeout_ms.into())
            .map_err(|e| {
                eprintln!("Error obtaining USB Watchdog status: {}", e);
                Exit::Failure
            })
            .and_then(|status| {
                //the read blocks, so a stop request may have come in meanwhile
                self.check_running()?;
                Ok(status)
            })
    }

    // older firmware has no beacon mode, whatever the status bit says
    fn mode_of(&self, status: &StatusSample) -> Mode {
        if self.session.beacon_capable() {
            status.mode()
        } else {
            Mode::Watchdog
        }
    }

    fn pet_once(&mut self) -> Result<(), Exit> {
        self.enter(Phase::Reporting);
        let status = self.status()?;

        if self.mode_of(&status) == Mode::Beacon {
            eprintln!("USB Watchdog is in beacon mode!");
            return Err(Exit::Failure);
        }
        if status.reboot_occurred && self.invocation.detect_reboot {
            println!("USB Watchdog reboot identified!");
            return Err(Exit::Rebooted);
        }
        if status.triggered && self.invocation.detect_triggered {
            println!("USB Watchdog is triggered!");
            return Err(Exit::Triggered);
        }

        self.check_running()?;
        self.enter(Phase::Petting);
        log::info!("Petting");
        self.session.pet(true).map_err(|e| {
            eprintln!("Error petting USB Watchdog: {}", e);
            Exit::Failure
        })
    }

    fn oneshot(&mut self) -> Result<(), Exit> {
        self.configure_and_report()?;
        self.check_running()?;
        self.pet_once()
    }

    fn continuous(&mut self, pet_interval: Duration) -> Result<(), Exit> {
        self.configure_and_report()?;
        log::info!("Pet interval: {} seconds", pet_interval.as_secs());

        loop {
            self.check_running()?;
            self.pet_once()?;
            self.sleep(pet_interval)?;
        }
    }

    fn check_running(&self) -> Result<(), Exit> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            log::info!("Interrupted");
            Err(Exit::Interrupted)
        }
    }

    fn sleep(&self, duration: Duration) -> Result<(), Exit> {
        let start = Instant::now();
        loop {
            self.check_running()?;
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return Ok(());
            }
            std::thread::sleep((duration - elapsed).min(SLEEP_SLICE));
        }
    }

    fn rebooted(&mut self) -> Result<(), Exit> {
        self.enter(Phase::Reporting);
        if self.status()?.reboot_occurred {
            println!("USB Watchdog reboot identified!");
            return Err(Exit::Rebooted);
        }
        Ok(())
    }

    fn triggered(&mut self) -> Result<(), Exit> {
        self.enter(Phase::Reporting);
        if self.status()?.triggered {
            println!("USB Watchdog triggered identified!");
            return Err(Exit::Triggered);
        }
        Ok(())
    }

    fn mode(&mut self) -> Result<(), Exit> {
        self.enter(Phase::Reporting);
        let status = self.status()?;
        match self.mode_of(&status) {
            Mode::Beacon => {
                println!("USB Watchdog is in beacon mode");
                Err(Exit::BeaconMode)
            }
            Mode::Watchdog => {
                println!("USB Watchdog is in watchdog mode");
                Ok(())
            }
        }
    }

    fn beacon(&mut self, on: bool) -> Result<(), Exit> {
        self.enter(Phase::Reporting);
        let status = self.status()?;
        if self.mode_of(&status) != Mode::Beacon {
            eprintln!("USB Watchdog is in watchdog mode!");
            return Err(Exit::Failure);
        }

        self.check_running()?;
        self.enter(Phase::Petting);
        log::info!("Setting beacon to {}", on_off(on));
        self.session.set_beacon_state(on).map_err(|e| {
            eprintln!("Error setting USB Watchdog beacon: {}", e);
            Exit::Failure
        })
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Runs `invocation` and closes the session whatever the outcome.
pub fn execute<T: HidTransport>(
    mut session: Session<T>,
    invocation: &Invocation,
    running: &AtomicBool,
) -> Exit {
    let exit = Runner::new(&session, invocation, running).run();

    match session.close() {
        Ok(()) => exit,
        Err(e) => {
            eprintln!("Error closing USB Watchdog: {}", e);
            Exit::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{status_report, MockDevice};
    use crate::registry::Setting;

    #[test]
    fn exit_codes() {
        assert_eq!(Exit::Success.code(), 0);
        assert_eq!(Exit::Failure.code(), 1);
        assert_eq!(Exit::Interrupted.code(), 1);
        assert_eq!(Exit::Rebooted.code(), 2);
        assert_eq!(Exit::BeaconMode.code(), 2);
        assert_eq!(Exit::Triggered.code(), 3);
    }

    #[test]
    fn configure_applies_only_present_fields() {
        let mock = MockDevice::new();
        let session = Session::open(&mock);
        let mut invocation = Invocation::new(Action::Configure);
        invocation.delta.volatile_timeout = Some(30);
        invocation.delta.volatile_buzzer = Some(false);
        let running = AtomicBool::new(true);

        let mut runner = Runner::new(&session, &invocation, &running);
        assert_eq!(runner.run(), Exit::Success);
        assert_eq!(runner.phase(), Phase::Done);

        assert_eq!(
            *mock.feature_writes.borrow(),
            vec![vec![0x4, 30, 0], vec![0x6, 0x1]]
        );
        assert_eq!(mock.feature(Setting::NonvolatileTimeout), Some(vec![60, 0]));
    }

    #[test]
    fn configure_rejects_bad_frequency() {
        let mock = MockDevice::new();
        let session = Session::open(&mock);
        let mut invocation = Invocation::new(Action::Configure);
        invocation.delta.volatile_buzzer_frequency = Some(300);
        let running = AtomicBool::new(true);

        assert_eq!(Runner::new(&session, &invocation, &running).run(), Exit::Failure);
        assert!(mock.feature_writes.borrow().is_empty());
    }

    #[test]
    fn configure_beacon_mode_on_old_firmware() {
        let mock = MockDevice::without_beacon_mode();
        let session = Session::open(&mock);
        let mut invocation = Invocation::new(Action::Configure);
        invocation.delta.nonvolatile_beacon_mode = Some(true);
        let running = AtomicBool::new(true);

        assert_eq!(Runner::new(&session, &invocation, &running).run(), Exit::Failure);
    }

    #[test]
    fn clear_reboot_indicator() {
        let mock = MockDevice::new();
        let session = Session::open(&mock);
        let mut invocation = Invocation::new(Action::Configure);
        invocation.delta.clear_reboot_indicator = true;
        let running = AtomicBool::new(true);

        assert_eq!(Runner::new(&session, &invocation, &running).run(), Exit::Success);
        assert_eq!(*mock.feature_writes.borrow(), vec![vec![0x9, 0x1]]);
    }

    #[test]
    fn old_firmware_ignores_beacon_bit() {
        let mock = MockDevice::without_beacon_mode();
        mock.set_idle_status(status_report(false, false, true, 0));
        let session = Session::open(&mock);
        let running = AtomicBool::new(true);

        let invocation = Invocation::new(Action::Mode);
        assert_eq!(Runner::new(&session, &invocation, &running).run(), Exit::Success);

        let invocation = Invocation::new(Action::Oneshot);
        assert_eq!(Runner::new(&session, &invocation, &running).run(), Exit::Success);
        assert_eq!(mock.writes.borrow().len(), 1);
    }

    #[test]
    fn stopped_before_loop() {
        let mock = MockDevice::new();
        mock.set_idle_status(status_report(false, false, false, 0));
        let session = Session::open(&mock);
        let invocation = Invocation::new(Action::Continuous {
            pet_interval: Duration::from_secs(1),
        });
        let running = AtomicBool::new(false);

        assert_eq!(
            Runner::new(&session, &invocation, &running).run(),
            Exit::Interrupted
        );
        assert!(mock.writes.borrow().is_empty());
    }

    #[test]
    fn execute_releases_device() {
        let detected = MockDevice::new();
        detected.set_idle_status(status_report(false, true, false, 0));
        let invocation = Invocation::new(Action::Rebooted);
        let running = AtomicBool::new(true);
        assert_eq!(
            execute(Session::open(detected.handle()), &invocation, &running),
            Exit::Rebooted
        );
        assert!(detected.released.get());

        let healthy = MockDevice::new();
        healthy.set_idle_status(status_report(false, false, false, 0));
        let invocation = Invocation::new(Action::Oneshot);
        assert_eq!(
            execute(Session::open(healthy.handle()), &invocation, &running),
            Exit::Success
        );
        assert!(healthy.released.get());

        // no input reports at all, so the status read times out
        let silent = MockDevice::new();
        let invocation = Invocation::new(Action::Mode);
        assert_eq!(
            execute(Session::open(silent.handle()), &invocation, &running),
            Exit::Failure
        );
        assert!(silent.released.get());

        let interrupted = MockDevice::new();
        interrupted.set_idle_status(status_report(false, false, false, 0));
        let invocation = Invocation::new(Action::Configure);
        let stopped = AtomicBool::new(false);
        assert_eq!(
            execute(Session::open(interrupted.handle()), &invocation, &stopped),
            Exit::Interrupted
        );
        assert!(interrupted.released.get());
    }

    #[test]
    fn session_holds_device_until_closed() {
        let mock = MockDevice::new();
        let mut session = Session::open(mock.handle());
        assert!(!mock.released.get());

        session.close().unwrap();
        assert!(mock.released.get());
    }

    #[test]
    fn interrupted_oneshot_does_not_pet() {
        let mock = MockDevice::new();
        mock.set_idle_status(status_report(false, false, false, 0));
        let invocation = Invocation::new(Action::Oneshot);
        let running = AtomicBool::new(false);

        assert_eq!(
            execute(Session::open(&mock), &invocation, &running),
            Exit::Interrupted
        );
        assert_eq!(Exit::Interrupted.code(), 1);
        assert!(mock.writes.borrow().is_empty());
    }

    #[test]
    fn interrupted_beacon_does_not_write() {
        let mock = MockDevice::new();
        mock.set_idle_status(status_report(false, false, true, 0));
        let invocation = Invocation::new(Action::Beacon { on: true });
        let running = AtomicBool::new(false);

        assert_eq!(
            Runner::new(&Session::open(&mock), &invocation, &running).run(),
            Exit::Interrupted
        );
        assert!(mock.writes.borrow().is_empty());
    }

    #[test]
    fn stop_request_during_status_read() {
        let mock = MockDevice::new();
        mock.set_idle_status(status_report(true, true, false, 0));
        let session = Session::open(&mock);
        let mut invocation = Invocation::new(Action::Oneshot);
        invocation.detect_reboot = true;
        invocation.detect_triggered = true;
        let running = AtomicBool::new(false);

        let runner = Runner::new(&session, &invocation, &running);
        assert_eq!(runner.status(), Err(Exit::Interrupted));
        assert_eq!(mock.reads.get(), 2);
    }
}
