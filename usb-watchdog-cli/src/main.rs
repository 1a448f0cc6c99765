use hidapi::HidApi;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;
use usb_watchdog::{
    execute, is_alnum, open_device, Action, ConfigurationDelta, Exit, Invocation, Session,
    MAX_BUZZER_FREQUENCY, MIN_BUZZER_FREQUENCY,
};

fn main() {
    let args = Opt::from_args();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if args.global().verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || r.store(false, Ordering::SeqCst)) {
        log::warn!("could not install interrupt handler: {}", e);
    }

    let invocation = args.invocation();
    log::debug!("{:?}", invocation);

    let session = match open(args.global().serial_number.as_deref()) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error opening USB Watchdog: {}", e);
            std::process::exit(Exit::Failure.code());
        }
    };

    let exit = execute(session, &invocation, &running);
    std::process::exit(exit.code());
}

fn open(serial_number: Option<&str>) -> Result<Session<hidapi::HidDevice>, usb_watchdog::Error> {
    let api = HidApi::new()?;
    let d = open_device(&api, serial_number)?;

    log::debug!(
        "found {:?} {:?}",
        d.get_manufacturer_string(),
        d.get_product_string()
    );

    Ok(Session::open(d))
}

fn parse_serial_number(input: &str) -> Result<String, String> {
    if is_alnum(input) {
        Ok(input.into())
    } else {
        Err(format!("{} must be alphanumeric", input))
    }
}

fn parse_timeout(input: &str) -> Result<u16, String> {
    match input.parse::<u16>() {
        Ok(v) if v != 0 => Ok(v),
        _ => Err(format!("{} must be between 1 and 65535", input)),
    }
}

fn parse_frequency(input: &str) -> Result<u16, String> {
    match input.parse::<u16>() {
        Ok(v) if (MIN_BUZZER_FREQUENCY..=MAX_BUZZER_FREQUENCY).contains(&v) => Ok(v),
        _ => Err(format!(
            "{} must be between {} and {}",
            input, MIN_BUZZER_FREQUENCY, MAX_BUZZER_FREQUENCY
        )),
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum OnOff {
    On,
    Off,
}

impl FromStr for OnOff {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "on" => Ok(OnOff::On),
            "off" => Ok(OnOff::Off),
            _ => Err(format!("{} must be on or off", input)),
        }
    }
}

impl From<OnOff> for bool {
    fn from(val: OnOff) -> Self {
        val == OnOff::On
    }
}

#[derive(StructOpt, Debug, PartialEq)]
pub struct GlobalOpts {
    /// Interacts with the designated USB Watchdog. If not provided the first USB Watchdog found will be used.
    #[structopt(long = "serial-number", parse(try_from_str = parse_serial_number))]
    serial_number: Option<String>,

    /// Reports additional information
    #[structopt(long = "verbose")]
    verbose: bool,

    /// Milliseconds to wait for a status report
    #[structopt(long = "status-timeout", default_value = "2000", value_name = "1-65535", parse(try_from_str = parse_timeout))]
    status_timeout: u16,
}

#[derive(StructOpt, Debug, PartialEq)]
pub struct TimeoutOpts {
    /// Sets a watchdog timeout period maintained across USB Watchdog reboots. This does not take effect until the next USB Watchdog reboot.
    #[structopt(long = "nonvolatile-timeout", value_name = "1-65535", parse(try_from_str = parse_timeout))]
    nonvolatile_timeout: Option<u16>,

    /// Sets a watchdog timeout period that is in effect until the USB Watchdog reboots.
    #[structopt(long = "timeout", value_name = "1-65535", parse(try_from_str = parse_timeout))]
    timeout: Option<u16>,
}

#[derive(StructOpt, Debug, PartialEq)]
pub struct SettingsOpts {
    /// Enables/disables the ping light across USB Watchdog reboots. This does not take effect until the next USB Watchdog reboot.
    #[structopt(long = "nonvolatile-pinglight", possible_values = &["on", "off"])]
    nonvolatile_pinglight: Option<OnOff>,

    /// Enables/disables the buzzer across USB Watchdog reboots. This does not take effect until the next USB Watchdog reboot.
    #[structopt(long = "nonvolatile-buzzer", possible_values = &["on", "off"])]
    nonvolatile_buzzer: Option<OnOff>,

    /// Enables/disables the ping light until the USB Watchdog reboots
    #[structopt(long = "pinglight", possible_values = &["on", "off"])]
    pinglight: Option<OnOff>,

    /// Enables/disables the buzzer until the USB Watchdog reboots
    #[structopt(long = "buzzer", possible_values = &["on", "off"])]
    buzzer: Option<OnOff>,

    /// Sets the buzzer frequency maintained across USB Watchdog reboots, 42-255. This does not take effect until the next USB Watchdog reboot.
    #[structopt(long = "nonvolatile-buzzer-frequency", value_name = "42-255", parse(try_from_str = parse_frequency))]
    nonvolatile_buzzer_frequency: Option<u16>,

    /// Sets the buzzer frequency until the USB Watchdog reboots, 42-255
    #[structopt(long = "buzzer-frequency", value_name = "42-255", parse(try_from_str = parse_frequency))]
    buzzer_frequency: Option<u16>,

    /// Clears the reboot indicator bit of the USB Watchdog
    #[structopt(long = "clear-reboot-indicator")]
    clear_reboot_indicator: bool,
}

#[derive(StructOpt, Debug, PartialEq)]
pub struct PetOpts {
    /// Exits program with status code of 2 if USB Watchdog is known to have reboot. The USB Watchdog will not be pet.
    #[structopt(long = "detect-reboot")]
    detect_reboot: bool,

    /// Exits program with status code of 3 if the USB Watchdog is known to have triggered. The USB Watchdog will not be pet.
    #[structopt(long = "detect-triggered")]
    detect_triggered: bool,
}

#[derive(StructOpt, Debug, PartialEq)]
pub enum Cmd {
    /// Identifies if the USB Watchdog is known to have reboot. Returns 0 if not, 1 on error, 2 if it has.
    #[structopt(name = "rebooted")]
    Rebooted {
        #[structopt(flatten)]
        global: GlobalOpts,
    },

    /// Identifies if the USB Watchdog has triggered, by timing out or by beaconing. Returns 0 if not, 1 on error, 3 if it has.
    #[structopt(name = "triggered", alias = "timed-out")]
    Triggered {
        #[structopt(flatten)]
        global: GlobalOpts,
    },

    /// Configures the USB Watchdog and exits
    #[structopt(name = "configure")]
    Configure {
        #[structopt(flatten)]
        global: GlobalOpts,
        #[structopt(flatten)]
        settings: SettingsOpts,
        #[structopt(flatten)]
        timeouts: TimeoutOpts,

        /// Configures the USB Watchdog to act as a 'beacon' (that can be turned on/off) instead of a timeout 'watchdog'. This setting is kept across reboots
        #[structopt(long = "nonvolatile-beacon-mode", possible_values = &["on", "off"])]
        nonvolatile_beacon_mode: Option<OnOff>,
    },

    /// Pets the USB Watchdog once and exits
    #[structopt(name = "oneshot")]
    Oneshot {
        #[structopt(flatten)]
        global: GlobalOpts,
        #[structopt(flatten)]
        timeouts: TimeoutOpts,
        #[structopt(flatten)]
        settings: SettingsOpts,
        #[structopt(flatten)]
        pet: PetOpts,
    },

    /// Pets the USB Watchdog continuously
    #[structopt(name = "continuous")]
    Continuous {
        #[structopt(flatten)]
        global: GlobalOpts,
        #[structopt(flatten)]
        timeouts: TimeoutOpts,
        #[structopt(flatten)]
        settings: SettingsOpts,
        #[structopt(flatten)]
        pet: PetOpts,

        /// Seconds between pets. This should be well below the watchdog timeout.
        #[structopt(long = "pet-interval", value_name = "1-65535", default_value = "1", parse(try_from_str = parse_timeout))]
        pet_interval: u16,
    },

    /// Identifies if the USB Watchdog is in watchdog or beacon mode. Returns 0 for watchdog mode, 1 on error, 2 for beacon mode.
    #[structopt(name = "mode")]
    Mode {
        #[structopt(flatten)]
        global: GlobalOpts,
    },

    /// In 'beacon' mode, this triggers or clears the trigger of the USB Watchdog
    #[structopt(name = "beacon")]
    Beacon {
        #[structopt(flatten)]
        global: GlobalOpts,

        #[structopt(possible_values = &["on", "off"])]
        beacon_state: OnOff,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "usb-watchdog",
    about = "Program to set and pet a USB Watchdog from Macpod LLC."
)]
struct Opt {
    #[structopt(subcommand)]
    cmd: Cmd,
}

impl Opt {
    fn global(&self) -> &GlobalOpts {
        match &self.cmd {
            Cmd::Rebooted { global }
            | Cmd::Triggered { global }
            | Cmd::Configure { global, .. }
            | Cmd::Oneshot { global, .. }
            | Cmd::Continuous { global, .. }
            | Cmd::Mode { global }
            | Cmd::Beacon { global, .. } => global,
        }
    }

    fn invocation(&self) -> Invocation {
        let action = match &self.cmd {
            Cmd::Rebooted { .. } => Action::Rebooted,
            Cmd::Triggered { .. } => Action::Triggered,
            Cmd::Configure { .. } => Action::Configure,
            Cmd::Oneshot { .. } => Action::Oneshot,
            Cmd::Continuous { pet_interval, .. } => Action::Continuous {
                pet_interval: Duration::from_secs((*pet_interval).into()),
            },
            Cmd::Mode { .. } => Action::Mode,
            Cmd::Beacon { beacon_state, .. } => Action::Beacon {
                on: (*beacon_state).into(),
            },
        };

        let mut invocation = Invocation::new(action);
        invocation.status_timeout_ms = self.global().status_timeout;

        match &self.cmd {
            Cmd::Configure {
                settings,
                timeouts,
                nonvolatile_beacon_mode,
                ..
            } => {
                invocation.delta = delta(settings, timeouts);
                invocation.delta.nonvolatile_beacon_mode = nonvolatile_beacon_mode.map(bool::from);
            }
            Cmd::Oneshot {
                settings,
                timeouts,
                pet,
                ..
            }
            | Cmd::Continuous {
                settings,
                timeouts,
                pet,
                ..
            } => {
                invocation.delta = delta(settings, timeouts);
                invocation.detect_reboot = pet.detect_reboot;
                invocation.detect_triggered = pet.detect_triggered;
            }
            _ => {}
        }

        invocation
    }
}

fn delta(settings: &SettingsOpts, timeouts: &TimeoutOpts) -> ConfigurationDelta {
    ConfigurationDelta {
        nonvolatile_timeout: timeouts.nonvolatile_timeout,
        volatile_timeout: timeouts.timeout,
        nonvolatile_pinglight: settings.nonvolatile_pinglight.map(bool::from),
        volatile_pinglight: settings.pinglight.map(bool::from),
        nonvolatile_buzzer: settings.nonvolatile_buzzer.map(bool::from),
        volatile_buzzer: settings.buzzer.map(bool::from),
        nonvolatile_buzzer_frequency: settings.nonvolatile_buzzer_frequency,
        volatile_buzzer_frequency: settings.buzzer_frequency,
        nonvolatile_beacon_mode: None,
        clear_reboot_indicator: settings.clear_reboot_indicator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Opt {
        Opt::from_iter_safe(args).unwrap()
    }

    #[test]
    fn validators() {
        assert_eq!(parse_timeout("1"), Ok(1));
        assert_eq!(parse_timeout("65535"), Ok(65535));
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("65536").is_err());
        assert_eq!(parse_frequency("42"), Ok(42));
        assert!(parse_frequency("41").is_err());
        assert!(parse_frequency("256").is_err());
        assert!(parse_serial_number("abc_123-X").is_ok());
        assert!(parse_serial_number("a b").is_err());
    }

    #[test]
    fn configure_builds_delta() {
        let opt = parse(&[
            "usb-watchdog",
            "configure",
            "--timeout",
            "30",
            "--nonvolatile-buzzer",
            "off",
            "--buzzer-frequency",
            "100",
            "--nonvolatile-beacon-mode",
            "on",
            "--clear-reboot-indicator",
            "--verbose",
        ]);
        let invocation = opt.invocation();

        assert_eq!(invocation.action, Action::Configure);
        assert!(opt.global().verbose);
        assert_eq!(
            invocation.delta,
            ConfigurationDelta {
                volatile_timeout: Some(30),
                nonvolatile_buzzer: Some(false),
                volatile_buzzer_frequency: Some(100),
                nonvolatile_beacon_mode: Some(true),
                clear_reboot_indicator: true,
                ..ConfigurationDelta::default()
            }
        );
    }

    #[test]
    fn continuous_defaults() {
        let invocation = parse(&["usb-watchdog", "continuous", "--detect-reboot"]).invocation();

        assert_eq!(
            invocation.action,
            Action::Continuous {
                pet_interval: Duration::from_secs(1)
            }
        );
        assert!(invocation.detect_reboot);
        assert!(!invocation.detect_triggered);
        assert_eq!(invocation.status_timeout_ms, 2000);
    }

    #[test]
    fn status_timeout_is_bounded() {
        let invocation =
            parse(&["usb-watchdog", "mode", "--status-timeout", "500"]).invocation();
        assert_eq!(invocation.status_timeout_ms, 500);

        for bad in &["--status-timeout=-1", "--status-timeout=0", "--status-timeout=70000"] {
            assert!(Opt::from_iter_safe(&["usb-watchdog", "mode", bad]).is_err());
        }
    }

    #[test]
    fn beacon_state() {
        let invocation = parse(&["usb-watchdog", "beacon", "off"]).invocation();
        assert_eq!(invocation.action, Action::Beacon { on: false });

        assert!(Opt::from_iter_safe(&["usb-watchdog", "beacon", "blink"]).is_err());
    }

    #[test]
    fn timed_out_alias() {
        let opt = parse(&["usb-watchdog", "timed-out", "--serial-number", "WD01"]);
        assert_eq!(opt.invocation().action, Action::Triggered);
        assert_eq!(opt.global().serial_number.as_deref(), Some("WD01"));
    }

    #[test]
    fn rejects_out_of_range() {
        assert!(Opt::from_iter_safe(&["usb-watchdog", "oneshot", "--timeout", "0"]).is_err());
        assert!(
            Opt::from_iter_safe(&["usb-watchdog", "configure", "--buzzer-frequency", "41"])
                .is_err()
        );
    }
}
