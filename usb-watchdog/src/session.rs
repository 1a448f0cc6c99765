use crate::codec::{
    decode_alnum_string, decode_u16_le, encode_alnum_string, encode_u16_le, PinglightBuzzer,
};
use crate::registry::*;
use crate::status::StatusSample;
use crate::{Error, HidTransport};
use scroll::{Pread, LE};

#[derive(Debug)]
enum Handle<T> {
    Opened(T),
    Closed,
}

/// An open USB Watchdog.
///
/// Every operation checks the handle first and fails with [`Error::NotOpen`]
/// once [`Session::close`] has run. Nothing is cached: each getter is a fresh
/// round trip to the device.
#[derive(Debug)]
pub struct Session<T: HidTransport> {
    handle: Handle<T>,
    beacon_capable: bool,
}

impl<T: HidTransport> Session<T> {
    /// Takes ownership of an opened device and probes for beacon-mode support.
    pub fn open(device: T) -> Self {
        let mut session = Session {
            handle: Handle::Opened(device),
            beacon_capable: false,
        };

        session.beacon_capable = session.get_feature(Setting::NonvolatileBeaconMode).is_ok();
        log::debug!("beacon mode supported: {}", session.beacon_capable);

        session
    }

    pub fn is_open(&self) -> bool {
        matches!(self.handle, Handle::Opened(_))
    }

    /// Whether the firmware has the beacon-mode feature report.
    pub fn beacon_capable(&self) -> bool {
        self.beacon_capable
    }

    /// Releases the device. Later calls fail with [`Error::NotOpen`].
    pub fn close(&mut self) -> Result<(), Error> {
        match std::mem::replace(&mut self.handle, Handle::Closed) {
            Handle::Opened(_device) => Ok(()),
            Handle::Closed => Err(Error::NotOpen),
        }
    }

    fn device(&self) -> Result<&T, Error> {
        match &self.handle {
            Handle::Opened(device) => Ok(device),
            Handle::Closed => Err(Error::NotOpen),
        }
    }

    fn require_beacon_capable(&self) -> Result<(), Error> {
        if self.beacon_capable {
            Ok(())
        } else {
            Err(Error::Unsupported)
        }
    }

    /// Reads the payload of `setting`, report id stripped.
    pub fn get_feature(&self, setting: Setting) -> Result<Vec<u8>, Error> {
        let d = self.device()?;
        let report = setting.report();

        // windows hidapi may hand back a trailing byte, so only a lower bound is checked
        let mut buffer = vec![0_u8; report.len + 1];
        buffer[0] = report.id;
        let len = d.get_feature_report(&mut buffer)?;
        if len < report.len + 1 {
            return Err(Error::ShortRead);
        }

        buffer.remove(0);
        Ok(buffer)
    }

    pub fn set_feature(&self, setting: Setting, payload: &[u8]) -> Result<(), Error> {
        let d = self.device()?;
        let report = setting.report();
        if payload.len() != report.len {
            return Err(Error::InvalidLength);
        }

        let mut buffer = Vec::with_capacity(report.len + 1);
        buffer.push(report.id);
        buffer.extend_from_slice(payload);

        let len = d.send_feature_report(&buffer)?;
        if len != buffer.len() {
            return Err(Error::WriteMismatch);
        }
        Ok(())
    }

    fn get_byte(&self, setting: Setting) -> Result<u8, Error> {
        Ok(self.get_feature(setting)?.as_slice().pread_with::<u8>(0, LE)?)
    }

    /// Firmware version as (major, minor).
    pub fn get_version(&self) -> Result<(u8, u8), Error> {
        let data = self.get_feature(Setting::Version)?;
        let mut offset = 0;
        let major = data.as_slice().gread_with::<u8>(&mut offset, LE)?;
        let minor = data.as_slice().gread_with::<u8>(&mut offset, LE)?;
        Ok((major, minor))
    }

    pub fn get_serial_number(&self) -> Result<String, Error> {
        decode_alnum_string(&self.get_feature(Setting::SerialNumber)?)
    }

    /// Writes the serial number. Only allowed while the device still holds the
    /// factory value of twenty `'0'` characters.
    pub fn set_serial_number(&self, serial_number: &str) -> Result<(), Error> {
        if self.get_feature(Setting::SerialNumber)? != SERIAL_NUMBER_UNSET.as_bytes() {
            return Err(Error::AlreadySet);
        }
        let len = Setting::SerialNumber.payload_len();
        let payload = encode_alnum_string(serial_number, len)?;
        self.set_feature(Setting::SerialNumber, &payload)
    }

    pub fn get_nonvolatile_timeout(&self) -> Result<u16, Error> {
        decode_u16_le(&self.get_feature(Setting::NonvolatileTimeout)?)
    }

    /// Takes effect after the next device reboot.
    pub fn set_nonvolatile_timeout(&self, seconds: u32) -> Result<(), Error> {
        self.set_feature(Setting::NonvolatileTimeout, &encode_u16_le(seconds)?)
    }

    pub fn get_volatile_timeout(&self) -> Result<u16, Error> {
        decode_u16_le(&self.get_feature(Setting::VolatileTimeout)?)
    }

    pub fn set_volatile_timeout(&self, seconds: u32) -> Result<(), Error> {
        self.set_feature(Setting::VolatileTimeout, &encode_u16_le(seconds)?)
    }

    fn get_pinglight_buzzer(&self, setting: Setting) -> Result<PinglightBuzzer, Error> {
        Ok(self.get_byte(setting)?.into())
    }

    // read-modify-write so the sibling bit is left alone
    fn set_pinglight_buzzer(
        &self,
        setting: Setting,
        pinglight: Option<bool>,
        buzzer: Option<bool>,
    ) -> Result<(), Error> {
        let current = self.get_byte(setting)?;
        let val = PinglightBuzzer::merge(current, pinglight, buzzer);
        self.set_feature(setting, &[val])
    }

    pub fn get_nonvolatile_pinglight(&self) -> Result<bool, Error> {
        Ok(self
            .get_pinglight_buzzer(Setting::NonvolatilePinglightBuzzer)?
            .pinglight)
    }

    pub fn set_nonvolatile_pinglight(&self, on: bool) -> Result<(), Error> {
        self.set_pinglight_buzzer(Setting::NonvolatilePinglightBuzzer, Some(on), None)
    }

    pub fn get_nonvolatile_buzzer(&self) -> Result<bool, Error> {
        Ok(self
            .get_pinglight_buzzer(Setting::NonvolatilePinglightBuzzer)?
            .buzzer)
    }

    pub fn set_nonvolatile_buzzer(&self, on: bool) -> Result<(), Error> {
        self.set_pinglight_buzzer(Setting::NonvolatilePinglightBuzzer, None, Some(on))
    }

    pub fn get_volatile_pinglight(&self) -> Result<bool, Error> {
        Ok(self
            .get_pinglight_buzzer(Setting::VolatilePinglightBuzzer)?
            .pinglight)
    }

    pub fn set_volatile_pinglight(&self, on: bool) -> Result<(), Error> {
        self.set_pinglight_buzzer(Setting::VolatilePinglightBuzzer, Some(on), None)
    }

    pub fn get_volatile_buzzer(&self) -> Result<bool, Error> {
        Ok(self.get_pinglight_buzzer(Setting::VolatilePinglightBuzzer)?.buzzer)
    }

    pub fn set_volatile_buzzer(&self, on: bool) -> Result<(), Error> {
        self.set_pinglight_buzzer(Setting::VolatilePinglightBuzzer, None, Some(on))
    }

    fn set_buzzer_frequency(&self, setting: Setting, frequency: u16) -> Result<(), Error> {
        if !(MIN_BUZZER_FREQUENCY..=MAX_BUZZER_FREQUENCY).contains(&frequency) {
            return Err(Error::ValueOutOfRange);
        }
        self.set_feature(setting, &[frequency as u8])
    }

    pub fn get_nonvolatile_buzzer_frequency(&self) -> Result<u8, Error> {
        self.get_byte(Setting::NonvolatileBuzzerFrequency)
    }

    /// Accepts 42 to 255.
    pub fn set_nonvolatile_buzzer_frequency(&self, frequency: u16) -> Result<(), Error> {
        self.set_buzzer_frequency(Setting::NonvolatileBuzzerFrequency, frequency)
    }

    pub fn get_volatile_buzzer_frequency(&self) -> Result<u8, Error> {
        self.get_byte(Setting::VolatileBuzzerFrequency)
    }

    /// Accepts 42 to 255.
    pub fn set_volatile_buzzer_frequency(&self, frequency: u16) -> Result<(), Error> {
        self.set_buzzer_frequency(Setting::VolatileBuzzerFrequency, frequency)
    }

    pub fn get_reboot_indicator(&self) -> Result<bool, Error> {
        Ok(self.get_byte(Setting::RebootIndicator)? != 0)
    }

    /// Clears the reboot indicator. The firmware expects a 1 here and resets
    /// the flag itself.
    pub fn set_reboot_indicator(&self) -> Result<(), Error> {
        self.set_feature(Setting::RebootIndicator, &[0x1])
    }

    pub fn get_nonvolatile_beacon_mode(&self) -> Result<bool, Error> {
        self.require_beacon_capable()?;
        Ok(self.get_byte(Setting::NonvolatileBeaconMode)? != 0)
    }

    pub fn set_nonvolatile_beacon_mode(&self, on: bool) -> Result<(), Error> {
        self.require_beacon_capable()?;
        self.set_feature(Setting::NonvolatileBeaconMode, &[on as u8])
    }

    fn read_input(&self, buffer: &mut [u8], timeout_ms: i32) -> Result<(), Error> {
        let d = self.device()?;
        match d.read_timeout(buffer, timeout_ms)? {
            0 => Err(Error::Timeout),
            len if len != buffer.len() => Err(Error::ShortRead),
            _ => Ok(()),
        }
    }

    /// Reads the status input report.
    ///
    /// The first report read may have been queued before this call, so it is
    /// read and thrown away and only the second one is decoded.
    pub fn read_status(&self, timeout_ms: i32) -> Result<StatusSample, Error> {
        let mut buffer = [0_u8; IN_WATCHDOG_STATUS_LEN + 1];

        self.read_input(&mut buffer, timeout_ms)?;
        self.read_input(&mut buffer, timeout_ms)?;

        let status = buffer[..].pread_with::<StatusSample>(0, LE)?;
        log::debug!("{:?}", status);
        Ok(status)
    }

    fn update_watchdog(&self, timeout_bit: bool, clear_alarm_bit: bool) -> Result<(), Error> {
        let d = self.device()?;

        let mut val = 0;
        if timeout_bit {
            val |= WATCHDOG_OUT_TIMEOUT_BIT;
        }
        if clear_alarm_bit {
            val |= WATCHDOG_OUT_CLEARALARM_BIT;
        }

        let len = d.write(&[OUT_PET_WATCHDOG, val])?;
        if len != OUT_PET_WATCHDOG_LEN + 1 {
            return Err(Error::WriteMismatch);
        }
        Ok(())
    }

    /// Resets the timeout counter. Only meaningful in watchdog mode.
    pub fn pet(&self, clear_alarm: bool) -> Result<(), Error> {
        self.update_watchdog(true, clear_alarm)
    }

    /// Switches the beacon on or off. Shares the pet opcode, so only call this in beacon mode.
    pub fn set_beacon_state(&self, on: bool) -> Result<(), Error> {
        self.update_watchdog(on, true)
    }
}
