use crate::registry::{Setting, IN_WATCHDOG_STATUS, SERIAL_NUMBER_UNSET};
use crate::{Error, HidTransport};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};

/// A USB Watchdog held in memory.
///
/// Feature reports answer from a table keyed by report id, and writes to it are
/// read back by later gets. Input reports are served from a queue, falling back
/// to `idle_status` once it drains, or timing out when that is unset.
#[derive(Debug, Default)]
pub struct MockDevice {
    pub features: RefCell<HashMap<u8, Vec<u8>>>,
    pub input_reports: RefCell<VecDeque<Vec<u8>>>,
    pub idle_status: RefCell<Option<Vec<u8>>>,
    //every set-feature payload, report id included
    pub feature_writes: RefCell<Vec<Vec<u8>>>,
    //every output report, report id included
    pub writes: RefCell<Vec<Vec<u8>>>,
    pub reads: Cell<usize>,
    //bytes to withhold from the reported length of writes
    pub short_write: Cell<usize>,
    //set once a handle from `handle()` is dropped
    pub released: Cell<bool>,
}

impl MockDevice {
    /// A beacon-capable device in watchdog mode with factory settings.
    pub fn new() -> Self {
        let device = MockDevice::default();
        device.set_feature(Setting::Version, &[1, 1]);
        device.set_feature(Setting::SerialNumber, SERIAL_NUMBER_UNSET.as_bytes());
        device.set_feature(Setting::NonvolatileTimeout, &[60, 0]);
        device.set_feature(Setting::VolatileTimeout, &[60, 0]);
        device.set_feature(Setting::NonvolatilePinglightBuzzer, &[0x3]);
        device.set_feature(Setting::VolatilePinglightBuzzer, &[0x3]);
        device.set_feature(Setting::NonvolatileBuzzerFrequency, &[128]);
        device.set_feature(Setting::VolatileBuzzerFrequency, &[128]);
        device.set_feature(Setting::RebootIndicator, &[0]);
        device.set_feature(Setting::NonvolatileBeaconMode, &[0]);
        device
    }

    /// The older firmware without a beacon-mode report.
    pub fn without_beacon_mode() -> Self {
        let device = MockDevice::new();
        device
            .features
            .borrow_mut()
            .remove(&Setting::NonvolatileBeaconMode.id());
        device
    }

    pub fn set_feature(&self, setting: Setting, payload: &[u8]) {
        self.features
            .borrow_mut()
            .insert(setting.id(), payload.to_vec());
    }

    pub fn feature(&self, setting: Setting) -> Option<Vec<u8>> {
        self.features.borrow().get(&setting.id()).cloned()
    }

    pub fn push_status(&self, report: Vec<u8>) {
        self.input_reports.borrow_mut().push_back(report);
    }

    pub fn set_idle_status(&self, report: Vec<u8>) {
        *self.idle_status.borrow_mut() = Some(report);
    }

    /// A handle that marks the device released when it is dropped.
    pub fn handle(&self) -> MockHandle<'_> {
        MockHandle { device: self }
    }
}

/// Borrowed [`MockDevice`] that records its own release, the way closing a
/// real device handle would.
#[derive(Debug)]
pub struct MockHandle<'a> {
    device: &'a MockDevice,
}

impl<'a> Drop for MockHandle<'a> {
    fn drop(&mut self) {
        self.device.released.set(true);
    }
}

impl<'a> HidTransport for MockHandle<'a> {
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error> {
        self.device.get_feature_report(buf)
    }
    fn send_feature_report(&self, data: &[u8]) -> Result<usize, Error> {
        self.device.send_feature_report(data)
    }
    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        self.device.write(data)
    }
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, Error> {
        self.device.read_timeout(buf, timeout_ms)
    }
}

/// Raw status input report bytes.
pub fn status_report(triggered: bool, reboot: bool, beacon_mode: bool, counter: u16) -> Vec<u8> {
    let mut flags = 0;
    if triggered {
        flags |= crate::status::WATCHDOG_IN_TIMEOUT_BIT;
    }
    if reboot {
        flags |= crate::status::WATCHDOG_IN_REBOOT_BIT;
    }
    if beacon_mode {
        flags |= crate::status::WATCHDOG_IN_NONVOLATILE_BEACON_MODE_BIT;
    }
    let counter = counter.to_le_bytes();
    vec![IN_WATCHDOG_STATUS, flags, counter[0], counter[1]]
}

impl HidTransport for MockDevice {
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error> {
        let id = *buf.first().ok_or(Error::ShortRead)?;
        let features = self.features.borrow();
        let payload = features
            .get(&id)
            .ok_or_else(|| Error::Transmission(format!("no feature report {:#x}", id)))?;

        let len = (payload.len() + 1).min(buf.len());
        buf[0] = id;
        buf[1..len].copy_from_slice(&payload[..len - 1]);

        Ok(len)
    }

    fn send_feature_report(&self, data: &[u8]) -> Result<usize, Error> {
        self.feature_writes.borrow_mut().push(data.to_vec());

        if let Some((id, payload)) = data.split_first() {
            self.features.borrow_mut().insert(*id, payload.to_vec());
        }

        Ok(data.len().saturating_sub(self.short_write.get()))
    }

    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        self.writes.borrow_mut().push(data.to_vec());

        Ok(data.len().saturating_sub(self.short_write.get()))
    }

    fn read_timeout(&self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, Error> {
        self.reads.set(self.reads.get() + 1);

        let report = match self.input_reports.borrow_mut().pop_front() {
            Some(report) => report,
            None => match &*self.idle_status.borrow() {
                Some(report) => report.clone(),
                None => return Ok(0),
            },
        };

        let len = report.len().min(buf.len());
        buf[..len].copy_from_slice(&report[..len]);

        Ok(len)
    }
}
