use crate::{Error, HidTransport};
use hidapi::{HidApi, HidDevice};

pub const VENDOR_ID: u16 = 0x16D0;
pub const PRODUCT_ID: u16 = 0x0776;

impl HidTransport for HidDevice {
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error> {
        HidDevice::get_feature_report(self, buf).map_err(|e| e.into())
    }
    fn send_feature_report(&self, data: &[u8]) -> Result<usize, Error> {
        // hidapi only reports success or failure for feature reports
        HidDevice::send_feature_report(self, data)
            .map(|_| data.len())
            .map_err(|e| e.into())
    }
    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        HidDevice::write(self, data).map_err(|e| e.into())
    }
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, Error> {
        HidDevice::read_timeout(self, buf, timeout_ms).map_err(|e| e.into())
    }
}

impl From<hidapi::HidError> for Error {
    fn from(err: hidapi::HidError) -> Self {
        Error::Transmission(err.to_string())
    }
}

/// Opens the first USB Watchdog found, or the one carrying `serial_number`.
pub fn open_device(api: &HidApi, serial_number: Option<&str>) -> Result<HidDevice, Error> {
    let device = match serial_number {
        Some(sn) => api.open_serial(VENDOR_ID, PRODUCT_ID, sn)?,
        None => api.open(VENDOR_ID, PRODUCT_ID)?,
    };
    Ok(device)
}
