/// Little-endian integers, flag bytes and fixed-length strings as they sit in report payloads.
mod codec;
pub use codec::*;

/// Feature report ids and lengths for every device setting.
mod registry;
pub use registry::*;

/// Open device handle with typed getters and setters for every setting.
mod session;
pub use session::*;

/// Decoding of the asynchronous status input report.
mod status;
pub use status::*;

/// Sequencing of configure, report, pet and query steps for each CLI action.
mod action;
pub use action::*;

/// In-memory device used to drive the session without hardware.
pub mod mock;
pub use mock::*;

#[cfg(feature = "hidapi")]
mod hidapi_trait;
#[cfg(feature = "hidapi")]
pub use hidapi_trait::*;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("USB Watchdog not open")]
    NotOpen,
    #[error("received fewer bytes than the report length")]
    ShortRead,
    #[error("device accepted a different number of bytes than were sent")]
    WriteMismatch,
    #[error("no status report arrived before the deadline")]
    Timeout,
    #[error("value is out of range for this setting")]
    ValueOutOfRange,
    #[error("value is too large to encode")]
    ValueTooLarge,
    #[error("value has the wrong length")]
    InvalidLength,
    #[error("value must be alphanumeric")]
    InvalidCharacters,
    #[error("serial number is already set")]
    AlreadySet,
    #[error("device does not support this setting")]
    Unsupported,
    #[error("could not parse device response")]
    Parse,
    #[error("transmission failed: {0}")]
    Transmission(String),
}

/// Raw HID primitives the session is built on.
///
/// Feature reports carry the report id in the first byte in both directions.
/// `read_timeout` returns 0 when nothing arrived before the deadline.
pub trait HidTransport {
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error>;
    fn send_feature_report(&self, data: &[u8]) -> Result<usize, Error>;
    fn write(&self, data: &[u8]) -> Result<usize, Error>;
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, Error>;
}

impl<'a, T: HidTransport + ?Sized> HidTransport for &'a T {
    fn get_feature_report(&self, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).get_feature_report(buf)
    }
    fn send_feature_report(&self, data: &[u8]) -> Result<usize, Error> {
        (**self).send_feature_report(data)
    }
    fn write(&self, data: &[u8]) -> Result<usize, Error> {
        (**self).write(data)
    }
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, Error> {
        (**self).read_timeout(buf, timeout_ms)
    }
}

impl From<scroll::Error> for Error {
    fn from(_err: scroll::Error) -> Self {
        Error::Parse
    }
}

impl From<core::str::Utf8Error> for Error {
    fn from(_err: core::str::Utf8Error) -> Self {
        Error::Parse
    }
}
