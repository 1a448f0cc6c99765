use crate::Error;
use scroll::{Pread, Pwrite, LE};

pub const PINGLIGHT_BIT: u8 = 0x1;
pub const BUZZER_BIT: u8 = 0x2;

/// Reads a little-endian u16 from the first two bytes.
pub fn decode_u16_le(bytes: &[u8]) -> Result<u16, Error> {
    Ok(bytes.pread_with::<u16>(0, LE)?)
}

/// Narrows `value` to a u16 and lays it out little-endian.
pub fn encode_u16_le(value: u32) -> Result<[u8; 2], Error> {
    if value > u32::from(u16::MAX) {
        return Err(Error::ValueTooLarge);
    }

    let mut buffer = [0_u8; 2];
    buffer[..].pwrite_with(value as u16, 0, LE)?;
    Ok(buffer)
}

/// Ping light and buzzer enables, which share one feature report byte.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct PinglightBuzzer {
    pub pinglight: bool,
    pub buzzer: bool,
}

impl From<u8> for PinglightBuzzer {
    fn from(val: u8) -> Self {
        PinglightBuzzer {
            pinglight: val & PINGLIGHT_BIT != 0,
            buzzer: val & BUZZER_BIT != 0,
        }
    }
}

impl PinglightBuzzer {
    /// Builds the byte to write back: bits given as `None` keep their value from `current`.
    pub fn merge(current: u8, pinglight: Option<bool>, buzzer: Option<bool>) -> u8 {
        let current = PinglightBuzzer::from(current);
        PinglightBuzzer {
            pinglight: pinglight.unwrap_or(current.pinglight),
            buzzer: buzzer.unwrap_or(current.buzzer),
        }
        .into()
    }
}

impl From<PinglightBuzzer> for u8 {
    fn from(flags: PinglightBuzzer) -> Self {
        let mut val = 0;
        if flags.pinglight {
            val |= PINGLIGHT_BIT;
        }
        if flags.buzzer {
            val |= BUZZER_BIT;
        }
        val
    }
}

/// True for a non-empty string of `[A-Za-z0-9_-]`.
pub fn is_alnum(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn decode_alnum_string(bytes: &[u8]) -> Result<String, Error> {
    let text = core::str::from_utf8(bytes)?;
    Ok(text.into())
}

/// Encodes `text` into exactly `len` bytes.
pub fn encode_alnum_string(text: &str, len: usize) -> Result<Vec<u8>, Error> {
    if !is_alnum(text) {
        return Err(Error::InvalidCharacters);
    }
    if text.len() != len {
        return Err(Error::InvalidLength);
    }
    Ok(text.as_bytes().to_vec())
}
