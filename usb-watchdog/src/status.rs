use crate::registry::{IN_WATCHDOG_STATUS, IN_WATCHDOG_STATUS_LEN};
use crate::Error;
use scroll::{ctx, Pread};

pub const WATCHDOG_IN_TIMEOUT_BIT: u8 = 0x1;
pub const WATCHDOG_IN_REBOOT_BIT: u8 = 0x2;
pub const WATCHDOG_IN_NONVOLATILE_BEACON_MODE_BIT: u8 = 0x4;

/// One decoded status input report.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StatusSample {
    //timed out in watchdog mode, or switched on in beacon mode
    pub triggered: bool,
    pub reboot_occurred: bool,
    pub beacon_mode_active: bool,
    pub counter: u16,
}

/// Operating mode, derived from the beacon-mode flag.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Mode {
    Watchdog,
    Beacon,
}

impl StatusSample {
    pub fn mode(&self) -> Mode {
        if self.beacon_mode_active {
            Mode::Beacon
        } else {
            Mode::Watchdog
        }
    }
}

impl<'a> ctx::TryFromCtx<'a, scroll::Endian> for StatusSample {
    type Error = Error;
    fn try_from_ctx(this: &'a [u8], le: scroll::Endian) -> Result<(Self, usize), Self::Error> {
        if this.len() < IN_WATCHDOG_STATUS_LEN + 1 {
            return Err(Error::ShortRead);
        }

        let mut offset = 0;
        let id = this.gread_with::<u8>(&mut offset, le)?;
        if id != IN_WATCHDOG_STATUS {
            log::warn!("unexpected input report id {:#x}", id);
        }
        let flags = this.gread_with::<u8>(&mut offset, le)?;
        let counter = this.gread_with::<u16>(&mut offset, le)?;

        Ok((
            StatusSample {
                triggered: flags & WATCHDOG_IN_TIMEOUT_BIT != 0,
                reboot_occurred: flags & WATCHDOG_IN_REBOOT_BIT != 0,
                beacon_mode_active: flags & WATCHDOG_IN_NONVOLATILE_BEACON_MODE_BIT != 0,
                counter,
            },
            offset,
        ))
    }
}
