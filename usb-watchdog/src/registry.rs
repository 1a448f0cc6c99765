/// Whether a setting survives a device reboot.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Persistence {
    //reset to firmware default on reboot
    Volatile,
    //kept in device storage, takes effect after the next reboot
    NonVolatile,
}

/// How a setting's payload is interpreted.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Codec {
    //two bytes, major then minor
    Version,
    Uint16,
    //ping light and buzzer bits sharing one byte
    Flags,
    Byte,
    //fixed length [A-Za-z0-9_-]
    AlnumString,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Setting {
    Version,
    SerialNumber,
    NonvolatileTimeout,
    VolatileTimeout,
    NonvolatilePinglightBuzzer,
    VolatilePinglightBuzzer,
    NonvolatileBuzzerFrequency,
    VolatileBuzzerFrequency,
    RebootIndicator,
    NonvolatileBeaconMode,
}

/// Wire location and codec of one setting.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FeatureReport {
    pub setting: Setting,
    pub id: u8,
    pub len: usize,
    pub persistence: Persistence,
    pub codec: Codec,
}

const fn row(
    setting: Setting,
    id: u8,
    len: usize,
    persistence: Persistence,
    codec: Codec,
) -> FeatureReport {
    FeatureReport {
        setting,
        id,
        len,
        persistence,
        codec,
    }
}

pub static FEATURE_REPORTS: [FeatureReport; 10] = [
    row(Setting::Version, 0x1, 2, Persistence::NonVolatile, Codec::Version),
    row(Setting::SerialNumber, 0x2, 20, Persistence::NonVolatile, Codec::AlnumString),
    row(Setting::NonvolatileTimeout, 0x3, 2, Persistence::NonVolatile, Codec::Uint16),
    row(Setting::VolatileTimeout, 0x4, 2, Persistence::Volatile, Codec::Uint16),
    row(Setting::NonvolatilePinglightBuzzer, 0x5, 1, Persistence::NonVolatile, Codec::Flags),
    row(Setting::VolatilePinglightBuzzer, 0x6, 1, Persistence::Volatile, Codec::Flags),
    row(Setting::NonvolatileBuzzerFrequency, 0x7, 1, Persistence::NonVolatile, Codec::Byte),
    row(Setting::VolatileBuzzerFrequency, 0x8, 1, Persistence::Volatile, Codec::Byte),
    row(Setting::RebootIndicator, 0x9, 1, Persistence::Volatile, Codec::Byte),
    row(Setting::NonvolatileBeaconMode, 0xA, 1, Persistence::NonVolatile, Codec::Byte),
];

impl Setting {
    pub fn report(self) -> &'static FeatureReport {
        let index = match self {
            Setting::Version => 0,
            Setting::SerialNumber => 1,
            Setting::NonvolatileTimeout => 2,
            Setting::VolatileTimeout => 3,
            Setting::NonvolatilePinglightBuzzer => 4,
            Setting::VolatilePinglightBuzzer => 5,
            Setting::NonvolatileBuzzerFrequency => 6,
            Setting::VolatileBuzzerFrequency => 7,
            Setting::RebootIndicator => 8,
            Setting::NonvolatileBeaconMode => 9,
        };
        &FEATURE_REPORTS[index]
    }

    pub fn id(self) -> u8 {
        self.report().id
    }

    pub fn payload_len(self) -> usize {
        self.report().len
    }
}

/// Asynchronous status input report.
pub const IN_WATCHDOG_STATUS: u8 = 0x1;
pub const IN_WATCHDOG_STATUS_LEN: usize = 3;

/// Output report shared by pet and beacon on/off.
pub const OUT_PET_WATCHDOG: u8 = 0x1;
pub const OUT_PET_WATCHDOG_LEN: usize = 1;
//pet acknowledge, or the beacon on/off flag in beacon mode
pub const WATCHDOG_OUT_TIMEOUT_BIT: u8 = 0x1;
pub const WATCHDOG_OUT_CLEARALARM_BIT: u8 = 0x2;

pub const SERIAL_NUMBER_UNSET: &str = "00000000000000000000";

pub const MIN_BUZZER_FREQUENCY: u16 = 42;
pub const MAX_BUZZER_FREQUENCY: u16 = 255;
