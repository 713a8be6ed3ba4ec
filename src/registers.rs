// output registers hold the high byte, the low byte is at offset + 1

use std::{ops::RangeInclusive, time::Duration};

pub const DEFAULT_ADDRESS: u8 = 0x68;

// the rest of the 7-bit space is reserved
pub const VALID_ADDRESSES: RangeInclusive<u8> = 0x08..=0x77;

pub const POWER_ON: u8 = 0x00;

// ±2000 °/s and ±16 g
pub const FULL_SCALE_RANGE: u8 = 0x18;

pub const SETTLE_TIME: Duration = Duration::from_millis(500);

#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Register {
    SMPLRT_DIV = 0x19,
    CONFIG = 0x1A,
    GYRO_CONFIG = 0x1B,
    ACCEL_CONFIG = 0x1C,
    INT_PIN_CFG = 0x37,
    INT_ENABLE = 0x38,
    ACCEL_XOUT_H = 0x3B,
    ACCEL_YOUT_H = 0x3D,
    ACCEL_ZOUT_H = 0x3F,
    TEMP_OUT_H = 0x41,
    GYRO_XOUT_H = 0x43,
    GYRO_YOUT_H = 0x45,
    GYRO_ZOUT_H = 0x47,
    PWR_MGMT_1 = 0x6B,
}

impl Register {
    pub const fn addr(self) -> u8 {
        self as u8
    }

    pub const fn low_byte(self) -> u8 {
        self as u8 + 1
    }
}
