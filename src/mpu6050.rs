use embedded_hal::blocking::delay::DelayMs;
use log::{debug, info};

use crate::{
    bus::{BusError, RegisterBus},
    registers::{Register, FULL_SCALE_RANGE, POWER_ON, SETTLE_TIME},
};

const ACCEL_REGISTERS: [Register; 3] = [
    Register::ACCEL_XOUT_H,
    Register::ACCEL_YOUT_H,
    Register::ACCEL_ZOUT_H,
];

const GYRO_REGISTERS: [Register; 3] = [
    Register::GYRO_XOUT_H,
    Register::GYRO_YOUT_H,
    Register::GYRO_ZOUT_H,
];

pub fn to_signed16(value: u16) -> i16 {
    if value >= 0x8000 {
        -(0x10000 - value as i32) as i16
    } else {
        value as i16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawSample {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

pub struct Mpu6050<B> {
    bus: B,
    address: u8,
}

impl<B: RegisterBus> Mpu6050<B> {
    pub fn new(bus: B, address: u8) -> Self {
        Self { bus, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> B {
        self.bus
    }

    // power on, settle, widest ranges. once, before any sampling
    pub fn start<D: DelayMs<u32>>(&mut self, delay: &mut D) -> Result<(), BusError> {
        self.configure_power()?;
        debug!("waiting {:?} for the sensor to settle", SETTLE_TIME);
        delay.delay_ms(SETTLE_TIME.as_millis() as u32);
        self.configure_ranges()?;

        info!("mpu6050 at 0x{:02x} configured", self.address);
        Ok(())
    }

    pub fn configure_power(&mut self) -> Result<(), BusError> {
        self.write(Register::PWR_MGMT_1, POWER_ON)
    }

    pub fn configure_ranges(&mut self) -> Result<(), BusError> {
        self.write(Register::GYRO_CONFIG, FULL_SCALE_RANGE)?;
        self.write(Register::ACCEL_CONFIG, FULL_SCALE_RANGE)
    }

    pub fn read_word16(&mut self, register: Register) -> Result<i16, BusError> {
        let high = self.bus.read_byte(self.address, register.addr())?;
        let low = self.bus.read_byte(self.address, register.low_byte())?;

        Ok(to_signed16((high as u16) << 8 | low as u16))
    }

    // accel x/y/z then gyro x/y/z, first failed read aborts the sample
    pub fn read_raw_sample(&mut self) -> Result<RawSample, BusError> {
        let mut sample = RawSample::default();

        for (value, register) in sample.accel.iter_mut().zip(ACCEL_REGISTERS) {
            *value = self.read_word16(register)?;
        }
        for (value, register) in sample.gyro.iter_mut().zip(GYRO_REGISTERS) {
            *value = self.read_word16(register)?;
        }

        Ok(sample)
    }

    pub fn read_raw_temperature(&mut self) -> Result<i16, BusError> {
        self.read_word16(Register::TEMP_OUT_H)
    }

    fn write(&mut self, register: Register, value: u8) -> Result<(), BusError> {
        self.bus.write_byte(self.address, register.addr(), value)
    }
}
