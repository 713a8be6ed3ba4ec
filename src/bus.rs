use std::fmt::{self, Debug, Display};

use embedded_hal::blocking::i2c::{Write, WriteRead};
use linux_embedded_hal::I2cdev;
use log::debug;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Read,
    Write,
}

impl Display for BusOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BusOp::Read => "read",
            BusOp::Write => "write",
        })
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("{op} of register 0x{register:02x} on device 0x{address:02x} failed: {reason}")]
    Transaction {
        op: BusOp,
        address: u8,
        register: u8,
        reason: String,
    },
}

impl BusError {
    fn transaction<E: Debug>(op: BusOp, address: u8, register: u8, err: E) -> Self {
        BusError::Transaction {
            op,
            address,
            register,
            reason: format!("{:?}", err),
        }
    }
}

// one bus transaction per call, no retry
pub trait RegisterBus {
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8, BusError>;

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<(), BusError>;
}

pub struct I2cBus<I> {
    i2c: I,
}

impl I2cBus<I2cdev> {
    pub fn open(bus: u8) -> Result<Self, BusError> {
        let path = format!("/dev/i2c-{}", bus);
        debug!("opening {}", path);

        let i2c = I2cdev::new(&path).map_err(|err| BusError::Open {
            reason: err.to_string(),
            path,
        })?;

        Ok(Self::new(i2c))
    }
}

impl<I> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I, E> RegisterBus for I2cBus<I>
where
    I: Write<Error = E> + WriteRead<Error = E>,
    E: Debug,
{
    fn read_byte(&mut self, address: u8, register: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(address, &[register], &mut buf)
            .map_err(|err| BusError::transaction(BusOp::Read, address, register, err))?;

        Ok(buf[0])
    }

    fn write_byte(&mut self, address: u8, register: u8, value: u8) -> Result<(), BusError> {
        self.i2c
            .write(address, &[register, value])
            .map_err(|err| BusError::transaction(BusOp::Write, address, register, err))
    }
}
