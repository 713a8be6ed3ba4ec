use std::{
    fmt::{self, Display},
    sync::mpsc::Sender,
    time::{SystemTime, UNIX_EPOCH},
};

use glam::DVec3;
use thiserror::Error;

use crate::units::PhysicalSample;

pub const IMU_TOPIC: &str = "imu/data_raw";
pub const TEMPERATURE_TOPIC: &str = "temperature";

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub frame_id: String,
    pub stamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImuMessage {
    pub header: Header,
    // m/s²
    pub linear_acceleration: DVec3,
    // rad/s
    pub angular_velocity: DVec3,
}

impl From<PhysicalSample> for ImuMessage {
    fn from(sample: PhysicalSample) -> Self {
        Self {
            header: Header {
                frame_id: sample.frame_id,
                stamp: sample.stamp,
            },
            linear_acceleration: sample.linear_acceleration,
            angular_velocity: sample.angular_velocity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureMessage {
    pub header: Header,
    // °C
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Imu(ImuMessage),
    Temperature(TemperatureMessage),
}

impl Message {
    pub fn header(&self) -> &Header {
        match self {
            Message::Imu(imu) => &imu.header,
            Message::Temperature(temp) => &temp.header,
        }
    }
}

// one line per message, stamp as seconds since the epoch
impl Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();
        let stamp = header
            .stamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        write!(f, "{:.6} {}", stamp, header.frame_id)?;

        match self {
            Message::Imu(imu) => {
                let (a, w) = (imu.linear_acceleration, imu.angular_velocity);
                write!(
                    f,
                    " accel=[{:.4}, {:.4}, {:.4}] gyro=[{:.4}, {:.4}, {:.4}]",
                    a.x, a.y, a.z, w.x, w.y, w.z
                )
            }
            Message::Temperature(temp) => write!(f, " temperature={:.2}", temp.temperature),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: &'static str,
    pub message: Message,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no subscriber left on {0}")]
    Disconnected(&'static str),
}

pub trait Publisher {
    fn publish(&mut self, topic: &'static str, message: Message) -> Result<(), PublishError>;
}

impl Publisher for Sender<Published> {
    fn publish(&mut self, topic: &'static str, message: Message) -> Result<(), PublishError> {
        self.send(Published { topic, message })
            .map_err(|_| PublishError::Disconnected(topic))
    }
}
