// divisors match the ranges selected by FULL_SCALE_RANGE

use std::time::SystemTime;

use glam::DVec3;

use crate::mpu6050::RawSample;

const ACCEL_LSB_PER_G: f64 = 2048.0;
const GRAVITY: f64 = 9.8;

const GYRO_LSB_PER_DEG_S: f64 = 16.4;
const RAD_PER_DEG: f64 = 0.0174;

const TEMP_LSB_PER_DEG_C: f64 = 340.0;
const TEMP_OFFSET_DEG_C: f64 = 36.53;

// m/s²
pub fn convert_accel(raw: i16) -> f64 {
    raw as f64 / ACCEL_LSB_PER_G * GRAVITY
}

// rad/s
pub fn convert_gyro(raw: i16) -> f64 {
    raw as f64 / GYRO_LSB_PER_DEG_S * RAD_PER_DEG
}

// °C
pub fn convert_temp(raw: i16) -> f64 {
    raw as f64 / TEMP_LSB_PER_DEG_C + TEMP_OFFSET_DEG_C
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSample {
    pub frame_id: String,
    pub stamp: SystemTime,
    pub linear_acceleration: DVec3,
    pub angular_velocity: DVec3,
}

impl PhysicalSample {
    pub fn from_raw(raw: &RawSample, frame_id: &str, stamp: SystemTime) -> Self {
        let [ax, ay, az] = raw.accel;
        let [gx, gy, gz] = raw.gyro;

        Self {
            frame_id: frame_id.to_owned(),
            stamp,
            linear_acceleration: DVec3::new(convert_accel(ax), convert_accel(ay), convert_accel(az)),
            angular_velocity: DVec3::new(convert_gyro(gx), convert_gyro(gy), convert_gyro(gz)),
        }
    }
}
