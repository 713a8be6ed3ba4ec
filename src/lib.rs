pub mod bus;
pub mod config;
pub mod mpu6050;
pub mod publish;
pub mod registers;
pub mod scheduler;
pub mod units;
