//! Core types module

pub mod config;


pub use config::{MasterConfig, RegisterClockConfig, ServoConfig, ServoConfigBuilder};
