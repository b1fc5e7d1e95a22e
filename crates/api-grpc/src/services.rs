//! Services module

pub mod health;

pub use health::{MonitoredHealthService, CHECK_METHOD, WATCH_METHOD};
