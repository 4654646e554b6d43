pub mod api;
pub mod automation;
pub mod config;
pub mod device;
pub mod error;
pub mod hosts;
pub mod models;
