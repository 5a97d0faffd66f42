pub mod config;
pub mod logging;
pub mod storage;

pub use config::Config;
