pub mod api;
pub mod core;
pub mod display;
pub mod search;
pub mod tracking;
