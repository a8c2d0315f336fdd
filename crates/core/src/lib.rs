#![forbid(unsafe_code)]

pub mod error;
pub mod interval;
pub mod mastery;
pub mod model;
pub mod priority;
pub mod settings;
pub mod time;

pub use error::Error;
pub use time::Clock;
