pub mod config;
pub mod error;
pub mod events;
pub mod flows;
pub mod intent;
pub mod share;

pub use error::{Result, WamiError};
