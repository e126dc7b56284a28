//! Type definitions for bioble

pub mod error;
pub mod log_event;
pub mod peripheral;

pub use error::{Error, Result};
pub use log_event::{LogEvent, LogLevel};
pub use peripheral::{Advertisement, PeripheralId};
