pub mod config;
pub mod console;
pub mod core;
pub mod errors;

// Re-export commonly used items for convenience
pub use config::LiveConfig;
pub use console::{Console, ConsoleDevices, ConsoleSignals};
pub use core::*;
pub use errors::{ConfigError, ConfigResult, DeviceError, ToolDispatchError};
