pub mod config_error;
pub mod device_error;
pub mod tool_error;

pub use config_error::{ConfigError, ConfigResult};
pub use device_error::{DeviceError, DeviceResult};
pub use tool_error::{ToolDispatchError, ToolDispatchResult};
