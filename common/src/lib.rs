pub mod buffer3;
pub mod cancel;
pub mod config;
pub mod log_setup;
pub mod shared_fn;
pub mod test_utils;

pub use buffer3::Buffer3;
pub use cancel::CancelToken;
pub use config::{ConfigError, ConfigResult, FileFormat};
pub use shared_fn::SharedFn;
