//! MSU Link
//!
//! - [`msu`]: MSU pack type rules, conversions, and pack scanning
//! - [`connectors`]: console memory polling and game-state tracking
//! - [`channel`]: cross-process track and pack notifications

pub mod channel;
pub mod config;
pub mod connectors;
pub mod error;
pub mod msu;
pub mod paths;

pub use config::AppConfig;
pub use error::{ChannelError, ConfigError};
pub use paths::AppPaths;
