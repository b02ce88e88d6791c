//! Latch Services Layer
//!
//! Process-level services shared by every binary: settings and logging.

pub mod logging;
pub mod settings;

pub use logging::LoggingError;
pub use settings::{AssetSettings, LogFormat, LoggingSettings, Settings, SettingsError};
