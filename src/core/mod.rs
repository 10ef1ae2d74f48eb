// Public modules
pub mod build;
pub mod compress;
pub mod config;
pub mod defaults;
pub mod deploy;
pub mod detect;
pub mod error;
pub mod hooks;
pub mod log;
pub mod module;
pub mod paths;
pub mod pipeline;
pub mod ssh;
pub mod transfer;
pub mod workspace;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
pub use log::{Level, LogSink};
pub use module::{ModuleConfig, ModuleType};
pub use workspace::Workspace;
