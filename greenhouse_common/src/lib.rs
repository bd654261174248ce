// Declare the modules to re-export
pub mod config_sys;
pub mod core;

// Re-export everything
pub use self::config_sys::*;
pub use self::core::*;
