//! # guidance-settings
//!
//! Layered configuration for guidance discovery.
//!
//! Settings are loaded from four layers (in priority order, lowest first):
//! 1. **Compiled defaults**: [`GuidanceSettings::default()`]
//! 2. **User file**: `~/.guidance/settings.json`
//! 3. **Project file**: `<project>/.guidance/settings.json`
//! 4. **Environment variables**: `GUIDANCE_*` overrides
//!
//! # Usage
//!
//! ```no_run
//! use guidance_settings::load_settings;
//!
//! let settings = load_settings(std::path::Path::new(".")).unwrap_or_default();
//! println!("rules enabled: {}", settings.discovery.include_rules);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_paths, project_settings_path,
    user_settings_path,
};
pub use types::*;
