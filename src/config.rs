//! Driver configuration
//!
//! Stored as TOML at `~/.config/applespi/config.toml`. Every field has a
//! default, so a partial or missing file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use applespi_input::{FnMode, KeyboardSettings, TouchpadInfo};
use applespi_transport::DebugMask;

use crate::engine::EngineConfig;

/// Persistent driver settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Function key mode: disabled, fkeys-last or fkeys-first
    pub fn_mode: FnMode,
    /// Swap the grave and 102nd keys (ISO keyboards)
    pub iso_layout: bool,
    /// Touchpad bounds override: [x_min, x_max, y_min, y_max]
    pub touchpad_dimensions: Option<[i32; 4]>,
    /// Product name used to look up touchpad bounds, e.g. "MacBookPro13,3"
    pub product_name: Option<String>,
    /// Debug facility bitmask
    pub debug: DebugMask,
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("applespi")
            .join("config.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: DriverConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn touchpad_info(&self) -> TouchpadInfo {
        TouchpadInfo::for_product(self.product_name.as_deref())
            .with_override(self.touchpad_dimensions)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            keyboard: KeyboardSettings {
                fn_mode: self.fn_mode,
                iso_layout: self.iso_layout,
            },
            touchpad: self.touchpad_info(),
            debug: self.debug,
        }
    }
}
