use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "render.json";

/// Renderer settings persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub window_width: u32,
    pub window_height: u32,
    pub vsync: bool,
    /// Resource-cache path of the splash image drawn during startup.
    pub splash_path: String,
    /// Size of the pooled per-sprite post-process target. Sprites larger
    /// than this clip when a post shader is applied.
    pub post_target_size: (u32, u32),
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            vsync: true,
            splash_path: "/textures/logo/logo.png".to_string(),
            post_target_size: (1024, 1024),
        }
    }
}

impl RenderConfig {
    /// Loads config from the default config file.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads config from a specified path.
    /// Returns default config if the file doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save config to a specified path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let config = RenderConfig::load_from("definitely-not-here.json").unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let config = RenderConfig {
            window_width: 1920,
            window_height: 1080,
            vsync: false,
            splash_path: "/textures/custom.png".to_string(),
            post_target_size: (512, 512),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RenderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RenderConfig = serde_json::from_str(r#"{"window_width": 800}"#).unwrap();
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, RenderConfig::default().window_height);
        assert_eq!(config.post_target_size, (1024, 1024));
    }
}
