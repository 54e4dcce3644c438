//! Driver configuration.
//!
//! The CLI accepts an optional TOML file that sets defaults the flags
//! don't cover: diagnostic coloring and the extension used when an
//! output path is derived from the input path.

use serde::Deserialize;

/// When to color diagnostics written to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    #[serde(default = "default_color")]
    pub color: ColorMode,
    /// Extension for derived output paths (without the dot).
    #[serde(default = "default_extension")]
    pub output_extension: String,
}

fn default_color() -> ColorMode {
    ColorMode::Auto
}

fn default_extension() -> String {
    "s".to_string()
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            color: default_color(),
            output_extension: default_extension(),
        }
    }
}

impl DriverConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("failed to parse config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.color, ColorMode::Auto);
        assert_eq!(config.output_extension, "s");
    }

    #[test]
    fn test_from_toml() {
        let config = DriverConfig::from_toml(
            r#"
color = "never"
output_extension = "asm"
"#,
        )
        .unwrap();
        assert_eq!(config.color, ColorMode::Never);
        assert_eq!(config.output_extension, "asm");
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config = DriverConfig::from_toml("color = \"always\"").unwrap();
        assert_eq!(config.color, ColorMode::Always);
        assert_eq!(config.output_extension, "s");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let err = DriverConfig::from_toml("color = 3").unwrap_err();
        assert!(err.contains("failed to parse config"));
    }
}
