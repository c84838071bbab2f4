//! Load and save detection profiles.
//!
//! Two equivalent document shapes are accepted:
//!
//! ```json
//! { "min_area": 20, "histogram_bins": 40 }
//! ```
//!
//! ```json
//! { "modules": { "droplet_analysis": true },
//!   "droplet_detection": { "min_area": 20, "histogram_bins": 40 } }
//! ```
//!
//! Files ending in `.toml` use the same shapes in TOML; everything else is
//! read and written as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::DetectionConfig;
use crate::error::{DetectorError, Result};

/// Section holding the detection parameters in nested documents.
pub const NESTED_SECTION: &str = "droplet_detection";

/// Older spellings of configuration keys that are still read.
const KEY_ALIASES: [&str; 3] = ["pixel_ratio", "gaussian_blur_kernel", "adaptive_C"];

/// Shape of a saved profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileLayout {
    #[default]
    Flat,
    Nested,
}

/// Serialization of a profile file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileFormat {
    Json,
    Toml,
}

impl ProfileFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

#[derive(Serialize)]
struct ModulesSection {
    droplet_analysis: bool,
}

#[derive(Serialize)]
struct NestedProfile<'a> {
    modules: ModulesSection,
    droplet_detection: &'a DetectionConfig,
}

/// Read a profile file and return the validated configuration.
pub fn load_profile(path: &Path) -> Result<DetectionConfig> {
    let text = std::fs::read_to_string(path)?;
    let config = parse_profile(&text, ProfileFormat::from_path(path))?;
    info!(path = %path.display(), "Loaded detection profile");
    Ok(config)
}

/// Parse profile text in either layout.
pub fn parse_profile(text: &str, format: ProfileFormat) -> Result<DetectionConfig> {
    let document: Value = match format {
        ProfileFormat::Json => serde_json::from_str(text)?,
        ProfileFormat::Toml => serde_json::to_value(toml::from_str::<toml::Value>(text)?)?,
    };
    config_from_document(document)
}

/// Build a configuration from an already parsed flat or nested document.
pub fn config_from_document(document: Value) -> Result<DetectionConfig> {
    let section = extract_section(document)?;
    warn_unknown_keys(&section);
    let config: DetectionConfig = serde_json::from_value(Value::Object(section))
        .map_err(|e| DetectorError::InvalidConfig(vec![format!("malformed profile: {e}")]))?;
    config.validate()?;
    Ok(config)
}

fn extract_section(document: Value) -> Result<Map<String, Value>> {
    let Value::Object(mut root) = document else {
        return Err(DetectorError::InvalidConfig(vec![
            "profile must be a JSON object".to_string(),
        ]));
    };
    match root.remove(NESTED_SECTION) {
        Some(Value::Object(section)) => Ok(section),
        Some(_) => Err(DetectorError::InvalidConfig(vec![format!(
            "'{NESTED_SECTION}' must be an object"
        )])),
        None => {
            // Flat documents may still carry a modules table.
            root.remove("modules");
            Ok(root)
        }
    }
}

fn warn_unknown_keys(section: &Map<String, Value>) {
    let Ok(Value::Object(known)) = serde_json::to_value(DetectionConfig::default()) else {
        return;
    };
    for key in section.keys() {
        let recognised = known.contains_key(key)
            || key == "channel_band"
            || KEY_ALIASES.contains(&key.as_str());
        if !recognised {
            warn!(key = %key, "Ignoring unsupported profile key");
        }
    }
}

/// Render a profile in the given layout and format.
pub fn render_profile(
    config: &DetectionConfig,
    layout: ProfileLayout,
    format: ProfileFormat,
) -> Result<String> {
    let nested = NestedProfile {
        modules: ModulesSection {
            droplet_analysis: true,
        },
        droplet_detection: config,
    };
    let text = match (layout, format) {
        (ProfileLayout::Flat, ProfileFormat::Json) => serde_json::to_string_pretty(config)?,
        (ProfileLayout::Nested, ProfileFormat::Json) => serde_json::to_string_pretty(&nested)?,
        (ProfileLayout::Flat, ProfileFormat::Toml) => toml::to_string_pretty(config)?,
        (ProfileLayout::Nested, ProfileFormat::Toml) => toml::to_string_pretty(&nested)?,
    };
    Ok(text)
}

/// Validate `config` and write it to `path`, creating parent directories.
pub fn save_profile(config: &DetectionConfig, path: &Path, layout: ProfileLayout) -> Result<()> {
    config.validate()?;
    let text = render_profile(config, layout, ProfileFormat::from_path(path))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    info!(path = %path.display(), layout = ?layout, "Saved detection profile");
    Ok(())
}
