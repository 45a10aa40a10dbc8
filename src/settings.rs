use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dedup::ImportMode;
use crate::error::{Result, SalonError};
use crate::gapfill::GapFillConfig;
use crate::header::DEFAULT_HEADER_ROWS;
use crate::layout::DEFAULT_MAX_GROUPS;
use crate::sheet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Label appended to rendered prices.
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub import: ImportDefaults,
    #[serde(default)]
    pub gap_fill: GapFillConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportDefaults {
    pub mode: ImportMode,
    pub max_groups: usize,
    pub header_rows: usize,
    pub commit_every: Option<usize>,
    pub sheet_keywords: Vec<String>,
    /// Extra header spellings per field key, e.g. `{"project": ["疗程"]}`.
    pub synonyms: BTreeMap<String, Vec<String>>,
}

impl Default for ImportDefaults {
    fn default() -> Self {
        Self {
            mode: ImportMode::AddOnly,
            max_groups: DEFAULT_MAX_GROUPS,
            header_rows: DEFAULT_HEADER_ROWS,
            commit_every: None,
            sheet_keywords: sheet::default_keywords(),
            synonyms: BTreeMap::new(),
        }
    }
}

fn default_currency() -> String {
    "元".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            currency: default_currency(),
            import: ImportDefaults::default(),
            gap_fill: GapFillConfig::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("salonbook")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("salonbook")
}

/// Settings from disk, or defaults when the file is missing. A file that
/// exists but does not parse is an error rather than silently ignored.
pub fn load_settings() -> Result<Settings> {
    let path = settings_path();
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)?;
    parse_settings(&content).map_err(|e| SalonError::Settings(format!("{}: {e}", path.display())))
}

fn parse_settings(content: &str) -> std::result::Result<Settings, serde_json::Error> {
    serde_json::from_str(content)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings).map_err(|e| SalonError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
