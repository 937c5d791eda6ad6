use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, RwLock};

use crate::pdf::MIN_SCALE;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "inkgrade";

/// Which records an undo may remove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UndoScope {
    /// Highest sequence number across the whole document
    #[default]
    Document,
    /// Highest sequence number on the displayed page
    Page,
}

impl UndoScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            UndoScope::Document => "document",
            UndoScope::Page => "page",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Base URL of the sheet service
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Document path template, `{sheet}` is replaced by the sheet id
    #[serde(default = "default_document_path")]
    pub document_path: String,

    /// Question schema path template
    #[serde(default = "default_schema_path")]
    pub schema_path: String,

    #[serde(default = "default_render_scale")]
    pub render_scale: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Seconds between connectivity probes, 0 disables the probe
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Number of base page rasters kept in memory
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,

    /// Count rejected `next` attempts as visits
    #[serde(default)]
    pub count_failed_navigation: bool,

    /// Clamp awarded marks to the question maximum
    #[serde(default)]
    pub clamp_awarded_marks: bool,

    #[serde(default)]
    pub undo_scope: UndoScope,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_server_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_document_path() -> String {
    "/api/sheets/{sheet}/document".to_string()
}

fn default_schema_path() -> String {
    "/api/sheets/{sheet}/questions".to_string()
}

fn default_render_scale() -> f32 {
    crate::pdf::DEFAULT_RENDER_SCALE
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_probe_interval_secs() -> u64 {
    10
}

fn default_cache_size() -> usize {
    crate::pdf::DEFAULT_CACHE_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            server_url: default_server_url(),
            document_path: default_document_path(),
            schema_path: default_schema_path(),
            render_scale: default_render_scale(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            cache_size: default_cache_size(),
            count_failed_navigation: false,
            clamp_awarded_marks: false,
            undo_scope: UndoScope::default(),
        }
    }
}

impl Settings {
    /// Settings suitable for offline use: no probe, no server assumptions
    #[must_use]
    pub fn offline() -> Self {
        Self {
            probe_interval_secs: 0,
            ..Self::default()
        }
    }

    /// Read settings from an explicit YAML file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut settings: Settings = serde_yaml::from_str(&content)?;
        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        if !(settings.render_scale.is_finite() && settings.render_scale >= MIN_SCALE) {
            warn!(
                "render_scale {} is out of range, using {}",
                settings.render_scale,
                default_render_scale()
            );
            settings.render_scale = default_render_scale();
        }
        Ok(settings)
    }

    pub fn document_url(&self, sheet: &str) -> String {
        self.resolve(&self.document_path, sheet)
    }

    pub fn schema_url(&self, sheet: &str) -> String {
        self.resolve(&self.schema_path, sheet)
    }

    fn resolve(&self, template: &str, sheet: &str) -> String {
        format!(
            "{}{}",
            self.server_url.trim_end_matches('/'),
            template.replace("{sheet}", sheet)
        )
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

/// Load settings from the platform config directory, writing defaults when
/// no file exists yet
pub fn load_settings() {
    let Some(path) = preferred_config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };

    if path.exists() {
        load_settings_from_path(&path);
    } else {
        info!("Settings file not found, creating with defaults at {path:?}");
        if let Ok(settings) = SETTINGS.read() {
            save_settings_to_file(&settings, &path);
        }
    }
}

/// Replace the global settings with the content of `path`
pub fn load_settings_from_path(path: &Path) {
    match Settings::load_from(path) {
        Ok(settings) => {
            debug!("Loaded settings from {path:?}");
            if let Ok(mut global) = SETTINGS.write() {
                *global = settings;
            }
        }
        Err(e) => {
            error!("Failed to load settings file {path:?}: {e}");
        }
    }
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // Future migrations go here

    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = generate_settings_yaml(settings);

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> String {
    let mut content = String::new();

    content.push_str(&format!("version: {}\n", settings.version));
    content.push_str(&format!("server_url: \"{}\"\n", settings.server_url));
    content.push_str(&format!("document_path: \"{}\"\n", settings.document_path));
    content.push_str(&format!("schema_path: \"{}\"\n", settings.schema_path));
    content.push_str(&format!("render_scale: {}\n", settings.render_scale));
    content.push_str(&format!(
        "request_timeout_secs: {}\n",
        settings.request_timeout_secs
    ));
    content.push_str(&format!(
        "probe_interval_secs: {}\n",
        settings.probe_interval_secs
    ));
    content.push_str(&format!("cache_size: {}\n", settings.cache_size));
    content.push('\n');
    content.push_str(POLICY_TEMPLATE);
    content.push_str(&format!(
        "count_failed_navigation: {}\n",
        settings.count_failed_navigation
    ));
    content.push_str(&format!(
        "clamp_awarded_marks: {}\n",
        settings.clamp_awarded_marks
    ));
    content.push_str(&format!("undo_scope: {}\n", settings.undo_scope.as_str()));

    content
}

const POLICY_TEMPLATE: &str = r#"# ============================================================================
# Grading policies
# ============================================================================
# count_failed_navigation: also count rejected "next" attempts as visits
# clamp_awarded_marks:     never record more than a question's maximum
# undo_scope:              "document" (newest record anywhere) or "page"
"#;

/// Snapshot of the global settings
pub fn current() -> Settings {
    SETTINGS.read().map(|s| s.clone()).unwrap_or_default()
}

pub fn set_server_url(url: &str) {
    if let Ok(mut settings) = SETTINGS.write() {
        settings.server_url = url.to_string();
    }
}
