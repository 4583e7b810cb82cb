use crate::capture::DEFAULT_CAMERA_TIMEOUT;
use crate::companion::ScriptStyle;
use crate::paths::{default_capture_dir, default_journal_path};
use crate::service::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, ServiceConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    #[default]
    Remote,
    Scripted,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSection,
    pub scan: ScanSection,
    pub companion: CompanionSection,
    pub camera: CameraSection,
    pub journal: JournalSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceSection {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    pub mode: BackendMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompanionSection {
    pub mode: BackendMode,
    pub style: ScriptStyle,
    #[serde(deserialize_with = "deserialize_duration")]
    pub reply_delay: Duration,
}

impl Default for CompanionSection {
    fn default() -> Self {
        Self {
            mode: BackendMode::Remote,
            style: ScriptStyle::Canned,
            reply_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    /// Argument vector; `{output}` is replaced with the capture path.
    pub command: Vec<String>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    pub capture_dir: Option<PathBuf>,
}

impl Default for CameraSection {
    fn default() -> Self {
        let command: &[&str] = if cfg!(target_os = "macos") {
            &["imagesnap", "-q", "{output}"]
        } else {
            &["fswebcam", "--no-banner", "-q", "{output}"]
        };
        Self {
            command: command.iter().map(|arg| arg.to_string()).collect(),
            timeout: DEFAULT_CAMERA_TIMEOUT,
            capture_dir: None,
        }
    }
}

impl CameraSection {
    pub fn capture_dir(&self) -> PathBuf {
        self.capture_dir.clone().unwrap_or_else(default_capture_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct JournalSection {
    pub path: Option<PathBuf>,
}

impl JournalSection {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_journal_path)
    }
}

impl AppConfig {
    /// Reads the config file. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| {
            format!(
                "failed to parse config {} (expected TOML)",
                path.display()
            )
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig::new(self.service.base_url.clone()).with_timeout(self.service.timeout)
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}

pub fn ensure_sample_config(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create config parent directory {}",
                parent.display()
            )
        })?;
    }

    let sample = format!(
        r#"# Mood Twin configuration (TOML)

[service]
base_url = "{DEFAULT_BASE_URL}"
# Whole-request limit for scan and chat calls.
timeout = "10s"

[scan]
# "remote" uploads to the scan service, "scripted" returns a fixed demo result.
mode = "remote"

[companion]
mode = "remote"
# Used when mode = "scripted": "canned" or "echo".
style = "canned"
reply_delay = "1s"

[camera]
# {{output}} is replaced with the path the photo must be written to.
# command = ["imagesnap", "-q", "{{output}}"]
timeout = "10s"

[journal]
# path = "/path/to/journal.md"
"#
    );

    std::fs::write(path, sample)
        .with_context(|| format!("failed to write sample config {}", path.display()))?;
    Ok(true)
}
