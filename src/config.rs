use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use plotline_core::analyzer::AnalyzerConfig;
use plotline_core::detector::{AssistSettings, DetectOptions};
use plotline_core::generator::GeneratorSettings;
use plotline_core::ServiceSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            rolling_window: default_rolling_window(),
            min_confidence: default_min_confidence(),
        }
    }
}

fn default_rolling_window() -> usize {
    5
}
fn default_min_confidence() -> f64 {
    0.35
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_true")]
    pub timeline: bool,
    #[serde(default = "default_true")]
    pub character_consistency: bool,
    #[serde(default = "default_true")]
    pub unresolved_setups: bool,
    #[serde(default = "default_true")]
    pub pov: bool,
    #[serde(default)]
    pub ai_assist: bool,
    #[serde(default = "default_max_assisted")]
    pub max_assisted: usize,
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            timeline: true,
            character_consistency: true,
            unresolved_setups: true,
            pov: true,
            ai_assist: false,
            max_assisted: default_max_assisted(),
            context_chars: default_context_chars(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_assisted() -> usize {
    5
}
fn default_context_chars() -> usize {
    4000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Base URL override (OpenAI-compatible gateways, remote Ollama).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            model: None,
            url: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.kind != "disabled"
    }
}

fn default_provider_kind() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_temperature() -> f64 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl Config {
    /// Defaults everywhere, database at `db_path`, no projects.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
            detection: DetectionConfig::default(),
            provider: ProviderConfig::default(),
            server: ServerConfig::default(),
            projects: BTreeMap::new(),
        }
    }

    pub fn project(&self, name: &str) -> Result<&ProjectConfig> {
        self.projects.get(name).with_context(|| {
            format!(
                "No project named '{}' in config. Known projects: {}",
                name,
                self.projects.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }

    /// Settings for the core service.
    pub fn service_settings(&self) -> ServiceSettings {
        let timeout = Duration::from_secs(self.provider.timeout_secs);
        ServiceSettings {
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            analyzer: AnalyzerConfig {
                rolling_window: self.analysis.rolling_window,
                min_confidence: self.analysis.min_confidence,
            },
            detect: DetectOptions {
                timeline: self.detection.timeline,
                character_consistency: self.detection.character_consistency,
                unresolved_setups: self.detection.unresolved_setups,
                pov: self.detection.pov,
                ..DetectOptions::default()
            },
            ai_assist: self.detection.ai_assist,
            assist: AssistSettings {
                max_assisted: self.detection.max_assisted,
                context_chars: self.detection.context_chars,
                timeout,
            },
            generator: GeneratorSettings { timeout },
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be > 0");
    }

    if config.analysis.rolling_window == 0 {
        anyhow::bail!("analysis.rolling_window must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.analysis.min_confidence) {
        anyhow::bail!("analysis.min_confidence must be in [0.0, 1.0]");
    }

    if config.provider.timeout_secs == 0 {
        anyhow::bail!("provider.timeout_secs must be > 0");
    }

    if !(0.0..=2.0).contains(&config.provider.temperature) {
        anyhow::bail!("provider.temperature must be in [0.0, 2.0]");
    }

    match config.provider.kind.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if config.provider.model.is_none() {
                anyhow::bail!(
                    "provider.model must be specified when kind is '{}'",
                    config.provider.kind
                );
            }
        }
        other => anyhow::bail!(
            "Unknown provider kind: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    for (name, project) in &config.projects {
        if project.include_globs.is_empty() {
            anyhow::bail!("projects.{}.include_globs must not be empty", name);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("plotline.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[db]\npath = \"./data/plotline.sqlite\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.cache.ttl_secs, 604800);
        assert!(!config.provider.is_enabled());
        assert!(config.detection.pov);
        assert!(config.projects.is_empty());
    }

    #[test]
    fn test_projects_parse() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"
[db]
path = "./data/plotline.sqlite"

[projects.novel]
root = "./manuscripts/novel"
exclude_globs = ["drafts/**"]
"#,
        );
        let config = load_config(&path).unwrap();
        let novel = config.project("novel").unwrap();
        assert_eq!(novel.include_globs, vec!["**/*.md", "**/*.txt"]);
        assert_eq!(novel.exclude_globs, vec!["drafts/**"]);
        assert!(config.project("other").is_err());
    }

    #[test]
    fn test_enabled_provider_requires_model() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "[db]\npath = \"x.sqlite\"\n\n[provider]\nkind = \"openai\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("provider.model"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "[db]\npath = \"x.sqlite\"\n\n[provider]\nkind = \"claude\"\nmodel = \"m\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_service_settings_follow_config() {
        let mut config = Config::minimal("x.sqlite");
        config.detection.pov = false;
        config.provider.timeout_secs = 12;
        let settings = config.service_settings();
        assert!(!settings.detect.pov);
        assert_eq!(settings.generator.timeout, Duration::from_secs(12));
        assert_eq!(settings.assist.timeout, Duration::from_secs(12));
    }
}
