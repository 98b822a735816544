use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use aether_core::{
    AcceleratorPreference, CommandReconstructor, DemoReconstructor, Reconstructor, SessionConfig,
};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AetherConfig {
    pub server: ServerConfig,
    pub session: SessionSettings,
    pub reconstruction: ReconstructionConfig,
}

impl AetherConfig {
    /// The configuration embedded in the binary.
    pub fn embedded() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG).context("embedded default config is invalid")
    }

    /// Parses `overrides` on top of the embedded defaults. Keys absent from
    /// `overrides` keep their default value.
    pub fn from_overrides(overrides: &str) -> Result<Self> {
        let mut base: toml::Table =
            toml::from_str(DEFAULT_CONFIG).context("embedded default config is invalid")?;
        let overlay: toml::Table = toml::from_str(overrides)?;
        merge_tables(&mut base, overlay);
        let config: Self = toml::Value::Table(base).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.chunk_size == 0 {
            return Err(anyhow!("session.chunk_size must be at least 1"));
        }
        if self.reconstruction.backend == BackendKind::Command
            && self.reconstruction.command.trim().is_empty()
        {
            return Err(anyhow!(
                "reconstruction.command must be set when reconstruction.backend = \"command\""
            ));
        }
        Ok(())
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(nested) => {
                if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                    merge_tables(existing, nested);
                } else {
                    base.insert(key, toml::Value::Table(nested));
                }
            }
            value => {
                base.insert(key, value);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub chunk_size: usize,
    pub chunk_delay_ms: u64,
    pub synthetic_points: usize,
    pub max_recommended_images: usize,
}

impl SessionSettings {
    #[must_use]
    pub const fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_size: self.chunk_size,
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            synthetic_points: self.synthetic_points,
            max_recommended_images: self.max_recommended_images,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Command,
    Demo,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "command" => Ok(Self::Command),
            "demo" => Ok(Self::Demo),
            _ => Err(anyhow!(
                "invalid backend '{s}', expected 'command' or 'demo'"
            )),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Command => "command",
            Self::Demo => "demo",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructionConfig {
    pub backend: BackendKind,
    pub command: String,
    pub args: Vec<String>,
    pub init_args: Vec<String>,
    pub concurrent: bool,
    pub accelerator: AcceleratorPreference,
    pub demo_points_per_image: usize,
    pub demo_init_delay_ms: u64,
}

impl ReconstructionConfig {
    /// Builds the configured backend. The accelerator preference is resolved
    /// against the host here.
    #[must_use]
    pub fn build_backend(&self) -> Arc<dyn Reconstructor> {
        match self.backend {
            BackendKind::Command => Arc::new(
                CommandReconstructor::new(&self.command)
                    .with_args(self.args.clone())
                    .with_init_args(self.init_args.clone())
                    .with_concurrency(self.concurrent)
                    .with_accelerator(self.accelerator.resolve()),
            ),
            BackendKind::Demo => Arc::new(DemoReconstructor::new(
                self.demo_points_per_image,
                Duration::from_millis(self.demo_init_delay_ms),
            )),
        }
    }
}

pub struct ConfigManager {
    path: PathBuf,
    config: AetherConfig,
}

impl ConfigManager {
    pub fn load() -> Result<Self> {
        let path = default_config_path()?;
        Self::load_with_path(path)
    }

    pub fn load_with_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            AetherConfig::from_overrides(&contents)
                .with_context(|| format!("invalid config at {}", path.display()))?
        } else {
            AetherConfig::embedded()?
        };

        Ok(Self { path, config })
    }

    #[must_use]
    pub const fn config(&self) -> &AetherConfig {
        &self.config
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }
        let toml = toml::to_string_pretty(&self.config)?;
        fs::write(&self.path, toml)
            .with_context(|| format!("failed to write config to {}", self.path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let server = &self.config.server;
        let session = &self.config.session;
        let recon = &self.config.reconstruction;
        let value = match key {
            "server.host" => server.host.clone(),
            "server.port" => server.port.to_string(),
            "session.chunk_size" => session.chunk_size.to_string(),
            "session.chunk_delay_ms" => session.chunk_delay_ms.to_string(),
            "session.synthetic_points" => session.synthetic_points.to_string(),
            "session.max_recommended_images" => session.max_recommended_images.to_string(),
            "reconstruction.backend" => recon.backend.to_string(),
            "reconstruction.command" => recon.command.clone(),
            "reconstruction.args" => recon.args.join(","),
            "reconstruction.init_args" => recon.init_args.join(","),
            "reconstruction.concurrent" => recon.concurrent.to_string(),
            "reconstruction.accelerator" => accelerator_name(recon.accelerator).to_string(),
            "reconstruction.demo_points_per_image" => recon.demo_points_per_image.to_string(),
            "reconstruction.demo_init_delay_ms" => recon.demo_init_delay_ms.to_string(),
            _ => return None,
        };
        Some(value)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut next = self.config.clone();
        match key {
            "server.host" => next.server.host = value.trim().to_string(),
            "server.port" => next.server.port = parse_number(key, value)?,
            "session.chunk_size" => next.session.chunk_size = parse_number(key, value)?,
            "session.chunk_delay_ms" => next.session.chunk_delay_ms = parse_number(key, value)?,
            "session.synthetic_points" => {
                next.session.synthetic_points = parse_number(key, value)?;
            }
            "session.max_recommended_images" => {
                next.session.max_recommended_images = parse_number(key, value)?;
            }
            "reconstruction.backend" => next.reconstruction.backend = value.parse()?,
            "reconstruction.command" => next.reconstruction.command = value.trim().to_string(),
            "reconstruction.args" => next.reconstruction.args = parse_list(value),
            "reconstruction.init_args" => next.reconstruction.init_args = parse_list(value),
            "reconstruction.concurrent" => next.reconstruction.concurrent = parse_bool(value)?,
            "reconstruction.accelerator" => {
                next.reconstruction.accelerator = parse_accelerator(value)?;
            }
            "reconstruction.demo_points_per_image" => {
                next.reconstruction.demo_points_per_image = parse_number(key, value)?;
            }
            "reconstruction.demo_init_delay_ms" => {
                next.reconstruction.demo_init_delay_ms = parse_number(key, value)?;
            }
            _ => return Err(anyhow!("unknown configuration key: {key}")),
        }
        next.validate()?;
        self.config = next;
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("expected boolean value, received '{value}'")),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{key} expects a non-negative integer, received '{value}'"))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_accelerator(value: &str) -> Result<AcceleratorPreference> {
    match value.to_lowercase().as_str() {
        "auto" => Ok(AcceleratorPreference::Auto),
        "cuda" => Ok(AcceleratorPreference::Cuda),
        "none" | "cpu" => Ok(AcceleratorPreference::None),
        _ => Err(anyhow!(
            "invalid accelerator '{value}', expected 'auto', 'cuda' or 'none'"
        )),
    }
}

const fn accelerator_name(pref: AcceleratorPreference) -> &'static str {
    match pref {
        AcceleratorPreference::Auto => "auto",
        AcceleratorPreference::Cuda => "cuda",
        AcceleratorPreference::None => "none",
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base =
        dirs::config_dir().ok_or_else(|| anyhow!("unable to determine configuration directory"))?;
    Ok(base.join("aether").join("config.toml"))
}

#[must_use]
pub fn format_server(cfg: &ServerConfig) -> Vec<String> {
    vec![
        format!("host=\"{}\"", cfg.host),
        format!("port={}", cfg.port),
    ]
}

#[must_use]
pub fn format_session(cfg: &SessionSettings) -> Vec<String> {
    vec![
        format!("chunk_size={}", cfg.chunk_size),
        format!("chunk_delay_ms={}", cfg.chunk_delay_ms),
        format!("synthetic_points={}", cfg.synthetic_points),
        format!("max_recommended_images={}", cfg.max_recommended_images),
    ]
}

#[must_use]
pub fn format_reconstruction(cfg: &ReconstructionConfig) -> Vec<String> {
    let list = |items: &[String]| {
        items
            .iter()
            .map(|item| format!("\"{item}\""))
            .collect::<Vec<_>>()
            .join(", ")
    };
    vec![
        format!("backend=\"{}\"", cfg.backend),
        format!("command=\"{}\"", cfg.command),
        format!("args=[{}]", list(&cfg.args)),
        format!("init_args=[{}]", list(&cfg.init_args)),
        format!("concurrent={}", cfg.concurrent),
        format!("accelerator=\"{}\"", accelerator_name(cfg.accelerator)),
        format!("demo_points_per_image={}", cfg.demo_points_per_image),
        format!("demo_init_delay_ms={}", cfg.demo_init_delay_ms),
    ]
}

/// Renders one section, or every section when `section` is `None`.
pub fn format_sections(config: &AetherConfig, section: Option<&str>) -> Result<Vec<String>> {
    let all: [(&str, Vec<String>); 3] = [
        ("server", format_server(&config.server)),
        ("session", format_session(&config.session)),
        ("reconstruction", format_reconstruction(&config.reconstruction)),
    ];

    let mut lines = Vec::new();
    for (name, body) in all {
        if section.is_some_and(|wanted| wanted != name) {
            continue;
        }
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(format!("[{name}]"));
        lines.extend(body);
    }

    if lines.is_empty() {
        return Err(anyhow!(
            "unknown section '{}', expected server, session or reconstruction",
            section.unwrap_or_default()
        ));
    }
    Ok(lines)
}
