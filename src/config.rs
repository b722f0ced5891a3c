use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub content: ContentConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long a connection waits on a locked database.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

pub(crate) fn default_max_connections() -> u32 {
    5
}

pub(crate) fn default_busy_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    /// Local git repository holding the content. When `url` is also set the
    /// remote is cloned here.
    #[serde(default)]
    pub repo_path: Option<PathBuf>,
    /// Remote to clone and fetch from.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Clone location when only `url` is given. Defaults to a directory
    /// next to the database file.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_include_unpublished")]
    pub include_unpublished: bool,
    /// Version served before anything has been marked live.
    #[serde(default)]
    pub initial_live_version: Option<String>,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.json".to_string()]
}

fn default_include_unpublished() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_limit: default_limit(),
        }
    }
}

fn default_backend() -> String {
    "sqlite".to_string()
}

fn default_limit() -> usize {
    10
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
    "127.0.0.1:8080".to_string()
}

/// Include/exclude glob filter over content file paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    /// A filter that accepts every path.
    pub fn accept_all() -> Result<Self> {
        Self::new(&["**".to_string()], &[])
    }

    pub fn accepts(&self, path: &str) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

impl ContentConfig {
    pub fn path_filter(&self) -> Result<PathFilter> {
        PathFilter::new(&self.include_globs, &self.exclude_globs)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections < 1 {
        bail!("db.max_connections must be >= 1");
    }

    if config.search.default_limit < 1 {
        bail!("search.default_limit must be >= 1");
    }

    match config.search.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown search backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    if config.content.repo_path.is_none() && config.content.url.is_none() {
        bail!("content.repo_path or content.url must be set");
    }

    if config.content.branch.trim().is_empty() {
        bail!("content.branch must not be empty");
    }

    config.content.path_filter()?;

    Ok(config)
}
