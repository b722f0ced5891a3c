//! Git-backed [`VersionStore`].
//!
//! Versions are commit SHAs and objects are blobs read straight from the
//! object database with the `git` CLI, so no working tree checkout is ever
//! touched. When a remote URL is configured the repository is cloned on
//! first use and fetched on later opens.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

use segue_content_core::error::{StoreError, StoreResult};
use segue_content_core::version::{VersionInfo, VersionStore};

use crate::config::Config;

pub struct GitVersionStore {
    repo_dir: PathBuf,
    branch: String,
}

impl GitVersionStore {
    /// Opens an existing local repository.
    pub fn open(repo_dir: impl Into<PathBuf>, branch: impl Into<String>) -> Result<Self> {
        let repo_dir = repo_dir.into();
        let output = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&repo_dir)
            .output()
            .with_context(|| "Failed to execute 'git'. Is git installed?")?;
        if !output.status.success() {
            bail!("Not a git repository: {}", repo_dir.display());
        }
        Ok(Self {
            repo_dir,
            branch: branch.into(),
        })
    }

    /// Opens the repository described by `[content]`, cloning or fetching
    /// the remote first when `url` is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        let content = &config.content;
        let Some(url) = &content.url else {
            let repo_path = content
                .repo_path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("content.repo_path or content.url must be set"))?;
            return Self::open(repo_path, &content.branch);
        };

        let repo_dir = match (&content.repo_path, &content.cache_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(dir)) => dir.clone(),
            (None, None) => {
                // Default: sibling to the DB file
                let db_parent = config
                    .db
                    .path
                    .parent()
                    .unwrap_or_else(|| Path::new("."));
                db_parent.join(".git-cache").join(short_hash(url))
            }
        };

        if repo_dir.join(".git").exists() {
            let store = Self::open(&repo_dir, &content.branch)?;
            store.fetch()?;
            Ok(store)
        } else {
            git_clone(url, &content.branch, &repo_dir)?;
            Self::open(&repo_dir, &content.branch)
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Fetches the tracked branch from `origin`.
    pub fn fetch(&self) -> Result<()> {
        let output = Command::new("git")
            .args(["fetch", "origin", &self.branch])
            .current_dir(&self.repo_dir)
            .output()
            .with_context(|| "Failed to execute 'git fetch'")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git fetch failed: {}", stderr.trim());
        }
        info!(repo = %self.repo_dir.display(), branch = %self.branch, "Fetched content repository");
        Ok(())
    }

    fn run(&self, args: &[&str]) -> StoreResult<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| {
                StoreError::Access(format!("failed to execute git {}: {}", args.join(" "), e))
            })
    }

    /// Runs git and returns stdout, mapping a non-zero exit to an access error.
    fn stdout(&self, args: &[&str]) -> StoreResult<Vec<u8>> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StoreError::Access(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn rev_parse_commit(&self, rev: &str) -> Option<String> {
        let commitish = format!("{}^{{commit}}", rev);
        let output = self
            .run(&["rev-parse", "--verify", "--quiet", &commitish])
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!sha.is_empty()).then_some(sha)
    }

    /// Distinguishes "no such version" from other failures after a git
    /// command against `version` failed.
    fn version_error(&self, version: &str, err: StoreError) -> StoreError {
        if self.verify_version_exists(version) {
            err
        } else {
            StoreError::UnknownVersion(version.to_string())
        }
    }
}

/// Revisions starting with `-` would be read as options.
fn is_safe_revision(version: &str) -> bool {
    !version.is_empty() && !version.starts_with('-')
}

impl VersionStore for GitVersionStore {
    fn read_object(&self, version: &str, path: &str) -> StoreResult<Option<Vec<u8>>> {
        if !is_safe_revision(version) {
            return Err(StoreError::UnknownVersion(version.to_string()));
        }
        let object = format!("{}:{}", version, path);
        let output = self.run(&["cat-file", "blob", &object])?;
        if output.status.success() {
            return Ok(Some(output.stdout));
        }
        if self.verify_version_exists(version) {
            debug!(version, path, "Object not present at version");
            Ok(None)
        } else {
            Err(StoreError::UnknownVersion(version.to_string()))
        }
    }

    fn list_objects(&self, version: &str, suffix: &str) -> StoreResult<Vec<String>> {
        if !is_safe_revision(version) {
            return Err(StoreError::UnknownVersion(version.to_string()));
        }
        let stdout = self
            .stdout(&["ls-tree", "-r", "--name-only", "-z", version])
            .map_err(|e| self.version_error(version, e))?;
        let mut paths: Vec<String> = stdout
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .filter(|path| path.ends_with(suffix))
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn verify_version_exists(&self, version: &str) -> bool {
        is_safe_revision(version) && self.rev_parse_commit(version).is_some()
    }

    fn list_versions(&self) -> StoreResult<Vec<VersionInfo>> {
        let head = self.head_version()?;
        let stdout = self.stdout(&["log", "--format=%H%x09%ct%x09%s", &head])?;
        let text = String::from_utf8_lossy(&stdout);
        let mut versions = Vec::new();
        for line in text.lines() {
            let mut parts = line.splitn(3, '\t');
            let (Some(id), Some(ts)) = (parts.next(), parts.next()) else {
                continue;
            };
            let summary = parts.next().unwrap_or_default().to_string();
            versions.push(VersionInfo {
                id: id.to_string(),
                committed_at: parse_timestamp(ts)?,
                summary,
            });
        }
        Ok(versions)
    }

    fn head_version(&self) -> StoreResult<String> {
        let remote = format!("origin/{}", self.branch);
        self.rev_parse_commit(&remote)
            .or_else(|| self.rev_parse_commit("HEAD"))
            .ok_or_else(|| {
                StoreError::Access(format!(
                    "unable to resolve {} or HEAD in {}",
                    remote,
                    self.repo_dir.display()
                ))
            })
    }

    fn version_time(&self, version: &str) -> StoreResult<DateTime<Utc>> {
        if !is_safe_revision(version) {
            return Err(StoreError::UnknownVersion(version.to_string()));
        }
        let stdout = self
            .stdout(&["show", "-s", "--format=%ct", version])
            .map_err(|e| self.version_error(version, e))?;
        parse_timestamp(String::from_utf8_lossy(&stdout).trim())
    }

    fn object_exists(&self, version: &str, path: &str) -> StoreResult<bool> {
        if !is_safe_revision(version) {
            return Ok(false);
        }
        let object = format!("{}:{}", version, path);
        Ok(self.run(&["cat-file", "-e", &object])?.status.success())
    }
}

fn parse_timestamp(ts: &str) -> StoreResult<DateTime<Utc>> {
    ts.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or_else(|| StoreError::Access(format!("invalid commit timestamp: {}", ts)))
}

fn git_clone(url: &str, branch: &str, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create clone directory: {}", dest.display()))?;

    let output = Command::new("git")
        .args(["clone", "--branch", branch, "--single-branch"])
        .arg(url)
        .arg(dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    info!(url, dest = %dest.display(), "Cloned content repository");
    Ok(())
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}
