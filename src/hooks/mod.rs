//! Generates typed react-query hooks from route config files.

pub mod emit;
pub mod route;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{error, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::HooksConfig;
use crate::js::ParseError;

pub use emit::HookWriter;
pub use route::{ConfigInfo, RouteInfo};

#[derive(Error, Debug)]
pub enum HookError {
    #[error("reading '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing '{path}': {source}")]
    Parse { path: PathBuf, source: ParseError },

    #[error("writing '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// What happened to one route config.
#[derive(Debug)]
pub enum Outcome {
    Written { output: PathBuf, routes: usize },
    /// No route definitions were recognized.
    Skipped,
}

#[derive(Debug, Default)]
pub struct GenerateSummary {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, HookError)>,
}

fn is_skipped_dir(entry: &DirEntry, config: &HooksConfig) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry.file_name().to_str().map_or(false, |name| {
            name.starts_with('.') || config.skip_dirs.iter().any(|skip| skip == name)
        })
}

/// Route config files under `root`: named `config.config_file_name` and
/// containing `config.marker`.
pub fn discover(root: &Path, config: &HooksConfig) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry, config))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str() == Some(config.config_file_name.as_str()))
        .filter(|entry| has_marker(entry.path(), config))
        .map(|entry| entry.into_path())
        .collect()
}

fn has_marker(path: &Path, config: &HooksConfig) -> bool {
    match std::fs::read_to_string(path) {
        Ok(text) => text.contains(config.marker.as_str()),
        Err(err) => {
            warn!("⚠️  skipping unreadable {}: {}", path.display(), err);
            false
        }
    }
}

/// Where the hooks for `config_path` are written.
pub fn output_path(config_path: &Path, config: &HooksConfig) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(&config.output_dir)
        .join(&config.output_file)
}

/// Generates the hooks file for one route config.
pub fn process_config(path: &Path, config: &HooksConfig) -> Result<Outcome, HookError> {
    let src = std::fs::read_to_string(path).map_err(|source| HookError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let info = route::read_config(path, &src, config).map_err(|source| HookError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if info.routes.is_empty() {
        return Ok(Outcome::Skipped);
    }

    let output = output_path(path, config);
    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir).map_err(|source| HookError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let text = HookWriter::new(&info, config).write();
    std::fs::write(&output, text).map_err(|source| HookError::Write {
        path: output.clone(),
        source,
    })?;

    Ok(Outcome::Written {
        output,
        routes: info.routes.len(),
    })
}

/// Generates hooks for every route config under `root`. A failure in one
/// config is logged and does not stop the others.
pub fn generate(root: &Path, config: &HooksConfig) -> GenerateSummary {
    let mut summary = GenerateSummary::default();
    let configs = discover(root, config);
    if configs.is_empty() {
        warn!("⚠️  no {} files found under {}", config.config_file_name, root.display());
    }

    for path in configs {
        match process_config(&path, config) {
            Ok(Outcome::Written { output, routes }) => {
                info!("✅ {} ({} hooks) -> {}", path.display(), routes, output.display());
                summary.written.push(output);
            }
            Ok(Outcome::Skipped) => {
                warn!("⚠️  no routes found in {}, skipping", path.display());
                summary.skipped.push(path);
            }
            Err(err) => {
                error!("❌ {}", err);
                summary.failed.push((path, err));
            }
        }
    }

    summary
}
