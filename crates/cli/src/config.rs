//! Configuration file resolution for the CLI

use anyhow::{Context, Result};
use glove_lib::PipelineConfig;
use std::path::{Path, PathBuf};

/// Pick the pipeline configuration file.
///
/// An explicit path (from `--config` or `GLOVE_CONFIG`) must exist. Otherwise
/// `~/.config/glove/config.toml` is used when present, and built-in defaults
/// when it is not.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            anyhow::bail!("Config file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }

    Ok(default_config_path().filter(|path| path.exists()))
}

/// Load the pipeline configuration, layering `GLOVE_*` environment overrides
pub fn load_pipeline_config(explicit: Option<&Path>) -> Result<PipelineConfig> {
    let path = resolve_config_path(explicit)?;
    PipelineConfig::load(path.as_deref()).with_context(|| match &path {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config from environment".to_string(),
    })
}

fn default_config_path() -> Option<PathBuf> {
    dirs_next::home_dir().map(|home| home.join(".config").join("glove").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_path_must_exist() {
        let missing = Path::new("/definitely/not/here/config.toml");
        assert!(resolve_config_path(Some(missing)).is_err());
    }

    #[test]
    fn test_explicit_path_is_loaded() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[collection]\nnum_reps = 12").unwrap();

        let resolved = resolve_config_path(Some(file.path())).unwrap();
        assert_eq!(resolved.as_deref(), Some(file.path()));

        let config = load_pipeline_config(Some(file.path())).unwrap();
        assert_eq!(config.collection.num_reps, 12);
    }
}
