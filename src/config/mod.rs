use crate::models::{
    DEFAULT_MANIFEST, DEFAULT_RESOURCE_ROOT, DEFAULT_SOURCE_ROOT, DEFAULT_TARGET,
    PreprocessConfig, PreprocessorSettings, RunContext,
};
use crate::services::ConfigError;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

/// Settings file looked up in the project directory
pub const CONFIG_FILE_NAME: &str = "preprocessor.yaml";

/// Configuration manager for loading, saving and resolving `preprocessor.yaml`.
///
/// Relative paths in the settings are taken relative to the project
/// directory, which is made absolute once when the manager is created.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    project_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a manager for `project_dir`, reading `preprocessor.yaml` inside it.
    pub fn new<P: AsRef<Utf8Path>>(project_dir: P) -> Result<Self> {
        let project_dir = absolutize(project_dir.as_ref())?;
        Ok(Self {
            config_path: project_dir.join(CONFIG_FILE_NAME),
            project_dir,
        })
    }

    /// Create a manager that reads its settings from an explicit file.
    ///
    /// A relative `config_path` is taken relative to `project_dir`.
    pub fn with_config_path<P, C>(project_dir: P, config_path: C) -> Result<Self>
    where
        P: AsRef<Utf8Path>,
        C: AsRef<Utf8Path>,
    {
        let project_dir = absolutize(project_dir.as_ref())?;
        Ok(Self {
            config_path: join_absolute(&project_dir, config_path.as_ref()),
            project_dir,
        })
    }

    pub fn project_dir(&self) -> &Utf8Path {
        &self.project_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    /// Load the settings file.
    ///
    /// # Returns
    /// The loaded settings, or defaults if the file doesn't exist
    pub fn load_settings(&self) -> Result<PreprocessorSettings> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.config_path
            );
            return Ok(PreprocessorSettings::default());
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read settings: {}", self.config_path))?;

        let settings: PreprocessorSettings = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.config_path))?;

        tracing::info!(
            "Loaded settings from {} ({} replacement tokens)",
            self.config_path,
            settings.replace.len()
        );
        if settings.replace.is_empty() {
            tracing::warn!("No replacement tokens configured; eligible files are copied as is");
        }
        Ok(settings)
    }

    /// Save the settings file, creating its directory if needed.
    pub fn save_settings(&self, settings: &PreprocessorSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create settings directory: {}", parent))?;
        }

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.config_path))?;

        tracing::info!("Saved settings to {}", self.config_path);
        Ok(())
    }

    /// Write default settings unless a settings file already exists.
    ///
    /// # Returns
    /// `true` if a new file was written
    pub fn init_settings(&self) -> Result<bool> {
        if self.config_path.exists() {
            tracing::info!("Settings already exist at {}", self.config_path);
            return Ok(false);
        }

        self.save_settings(&PreprocessorSettings::default())?;
        Ok(true)
    }

    /// Resolve settings into the immutable inputs of one pass.
    ///
    /// Defaults for unset roots, target and manifest are applied here and only
    /// here; `settings` itself is left untouched so a later edit to it is seen
    /// by the next resolve. Fails before any file is touched if the token map
    /// or extensions are malformed or the pool size is zero.
    pub fn resolve(&self, settings: &PreprocessorSettings) -> Result<RunContext, ConfigError> {
        if settings.pool_size == 0 {
            return Err(ConfigError::InvalidPoolSize);
        }

        let config = PreprocessConfig::new(
            &settings.extensions,
            settings.replacement_pairs(),
            settings.verbose,
        )?;

        let sources = self.roots_or_default(&settings.sources, DEFAULT_SOURCE_ROOT);
        let resources = self.roots_or_default(&settings.resources, DEFAULT_RESOURCE_ROOT);
        let target = join_absolute(
            &self.project_dir,
            Utf8Path::new(settings.target.as_deref().unwrap_or(DEFAULT_TARGET)),
        );
        let manifest_name = settings
            .manifest
            .clone()
            .unwrap_or_else(|| DEFAULT_MANIFEST.to_string());

        Ok(RunContext {
            sources,
            resources,
            target,
            manifest_name,
            pool_size: settings.pool_size,
            timeout: Duration::from_secs(settings.timeout_secs),
            config: Arc::new(config),
        })
    }

    fn roots_or_default(&self, roots: &[String], default: &str) -> Vec<Utf8PathBuf> {
        if roots.is_empty() {
            return vec![join_absolute(&self.project_dir, Utf8Path::new(default))];
        }

        roots
            .iter()
            .map(|root| join_absolute(&self.project_dir, Utf8Path::new(root)))
            .collect()
    }
}

fn join_absolute(base: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn absolutize(path: &Utf8Path) -> Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let cwd = Utf8PathBuf::try_from(cwd).context("Current directory is not valid UTF-8")?;
    Ok(cwd.join(path))
}
