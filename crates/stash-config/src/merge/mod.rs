//! Configuration layering, fallback logic, and environment overrides

use camino::Utf8PathBuf;
use stash_core::error::StashError;
use std::collections::HashMap;
use tracing::debug;

use crate::resolve::StoreConfig;
use crate::toml::{StashToml, StoreSection};
use crate::ConfigResult;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "stash.toml";

/// Prefix of recognised environment variables
pub const ENV_PREFIX: &str = "STASH_";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
    /// Home directory override, mostly for tests
    home: Option<Utf8PathBuf>,
}

/// Configuration source tracking
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Global config file
    Global(Utf8PathBuf),
    /// Project stash.toml file
    Project(Utf8PathBuf),
    /// Environment variable
    Environment(String),
    /// CLI flag
    CommandLine,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd, home: None }
    }

    /// Use `home` instead of the user's home directory
    pub fn with_home(mut self, home: Utf8PathBuf) -> Self {
        self.home = Some(home);
        self
    }

    /// Find stash.toml in the working directory or any parent
    pub fn find_project_config(&self) -> Option<Utf8PathBuf> {
        let mut current = Some(self.cwd.as_path());
        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }
            current = dir.parent();
        }
        None
    }

    /// Load the project configuration, if any
    pub async fn load_project_config(&self) -> ConfigResult<Option<(StashToml, ConfigSource)>> {
        match self.find_project_config() {
            Some(path) => {
                let config = crate::toml::load_from_file(&path).await?;
                debug!(path = %path, "loaded project configuration");
                Ok(Some((config, ConfigSource::Project(path))))
            }
            None => Ok(None),
        }
    }

    /// The stash home directory (~/.stash)
    pub fn stash_home(&self) -> ConfigResult<Utf8PathBuf> {
        let home = match &self.home {
            Some(home) => home.clone(),
            None => {
                let home_dir = dirs::home_dir().ok_or_else(|| StashError::ConfigValidation {
                    field: "home_dir".to_string(),
                    reason: "Could not determine home directory".to_string(),
                })?;
                Utf8PathBuf::try_from(home_dir).map_err(|e| StashError::ConfigValidation {
                    field: "home_dir".to_string(),
                    reason: format!("Invalid home directory path: {}", e),
                })?
            }
        };
        Ok(home.join(".stash"))
    }

    /// Load global configuration from ~/.stash/config.toml
    pub async fn load_global_config(&self) -> ConfigResult<Option<(StashToml, ConfigSource)>> {
        let global_config_path = self.stash_home()?.join("config.toml");
        if global_config_path.exists() {
            let config = crate::toml::load_from_file(&global_config_path).await?;
            debug!(path = %global_config_path, "loaded global configuration");
            Ok(Some((config, ConfigSource::Global(global_config_path))))
        } else {
            Ok(None)
        }
    }

    /// Load every layer and resolve a store configuration.
    ///
    /// Precedence, lowest first: global file, project file, environment,
    /// CLI overrides. The disk backend defaults to `~/.stash/cache`.
    pub async fn load(&self, cli_overrides: &HashMap<String, String>) -> ConfigResult<StoreConfig> {
        let global = self.load_global_config().await?.map(|(c, _)| c);
        let project = self.load_project_config().await?.map(|(c, _)| c);
        let env_overrides = ConfigLayering::collect_env_overrides();

        let merged = ConfigLayering::merge_configs(global, project, &env_overrides, cli_overrides)?;
        let default_dir = self.stash_home()?.join("cache");
        StoreConfig::from_section(merged, Some(&default_dir))
    }
}

/// Configuration layering and merging
pub struct ConfigLayering;

impl ConfigLayering {
    /// Merge multiple configuration layers into one `[store]` section
    pub fn merge_configs(
        global_config: Option<StashToml>,
        project_config: Option<StashToml>,
        env_overrides: &HashMap<String, String>,
        cli_overrides: &HashMap<String, String>,
    ) -> ConfigResult<StoreSection> {
        let global = global_config.map(|c| c.store).unwrap_or_default();
        let mut merged = project_config
            .map(|c| c.store)
            .unwrap_or_default()
            .layered_over(global);

        // Apply environment variable overrides
        for (key, value) in env_overrides {
            if let Some(field) = key.strip_prefix(ENV_PREFIX) {
                Self::apply_override(&mut merged, &field.to_ascii_lowercase(), value, key)?;
            }
        }

        // Apply CLI flag overrides (highest priority)
        for (key, value) in cli_overrides {
            Self::apply_override(&mut merged, key, value, key)?;
        }

        Ok(merged)
    }

    fn apply_override(
        section: &mut StoreSection,
        field: &str,
        value: &str,
        origin: &str,
    ) -> ConfigResult<()> {
        match field.replace('-', "_").as_str() {
            "backend" => section.backend = Some(value.parse()?),
            "dir" => section.dir = Some(Utf8PathBuf::from(value)),
            "digest_function" => section.digest_function = Some(value.parse()?),
            "chunk_size" => {
                let size = value.parse().map_err(|e| StashError::ConfigValidation {
                    field: origin.to_string(),
                    reason: format!("Invalid chunk size '{}': {}", value, e),
                })?;
                section.chunk_size = Some(size);
            }
            _ => {
                // Unknown override, ignore
            }
        }
        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::BackendConfig;
    use crate::toml::BackendKind;
    use stash_core::DigestFunction;
    use tempfile::TempDir;

    fn utf8_temp_dir(temp_dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_find_project_config_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = utf8_temp_dir(&temp_dir);
        tokio::fs::write(root.join(CONFIG_FILE_NAME), "[store]\nbackend = \"memory\"\n")
            .await
            .unwrap();
        let nested = root.join("a").join("b");
        tokio::fs::create_dir_all(&nested).await.unwrap();

        let loader = ConfigLoader::new(nested);
        assert_eq!(loader.find_project_config(), Some(root.join(CONFIG_FILE_NAME)));

        let (config, source) = loader.load_project_config().await.unwrap().unwrap();
        assert_eq!(config.store.backend, Some(BackendKind::Memory));
        assert!(matches!(source, ConfigSource::Project(_)));
    }

    #[tokio::test]
    async fn test_load_defaults_without_files() {
        let temp_dir = TempDir::new().unwrap();
        let root = utf8_temp_dir(&temp_dir);
        let loader = ConfigLoader::new(root.join("project")).with_home(root.clone());

        let config = loader.load(&HashMap::new()).await.unwrap();
        if std::env::var("STASH_BACKEND").is_err() && std::env::var("STASH_DIR").is_err() {
            assert_eq!(
                config.backend,
                BackendConfig::Disk {
                    root: root.join(".stash").join("cache")
                }
            );
        }
    }

    #[tokio::test]
    async fn test_global_config_is_loaded() {
        let temp_dir = TempDir::new().unwrap();
        let root = utf8_temp_dir(&temp_dir);
        tokio::fs::create_dir_all(root.join(".stash")).await.unwrap();
        tokio::fs::write(
            root.join(".stash").join("config.toml"),
            "[store]\ndigest-function = \"blake3\"\n",
        )
        .await
        .unwrap();

        let loader = ConfigLoader::new(root.join("elsewhere")).with_home(root.clone());
        let (config, source) = loader.load_global_config().await.unwrap().unwrap();
        assert_eq!(config.store.digest_function, Some(DigestFunction::Blake3));
        assert!(matches!(source, ConfigSource::Global(_)));
    }

    #[test]
    fn test_merge_precedence() {
        let global = StashToml {
            store: StoreSection {
                backend: Some(BackendKind::Disk),
                dir: Some(Utf8PathBuf::from("/global")),
                chunk_size: Some(1024),
                ..Default::default()
            },
        };
        let project = StashToml {
            store: StoreSection {
                dir: Some(Utf8PathBuf::from("/project")),
                ..Default::default()
            },
        };
        let env: HashMap<String, String> =
            [("STASH_DIGEST_FUNCTION".to_string(), "blake3".to_string())].into();
        let cli: HashMap<String, String> =
            [("chunk-size".to_string(), "2048".to_string())].into();

        let merged =
            ConfigLayering::merge_configs(Some(global), Some(project), &env, &cli).unwrap();
        assert_eq!(merged.backend, Some(BackendKind::Disk));
        assert_eq!(merged.dir, Some(Utf8PathBuf::from("/project")));
        assert_eq!(merged.digest_function, Some(DigestFunction::Blake3));
        assert_eq!(merged.chunk_size, Some(2048));
    }

    #[test]
    fn test_invalid_env_override() {
        let env: HashMap<String, String> =
            [("STASH_CHUNK_SIZE".to_string(), "lots".to_string())].into();
        let err = ConfigLayering::merge_configs(None, None, &env, &HashMap::new()).unwrap_err();
        assert!(matches!(err, StashError::ConfigValidation { ref field, .. } if field == "STASH_CHUNK_SIZE"));
    }

    #[test]
    fn test_unknown_override_ignored() {
        let cli: HashMap<String, String> = [("colour".to_string(), "blue".to_string())].into();
        let merged = ConfigLayering::merge_configs(None, None, &HashMap::new(), &cli).unwrap();
        assert_eq!(merged, StoreSection::default());
    }
}
