use std::fs;
use std::path::{Path, PathBuf};

use reefheat_core::{PipelineConfig, PipelineError};
use thiserror::Error;
use url::Url;

const DEFAULT_CONFIG_LOCATIONS: [&str; 2] = ["reefheat.toml", "config/reefheat.toml"];

pub const CONFIG_PATH_VAR: &str = "REEFHEAT_CONFIG";

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: PipelineConfig,
    /// File the config was read from; `None` when running on defaults.
    pub source: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    /// `.env`, then the config file, then `REEFHEAT_*` overrides from the process env.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_with(|key| std::env::var(key).ok())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same as [`ConfigLoader::load`] minus `.env`, reading variables through `lookup`.
    pub fn load_with<F>(&self, lookup: F) -> Result<ConfigLoad, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvOverrides::gather(&lookup);
        let (mut config, source) = match self.resolve_path(&lookup) {
            Some((path, explicit)) if !path.exists() => {
                if explicit {
                    return Err(ConfigLoadError::MissingConfig { path });
                }
                (PipelineConfig::default(), None)
            }
            Some((path, _)) => (read_config(&path)?, Some(path)),
            None => (PipelineConfig::default(), None),
        };

        env.apply(&mut config)?;
        config.validate()?;

        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded: false,
        })
    }

    /// Path to read plus whether the operator asked for it explicitly.
    fn resolve_path<F>(&self, lookup: &F) -> Option<(PathBuf, bool)>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = &self.options.config_path {
            return Some((path.clone(), true));
        }
        if let Some(path) = lookup(CONFIG_PATH_VAR).filter(|value| !value.trim().is_empty()) {
            return Some((PathBuf::from(path), true));
        }
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .map(|path| (path, false))
    }
}

fn read_config(path: &Path) -> Result<PipelineConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default)]
struct EnvOverrides {
    project: Option<String>,
    bucket: Option<String>,
    remote_url: Option<String>,
    warehouse_url: Option<String>,
    warehouse_table: Option<String>,
    poll_interval: Option<String>,
}

impl EnvOverrides {
    fn gather<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        Self {
            project: var("REEFHEAT_PROJECT"),
            bucket: var("REEFHEAT_BUCKET"),
            remote_url: var("REEFHEAT_REMOTE_URL"),
            warehouse_url: var("REEFHEAT_WAREHOUSE_URL"),
            warehouse_table: var("REEFHEAT_WAREHOUSE_TABLE"),
            poll_interval: var("REEFHEAT_POLL_INTERVAL"),
        }
    }

    fn apply(self, config: &mut PipelineConfig) -> Result<(), ConfigLoadError> {
        if let Some(project) = self.project {
            config.remote.project = project;
        }
        if let Some(bucket) = self.bucket {
            config.output.bucket = bucket;
        }
        if let Some(raw) = self.remote_url {
            config.remote.endpoint = parse_url("REEFHEAT_REMOTE_URL", &raw)?;
        }
        if let Some(raw) = self.warehouse_url {
            config.warehouse.endpoint = parse_url("REEFHEAT_WAREHOUSE_URL", &raw)?;
        }
        if let Some(table) = self.warehouse_table {
            config.warehouse.table = table;
        }
        if let Some(raw) = self.poll_interval {
            let interval = humantime::parse_duration(raw.trim()).map_err(|source| {
                ConfigLoadError::InvalidDuration {
                    var: "REEFHEAT_POLL_INTERVAL",
                    source,
                }
            })?;
            config.admission.poll_interval_ms = interval.as_millis() as u64;
        }
        Ok(())
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigLoadError> {
    Url::parse(raw.trim()).map_err(|source| ConfigLoadError::InvalidUrl { var, source })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {}", path.display())]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{var} is not a valid URL")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} is not a valid duration")]
    InvalidDuration {
        var: &'static str,
        #[source]
        source: humantime::DurationError,
    },
    #[error(transparent)]
    GuardRail(#[from] PipelineError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn loader_for(path: &Path) -> ConfigLoader {
        ConfigLoader::with_options(ConfigLoaderOptions {
            config_path: Some(path.to_path_buf()),
            env_file: None,
        })
    }

    #[test]
    fn file_values_are_layered_under_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reefheat.toml");
        fs::write(
            &path,
            r#"
[remote]
project = "from-file"

[batch]
batch_size = 40

[output]
bucket = "file-bucket"
"#,
        )
        .unwrap();

        let load = loader_for(&path)
            .load_with(env(&[
                ("REEFHEAT_BUCKET", "env-bucket"),
                ("REEFHEAT_POLL_INTERVAL", "90s"),
                ("REEFHEAT_REMOTE_URL", "https://compute.internal/"),
            ]))
            .unwrap();

        assert_eq!(load.source.as_deref(), Some(path.as_path()));
        assert_eq!(load.config.remote.project, "from-file");
        assert_eq!(load.config.output.bucket, "env-bucket");
        assert_eq!(load.config.batch.batch_size, 40);
        assert_eq!(load.config.admission.poll_interval(), Duration::from_secs(90));
        assert_eq!(load.config.remote.endpoint.as_str(), "https://compute.internal/");
        assert_eq!(load.config.stress.window_days, 84);
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader_for(&dir.path().join("absent.toml"))
            .load_with(env(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }

    #[test]
    fn env_named_config_path_must_exist_too() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = ConfigLoader::default()
            .load_with(env(&[(CONFIG_PATH_VAR, missing.to_str().unwrap())]))
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
    }

    #[test]
    fn bad_duration_names_the_variable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reefheat.toml");
        fs::write(&path, "").unwrap();
        let err = loader_for(&path)
            .load_with(env(&[("REEFHEAT_POLL_INTERVAL", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("REEFHEAT_POLL_INTERVAL"));
    }

    #[test]
    fn guard_rails_run_after_merging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reefheat.toml");
        fs::write(&path, "[batch]\nbatch_size = 0\n").unwrap();
        let err = loader_for(&path).load_with(env(&[])).unwrap_err();
        assert!(matches!(err, ConfigLoadError::GuardRail(_)));
    }

    #[test]
    fn zero_poll_interval_from_env_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reefheat.toml");
        fs::write(&path, "").unwrap();
        let err = loader_for(&path)
            .load_with(env(&[("REEFHEAT_POLL_INTERVAL", "0s")]))
            .unwrap_err();
        assert!(matches!(err, ConfigLoadError::GuardRail(_)));
    }
}
