use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use upwatch::{DEFAULT_PROBE_TIMEOUT, DEFAULT_TICK_INTERVAL, Service, ServiceKind};

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    ReadFailed(#[source] io::Error),
    #[error("failed to write config file: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub probes: ProbeConfig,
    /// Omitting the key means no services; the demo entries only appear in
    /// a freshly written default file.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between check cycles. Zero falls back to the engine default.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_secs: DEFAULT_TICK_INTERVAL.as_secs() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Per-probe timeout in seconds for the built-in HTTP and TCP handlers.
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self { timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub kind: ServiceKind,
    pub target: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slo_target: Option<String>,
}

fn default_interval_secs() -> u64 {
    30
}

impl ServiceEntry {
    /// Convert to an engine service definition; the store assigns the id on
    /// registration.
    pub fn to_service(&self) -> Service {
        let service = Service::new(&self.name, self.kind, &self.target, self.interval_secs);
        match &self.slo_target {
            Some(slo) => service.with_slo_target(slo),
            None => service,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/upwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("upwatch/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            probes: ProbeConfig::default(),
            services: vec![
                ServiceEntry {
                    name: "example-web".into(),
                    kind: ServiceKind::Http,
                    target: "https://example.com".into(),
                    interval_secs: 30,
                    slo_target: Some("99.9".into()),
                },
                ServiceEntry {
                    name: "cloudflare-dns".into(),
                    kind: ServiceKind::Tcp,
                    target: "1.1.1.1:53".into(),
                    interval_secs: 30,
                    slo_target: None,
                },
            ],
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Loaded configuration:")?;
        writeln!(f, "  Scheduler")?;
        writeln!(f, "    Tick interval: {}s", self.scheduler.tick_interval_secs)?;
        writeln!(f, "  Probes")?;
        writeln!(f, "    Timeout: {}s", self.probes.timeout_secs)?;
        writeln!(f, "  Services ({})", self.services.len())?;
        for svc in &self.services {
            writeln!(
                f,
                "    {} [{}] {} every {}s",
                svc.name, svc.kind, svc.target, svc.interval_secs
            )?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/upwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            tracing::info!(path = %config_path.display(), "wrote default configuration");
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        fs::write(path, config_str).map_err(Error::WriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::from_config(Some(&path)).unwrap();

        assert!(path.exists());
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.scheduler.tick_interval_secs, DEFAULT_TICK_INTERVAL.as_secs());
    }

    #[test]
    fn partial_file_is_filled_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[scheduler]\n\
             tick_interval_secs = 3\n\n\
             [[services]]\n\
             name = \"db\"\n\
             kind = \"tcp\"\n\
             target = \"127.0.0.1:5432\"\n",
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        assert_eq!(config.scheduler.tick_interval_secs, 3);
        assert_eq!(config.probes.timeout_secs, DEFAULT_PROBE_TIMEOUT.as_secs());
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].kind, ServiceKind::Tcp);
        assert_eq!(config.services[0].interval_secs, 30);
    }

    #[test]
    fn omitted_services_key_means_no_services() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[scheduler]\ntick_interval_secs = 3\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();

        // An existing file without a services table must not inherit the
        // demo fleet from the generated default.
        assert!(config.services.is_empty());
        assert_eq!(config.scheduler.tick_interval_secs, 3);
        assert_eq!(config.probes.timeout_secs, DEFAULT_PROBE_TIMEOUT.as_secs());
    }

    #[test]
    fn entries_convert_to_valid_services() {
        let entry = ServiceEntry {
            name: "web".into(),
            kind: ServiceKind::Http,
            target: "https://example.com".into(),
            interval_secs: 15,
            slo_target: Some("99.9".into()),
        };

        let service = entry.to_service();

        assert_eq!(service.id, 0);
        assert_eq!(service.interval_secs, 15);
        assert_eq!(service.slo_target.as_deref(), Some("99.9"));
        assert!(service.validate().is_ok());
    }

    #[test]
    fn non_toml_paths_get_the_toml_extension() {
        let normalized = normalize_toml_path(path::Path::new("upwatch.conf"));
        assert_eq!(normalized, path::PathBuf::from("upwatch.toml"));
    }
}
