use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackmeshConfig {
    /// Base URL of the tracking service.
    pub server_url: Option<String>,
    /// Script name registered on the tracking service for API access.
    pub script_name: Option<String>,
    /// Name of the secret holding the API key for the script.
    pub api_key_secret: Option<String>,
    /// Remote field holding the project code (defaults to "code").
    pub project_code_field: Option<String>,
    /// How often (in seconds) services poll the tracking service.
    pub polling_frequency_secs: Option<u64>,
    /// Overrides for the remote schema metadata.
    pub schema: Option<SchemaConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Map of folder type -> parent-linking field; "project" marks the type
    /// as project-scoped.
    pub parent_fields: Option<HashMap<String, String>>,
    /// Record types whose pipeline steps are scoped by parent entity type.
    pub step_scoped_types: Option<Vec<String>>,
}

pub fn config_filename_candidates() -> [&'static str; 2] {
    [".trackmesh.toml", ".trackmeshrc"]
}

pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".trackmesh.toml")
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(profile) = std::env::var("USERPROFILE") {
        let trimmed = profile.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    None
}

pub fn resolve_trackmesh_home_dir() -> Option<PathBuf> {
    if let Ok(value) = std::env::var("TRACKMESH_HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    resolve_user_home_dir().map(|home| home.join(".trackmesh"))
}

pub fn global_config_path() -> Option<PathBuf> {
    resolve_trackmesh_home_dir().map(|home| home.join("config.toml"))
}

pub fn load_config(project_dir: &Path) -> Option<TrackmeshConfig> {
    for name in config_filename_candidates() {
        let path = project_dir.join(name);
        if path.is_file() {
            if let Ok(text) = fs::read_to_string(&path) {
                if let Ok(config) = toml::from_str::<TrackmeshConfig>(&text) {
                    return Some(config);
                }
            }
        }
    }
    None
}

pub fn load_global_config() -> Option<TrackmeshConfig> {
    let path = global_config_path()?;
    if !path.is_file() {
        return None;
    }
    let text = fs::read_to_string(path).ok()?;
    toml::from_str::<TrackmeshConfig>(&text).ok()
}

/// Project config wins over global config, then built-in defaults.
pub fn resolve_config(project_dir: &Path) -> TrackmeshConfig {
    if let Some(config) = load_config(project_dir) {
        return config;
    }
    load_global_config().unwrap_or_default()
}

pub fn resolve_project_code_field_with_source(project_dir: &Path) -> (String, &'static str) {
    if let Some(value) = load_config(project_dir).and_then(|config| config.project_code_field) {
        return (value, "project");
    }
    if let Some(value) = load_global_config().and_then(|config| config.project_code_field) {
        return (value, "global");
    }
    ("code".to_string(), "default")
}

pub fn resolve_project_code_field(project_dir: &Path) -> String {
    resolve_project_code_field_with_source(project_dir).0
}

pub fn resolve_polling_frequency_with_source(project_dir: &Path) -> (u64, &'static str) {
    if let Some(value) = load_config(project_dir).and_then(|config| config.polling_frequency_secs) {
        return (value, "project");
    }
    if let Some(value) = load_global_config().and_then(|config| config.polling_frequency_secs) {
        return (value, "global");
    }
    (10, "default")
}

pub fn resolve_polling_frequency(project_dir: &Path) -> u64 {
    resolve_polling_frequency_with_source(project_dir).0
}

pub fn write_config(project_dir: &Path, config: &TrackmeshConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path(project_dir);
    let body = toml::to_string_pretty(config)?;
    fs::write(&path, body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
        let _guard = crate::test_env::lock();
        f()
    }

    struct EnvGuard {
        trackmesh_home: Option<OsString>,
        home: Option<OsString>,
        userprofile: Option<OsString>,
    }

    impl EnvGuard {
        fn capture() -> Self {
            Self {
                trackmesh_home: std::env::var_os("TRACKMESH_HOME"),
                home: std::env::var_os("HOME"),
                userprofile: std::env::var_os("USERPROFILE"),
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = self.trackmesh_home.as_ref() {
                std::env::set_var("TRACKMESH_HOME", value);
            } else {
                std::env::remove_var("TRACKMESH_HOME");
            }

            if let Some(value) = self.home.as_ref() {
                std::env::set_var("HOME", value);
            } else {
                std::env::remove_var("HOME");
            }

            if let Some(value) = self.userprofile.as_ref() {
                std::env::set_var("USERPROFILE", value);
            } else {
                std::env::remove_var("USERPROFILE");
            }
        }
    }

    #[test]
    fn write_and_read_config() {
        let temp = TempDir::new().expect("tempdir");
        let config = TrackmeshConfig {
            server_url: Some("https://tracking.example.com".to_string()),
            script_name: Some("trackmesh-service".to_string()),
            api_key_secret: Some("trackmesh_api_key".to_string()),
            project_code_field: Some("sg_code".to_string()),
            polling_frequency_secs: Some(30),
            schema: None,
        };
        write_config(temp.path(), &config).expect("write config");
        let loaded = load_config(temp.path()).expect("load config");
        assert_eq!(
            loaded.server_url.as_deref(),
            Some("https://tracking.example.com")
        );
        assert_eq!(loaded.project_code_field.as_deref(), Some("sg_code"));
        assert_eq!(loaded.polling_frequency_secs, Some(30));
    }

    #[test]
    fn schema_overrides_round_trip() {
        let temp = TempDir::new().expect("tempdir");
        let mut parent_fields = HashMap::new();
        parent_fields.insert("Level".to_string(), "world".to_string());
        let config = TrackmeshConfig {
            schema: Some(SchemaConfig {
                parent_fields: Some(parent_fields),
                step_scoped_types: Some(vec!["Level".to_string()]),
            }),
            ..TrackmeshConfig::default()
        };
        write_config(temp.path(), &config).expect("write config");
        let loaded = load_config(temp.path()).expect("load config");
        let schema = loaded.schema.expect("schema");
        assert_eq!(
            schema.parent_fields.expect("parent fields").get("Level"),
            Some(&"world".to_string())
        );
        assert_eq!(schema.step_scoped_types, Some(vec!["Level".to_string()]));
    }

    #[test]
    fn resolve_project_code_field_prefers_project_over_global_then_default() {
        with_env_lock(|| {
            let _env = EnvGuard::capture();
            let project = TempDir::new().expect("project tempdir");
            let home = TempDir::new().expect("home tempdir");
            std::env::set_var("TRACKMESH_HOME", home.path());

            // No config at all -> built-in default.
            let (value, source) = resolve_project_code_field_with_source(project.path());
            assert_eq!(value, "code");
            assert_eq!(source, "default");

            // Global config applies when project config is absent.
            std::fs::write(
                home.path().join("config.toml"),
                "project_code_field = \"sg_code\"\n",
            )
            .expect("global config");
            let (value, source) = resolve_project_code_field_with_source(project.path());
            assert_eq!(value, "sg_code");
            assert_eq!(source, "global");

            // Project config overrides global config.
            std::fs::write(
                project.path().join(".trackmesh.toml"),
                "project_code_field = \"short_code\"\n",
            )
            .expect("project config");
            let (value, source) = resolve_project_code_field_with_source(project.path());
            assert_eq!(value, "short_code");
            assert_eq!(source, "project");
        });
    }

    #[test]
    fn resolve_polling_frequency_defaults_to_ten() {
        with_env_lock(|| {
            let _env = EnvGuard::capture();
            let project = TempDir::new().expect("project tempdir");
            let home = TempDir::new().expect("home tempdir");
            std::env::set_var("TRACKMESH_HOME", home.path());

            let (value, source) = resolve_polling_frequency_with_source(project.path());
            assert_eq!(value, 10);
            assert_eq!(source, "default");

            std::fs::write(
                project.path().join(".trackmesh.toml"),
                "polling_frequency_secs = 60\n",
            )
            .expect("project config");
            let (value, source) = resolve_polling_frequency_with_source(project.path());
            assert_eq!(value, 60);
            assert_eq!(source, "project");
        });
    }
}
