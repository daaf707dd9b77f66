use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{resolve_trackmesh_home_dir, TrackmeshConfig};

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Credentials IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse credentials: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize credentials: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not resolve a home directory for credentials")]
    NoHome,
}

/// Local login stored for the tracking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

pub fn credentials_path() -> Option<PathBuf> {
    resolve_trackmesh_home_dir().map(|home| home.join("credentials.toml"))
}

pub fn save_login(username: &str, password: &str) -> Result<PathBuf, CredentialsError> {
    let path = credentials_path().ok_or(CredentialsError::NoHome)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let login = Login {
        username: username.to_string(),
        password: password.to_string(),
    };
    let body = toml::to_string_pretty(&login)?;
    fs::write(&path, body)?;
    Ok(path)
}

pub fn load_login() -> Option<Login> {
    let path = credentials_path()?;
    if !path.is_file() {
        return None;
    }
    let text = fs::read_to_string(path).ok()?;
    toml::from_str::<Login>(&text).ok()
}

pub fn clear_login() -> Result<(), CredentialsError> {
    let path = credentials_path().ok_or(CredentialsError::NoHome)?;
    if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Field-presence check for a usable session: a server URL plus either a
/// script name with its API key secret, or a stored user login.
pub fn check_login(config: &TrackmeshConfig, login: Option<&Login>) -> (bool, String) {
    let server = config
        .server_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if server.is_none() {
        return (false, "Missing server URL.".to_string());
    }

    let has_script = config
        .script_name
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .is_some()
        && config
            .api_key_secret
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .is_some();
    let has_login = login
        .map(|login| !login.username.trim().is_empty() && !login.password.trim().is_empty())
        .unwrap_or(false);

    if has_script || has_login {
        (true, "Login fields are complete.".to_string())
    } else {
        (false, "Missing a field.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_home<T>(f: impl FnOnce() -> T) -> T {
        let _guard = crate::test_env::lock();
        let previous = std::env::var_os("TRACKMESH_HOME");
        let home = TempDir::new().expect("home tempdir");
        std::env::set_var("TRACKMESH_HOME", home.path());
        let result = f();
        if let Some(value) = previous {
            std::env::set_var("TRACKMESH_HOME", value);
        } else {
            std::env::remove_var("TRACKMESH_HOME");
        }
        result
    }

    #[test]
    fn save_load_clear_round_trip() {
        with_home(|| {
            assert_eq!(load_login(), None);

            let path = save_login("artist", "hunter2").expect("save");
            assert!(path.is_file());

            let login = load_login().expect("login");
            assert_eq!(login.username, "artist");
            assert_eq!(login.password, "hunter2");

            clear_login().expect("clear");
            assert_eq!(load_login(), None);
        });
    }

    #[test]
    fn clear_without_stored_login_is_ok() {
        with_home(|| {
            clear_login().expect("clear");
        });
    }

    #[test]
    fn check_login_requires_server_url() {
        let config = TrackmeshConfig::default();
        let (ok, message) = check_login(&config, None);
        assert!(!ok);
        assert_eq!(message, "Missing server URL.");
    }

    #[test]
    fn check_login_accepts_script_credentials() {
        let config = TrackmeshConfig {
            server_url: Some("https://tracking.example.com".to_string()),
            script_name: Some("trackmesh-service".to_string()),
            api_key_secret: Some("trackmesh_api_key".to_string()),
            ..TrackmeshConfig::default()
        };
        let (ok, _) = check_login(&config, None);
        assert!(ok);
    }

    #[test]
    fn check_login_accepts_stored_login() {
        let config = TrackmeshConfig {
            server_url: Some("https://tracking.example.com".to_string()),
            ..TrackmeshConfig::default()
        };
        let login = Login {
            username: "artist".to_string(),
            password: "hunter2".to_string(),
        };
        let (ok, _) = check_login(&config, Some(&login));
        assert!(ok);

        let (ok, message) = check_login(&config, None);
        assert!(!ok);
        assert_eq!(message, "Missing a field.");
    }
}
