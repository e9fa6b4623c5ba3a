//! Credential loading.
//!
//! Credentials are stored as TOML:
//! - Linux and macOS: `~/.config/relpost/credentials.toml`
//! - Windows: `%APPDATA%/relpost/credentials.toml`
//!
//! The `RELPOST_LOGIN`, `RELPOST_PASSWORD`, and `RELPOST_API_KEY`
//! environment variables override individual fields.

use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use relpost_pipeline::Credentials;

/// On-disk credential file. Every field is optional so the environment can
/// fill in the rest.
#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    login: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
}

/// Loads credentials from the config file and the environment.
pub fn load() -> anyhow::Result<Credentials> {
    let path = config_path();
    let file: CredentialsFile = if path.exists() {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
    } else {
        CredentialsFile::default()
    };

    let login = std::env::var("RELPOST_LOGIN").ok().or(file.login);
    let password = std::env::var("RELPOST_PASSWORD").ok().or(file.password);
    let api_key = std::env::var("RELPOST_API_KEY").ok().or(file.api_key);

    match (login, password, api_key) {
        (Some(login), Some(password), Some(api_key)) => Ok(Credentials {
            login,
            password,
            api_key,
        }),
        _ => anyhow::bail!(
            "missing credentials: set login, password and api_key in {} or the RELPOST_* environment variables",
            path.display()
        ),
    }
}

/// Returns the platform-specific credential file path.
fn config_path() -> PathBuf {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home)
            .join(".config")
            .join("relpost")
            .join("credentials.toml")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("relpost").join("credentials.toml")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        PathBuf::from("/tmp/relpost/credentials.toml")
    }
}
