use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use std::path::PathBuf;

const PLACEHOLDER_URL: &str = "https://your-project.supabase.co";
const PLACEHOLDER_KEY: &str = "your-anon-key";

pub struct Config {
    pub db_path: PathBuf,
    pub remote: Option<RemoteConfig>,
    /// Identity to plan for; required in remote mode.
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: String,
    pub access_token: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "mealplan").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let lookup = |key: &str| std::env::var(key).ok();
        Ok(Config {
            db_path: data_dir.join("mealplan.db"),
            remote: RemoteConfig::from_lookup(lookup)?,
            user: non_empty(lookup("MEALPLAN_USER")),
        })
    }
}

impl RemoteConfig {
    /// Read the remote settings through `lookup`. `None` means local mode.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let url = non_empty(lookup("MEALPLAN_REMOTE_URL"));
        let api_key = non_empty(lookup("MEALPLAN_REMOTE_KEY"));
        let (url, api_key) = match (url, api_key) {
            (None, None) => return Ok(None),
            (Some(_), None) => bail!("MEALPLAN_REMOTE_URL is set but MEALPLAN_REMOTE_KEY is missing"),
            (None, Some(_)) => bail!("MEALPLAN_REMOTE_KEY is set but MEALPLAN_REMOTE_URL is missing"),
            (Some(url), Some(key)) => (url, key),
        };
        if url.trim_end_matches('/') == PLACEHOLDER_URL || api_key == PLACEHOLDER_KEY {
            bail!("Remote store credentials are still the placeholder values; set real ones");
        }
        if !url.starts_with("https://") && !url.starts_with("http://") {
            bail!("MEALPLAN_REMOTE_URL must be an http(s) URL, got '{url}'");
        }
        Ok(Some(RemoteConfig {
            url,
            api_key,
            access_token: non_empty(lookup("MEALPLAN_ACCESS_TOKEN")),
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_local_mode_when_unset() {
        assert!(RemoteConfig::from_lookup(lookup(&[])).unwrap().is_none());
        assert!(
            RemoteConfig::from_lookup(lookup(&[("MEALPLAN_REMOTE_URL", "  ")]))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_remote_mode() {
        let remote = RemoteConfig::from_lookup(lookup(&[
            ("MEALPLAN_REMOTE_URL", "https://abc.supabase.co"),
            ("MEALPLAN_REMOTE_KEY", "anon"),
            ("MEALPLAN_ACCESS_TOKEN", "jwt"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(remote.url, "https://abc.supabase.co");
        assert_eq!(remote.api_key, "anon");
        assert_eq!(remote.access_token.as_deref(), Some("jwt"));
    }

    #[test]
    fn test_half_configured_is_an_error() {
        assert!(
            RemoteConfig::from_lookup(lookup(&[("MEALPLAN_REMOTE_URL", "https://abc.supabase.co")]))
                .is_err()
        );
        assert!(RemoteConfig::from_lookup(lookup(&[("MEALPLAN_REMOTE_KEY", "anon")])).is_err());
    }

    #[test]
    fn test_placeholders_rejected() {
        let err = RemoteConfig::from_lookup(lookup(&[
            ("MEALPLAN_REMOTE_URL", "https://your-project.supabase.co"),
            ("MEALPLAN_REMOTE_KEY", "anon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("placeholder"));
        assert!(
            RemoteConfig::from_lookup(lookup(&[
                ("MEALPLAN_REMOTE_URL", "https://abc.supabase.co"),
                ("MEALPLAN_REMOTE_KEY", "your-anon-key"),
            ]))
            .is_err()
        );
    }

    #[test]
    fn test_non_http_url_rejected() {
        assert!(
            RemoteConfig::from_lookup(lookup(&[
                ("MEALPLAN_REMOTE_URL", "abc.supabase.co"),
                ("MEALPLAN_REMOTE_KEY", "anon"),
            ]))
            .is_err()
        );
    }
}
