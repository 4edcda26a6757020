use anyhow::Context as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_LIBRARY_DIR: &str = "library";
const DEFAULT_YTDLP: &str = "yt-dlp";
const DEFAULT_BITRATE: &str = "192K";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 2;

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    /// Also register commands in this guild, for instant availability
    pub guild_id: Option<u64>,
    pub library_dir: PathBuf,
    pub ytdlp_path: PathBuf,
    pub audio_bitrate: String,
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let discord_token = var("DISCORD_TOKEN").context("Set DISCORD_TOKEN environment variable")?;

        let guild_id = var("GUILD_ID").and_then(|raw| match raw.trim().parse::<u64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Invalid GUILD_ID format: {}", raw);
                None
            }
        });

        let fetch_timeout_secs = parse_var(&var, "FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS)?;
        let max_concurrent_fetches =
            parse_var(&var, "MAX_CONCURRENT_FETCHES", DEFAULT_MAX_CONCURRENT_FETCHES)?;
        if fetch_timeout_secs == 0 || max_concurrent_fetches == 0 {
            anyhow::bail!("FETCH_TIMEOUT_SECS and MAX_CONCURRENT_FETCHES must be greater than 0");
        }

        Ok(Self {
            discord_token,
            guild_id,
            library_dir: var("LIBRARY_DIR")
                .unwrap_or_else(|| DEFAULT_LIBRARY_DIR.to_string())
                .into(),
            ytdlp_path: var("YTDLP_PATH")
                .unwrap_or_else(|| DEFAULT_YTDLP.to_string())
                .into(),
            audio_bitrate: var("AUDIO_BITRATE").unwrap_or_else(|| DEFAULT_BITRATE.to_string()),
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_concurrent_fetches,
        })
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn token_is_required() {
        let err = config(&[]).unwrap_err();
        assert!(err.to_string().contains("DISCORD_TOKEN"));
        assert!(config(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("DISCORD_TOKEN", "abc")]).unwrap();
        assert_eq!(config.discord_token, "abc");
        assert_eq!(config.guild_id, None);
        assert_eq!(config.library_dir, PathBuf::from("library"));
        assert_eq!(config.ytdlp_path, PathBuf::from("yt-dlp"));
        assert_eq!(config.audio_bitrate, "192K");
        assert_eq!(config.fetch_timeout, Duration::from_secs(300));
        assert_eq!(config.max_concurrent_fetches, 2);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("DISCORD_TOKEN", "abc"),
            ("GUILD_ID", "1234"),
            ("LIBRARY_DIR", "/srv/music"),
            ("FETCH_TIMEOUT_SECS", "60"),
            ("MAX_CONCURRENT_FETCHES", " 4 "),
        ])
        .unwrap();
        assert_eq!(config.guild_id, Some(1234));
        assert_eq!(config.library_dir, PathBuf::from("/srv/music"));
        assert_eq!(config.fetch_timeout, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_fetches, 4);
    }

    #[test]
    fn bad_numbers_fail_but_bad_guild_id_is_ignored() {
        let err = config(&[("DISCORD_TOKEN", "abc"), ("FETCH_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("FETCH_TIMEOUT_SECS"));

        assert!(config(&[("DISCORD_TOKEN", "abc"), ("MAX_CONCURRENT_FETCHES", "0")]).is_err());

        let config = config(&[("DISCORD_TOKEN", "abc"), ("GUILD_ID", "general")]).unwrap();
        assert_eq!(config.guild_id, None);
    }
}
