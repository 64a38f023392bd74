use anyhow::{Context, Result, bail};
use pinecone::backend::http::{DEFAULT_API_BASE, DEFAULT_API_VERSION};
use reconcile::PollConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("pinestate"))
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

// ============================================================================
// Provider Config
// ============================================================================

/// Settings for talking to Pinecone, from `~/.config/pinestate/config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Control plane host (indexes, collections)
    pub control_url: String,
    /// Admin API host (projects, API keys)
    pub admin_url: String,
    /// Sent as `X-Pinecone-API-Version`
    pub api_version: String,
    /// Instances reconciled concurrently by `apply`
    pub jobs: usize,
    pub poll: PollSettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            control_url: DEFAULT_API_BASE.to_string(),
            admin_url: DEFAULT_API_BASE.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            jobs: 4,
            poll: PollSettings::default(),
        }
    }
}

/// Backoff between readiness checks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    /// e.g. "2s"
    pub initial_delay: String,
    pub backoff_factor: f64,
    /// e.g. "15s"
    pub max_delay: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            initial_delay: "2s".to_string(),
            backoff_factor: 1.5,
            max_delay: "15s".to_string(),
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(&self) -> Result<PollConfig> {
        let initial = parse_duration(&self.initial_delay)
            .with_context(|| format!("Invalid poll.initial_delay '{}'", self.initial_delay))?;
        let max = parse_duration(&self.max_delay)
            .with_context(|| format!("Invalid poll.max_delay '{}'", self.max_delay))?;
        if self.backoff_factor < 1.0 {
            bail!(
                "poll.backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            );
        }
        Ok(PollConfig::new(initial, self.backoff_factor, max))
    }
}

impl ProviderConfig {
    /// Load config.toml, or use defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No provider config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid provider config: {}", path.display()))?;
        if config.jobs == 0 {
            bail!("jobs must be at least 1 in {}", path.display());
        }
        Ok(config)
    }
}

// ============================================================================
// Durations
// ============================================================================

/// Parse a human duration such as `"90s"`, `"10m"`, `"1h30m"` or `"500ms"`.
///
/// A bare number is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        bail!("empty duration");
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            bail!("expected a number in '{input}'");
        }
        let value: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("number too large in '{input}'"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "" => bail!("missing unit after {value} in '{input}'"),
            other => bail!("unknown unit '{other}' in '{input}' (use ms, s, m or h)"),
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .with_context(|| format!("duration too large: '{input}'"))?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10").is_ok());
        assert!(parse_duration("10x").unwrap_err().to_string().contains("unknown unit"));
        assert!(parse_duration("1h30").unwrap_err().to_string().contains("missing unit"));
    }

    #[test]
    fn test_parse_duration_overflow() {
        let err = parse_duration("5124095576030432h").unwrap_err();
        assert!(err.to_string().contains("too large"), "{err}");
        let err = parse_duration("18446744073709551615s18446744073709551615s").unwrap_err();
        assert!(err.to_string().contains("too large"), "{err}");
        assert!(parse_duration("99999999999999999999s").is_err());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ProviderConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.control_url, "https://api.pinecone.io");
    }

    #[test]
    fn test_partial_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
control_url = "http://localhost:5080"
jobs = 8

[poll]
initial_delay = "500ms"
"#,
        )
        .unwrap();
        let config = ProviderConfig::load_from(&path).unwrap();
        assert_eq!(config.jobs, 8);
        assert_eq!(config.admin_url, "https://api.pinecone.io");

        let poll = config.poll.to_poll_config().unwrap();
        assert_eq!(poll.initial_delay, Duration::from_millis(500));
        assert_eq!(poll.max_delay, Duration::from_secs(15));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "jobs = 0\n").unwrap();
        assert!(ProviderConfig::load_from(&path).is_err());
    }
}
