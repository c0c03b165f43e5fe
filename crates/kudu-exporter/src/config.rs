//! Command line and config file handling.
//!
//! Every setting can come from a flag or from the optional TOML file named
//! by `--config`; a flag always wins over the file, and the file wins over
//! the built-in default. The merged result is validated once at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use axum::http::Uri;
use clap::Parser;
use serde::Deserialize;

use kudu_exporter_metrics::FilterPaths;
use kudu_exporter_metrics::registry::DEFAULT_PREFIX;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RELOAD_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PORT: u16 = 9098;
pub const DEFAULT_MAX_FETCH_FAILURES: u32 = 5;

#[derive(Debug, Parser)]
#[command(
    name = "kudu-exporter",
    version,
    about = "Republishes a Kudu server's /metrics document as Prometheus gauges"
)]
pub struct Cli {
    /// Upstream metrics URL, e.g. http://kudu-tserver:8050/metrics.
    #[arg(long)]
    pub url: Option<String>,

    /// Poll interval [default: 1s].
    #[arg(long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// How often the filter files are checked for changes [default: 10s].
    #[arg(long, value_parser = parse_duration)]
    pub reload_interval: Option<Duration>,

    /// Port to serve /metrics on [default: 9098].
    #[arg(long)]
    pub port: Option<u16>,

    /// File listing the only metric names to publish.
    #[arg(long)]
    pub include_file: Option<PathBuf>,

    /// File listing metric names to drop.
    #[arg(long)]
    pub exclude_file: Option<PathBuf>,

    /// Consecutive failed fetches before the exporter exits [default: 5].
    #[arg(long)]
    pub max_fetch_failures: Option<u32>,

    /// Upstream request timeout [default: 10s].
    #[arg(long, value_parser = parse_duration)]
    pub fetch_timeout: Option<Duration>,

    /// Prefix for published metric names [default: kudu_].
    #[arg(long)]
    pub prefix: Option<String>,

    /// Log as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Optional TOML file with the same keys as the flags.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// The `--config` file. Durations use the same syntax as the flags.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub url: Option<String>,
    pub interval: Option<String>,
    pub reload_interval: Option<String>,
    pub port: Option<u16>,
    pub include_file: Option<PathBuf>,
    pub exclude_file: Option<PathBuf>,
    pub max_fetch_failures: Option<u32>,
    pub fetch_timeout: Option<String>,
    pub prefix: Option<String>,
    pub log_json: Option<bool>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: FileConfig =
            toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }
}

/// Fully resolved exporter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: String,
    pub interval: Duration,
    pub reload_interval: Duration,
    pub port: u16,
    pub filters: FilterPaths,
    pub max_fetch_failures: u32,
    pub fetch_timeout: Duration,
    pub prefix: String,
    pub log_json: bool,
}

impl Config {
    /// Read the config file named by `cli` (if any), merge and validate.
    pub fn load(cli: Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        let config = Self::merge(cli, file)?;
        config.validate()?;
        Ok(config)
    }

    /// Layer flags over the file over the defaults. Does not validate.
    pub fn merge(cli: Cli, file: FileConfig) -> anyhow::Result<Self> {
        let file_duration = |value: Option<String>, key: &str| -> anyhow::Result<Option<Duration>> {
            value
                .map(|v| parse_duration(&v).map_err(|e| anyhow::anyhow!("config key `{key}`: {e}")))
                .transpose()
        };

        let interval = file_duration(file.interval, "interval")?;
        let reload_interval = file_duration(file.reload_interval, "reload_interval")?;
        let fetch_timeout = file_duration(file.fetch_timeout, "fetch_timeout")?;

        let url = cli
            .url
            .or(file.url)
            .context("no upstream url: pass --url or set `url` in the config file")?;

        Ok(Self {
            url,
            interval: cli.interval.or(interval).unwrap_or(DEFAULT_INTERVAL),
            reload_interval: cli
                .reload_interval
                .or(reload_interval)
                .unwrap_or(DEFAULT_RELOAD_INTERVAL),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            filters: FilterPaths {
                include: cli.include_file.or(file.include_file),
                exclude: cli.exclude_file.or(file.exclude_file),
            },
            max_fetch_failures: cli
                .max_fetch_failures
                .or(file.max_fetch_failures)
                .unwrap_or(DEFAULT_MAX_FETCH_FAILURES),
            fetch_timeout: cli
                .fetch_timeout
                .or(fetch_timeout)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT),
            prefix: cli
                .prefix
                .or(file.prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            log_json: cli.log_json || file.log_json.unwrap_or(false),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let uri: Uri = self
            .url
            .parse()
            .with_context(|| format!("invalid upstream url {}", self.url))?;
        if uri.scheme_str() != Some("http") {
            bail!("upstream url {} must use http://", self.url);
        }
        if uri.authority().is_none() {
            bail!("upstream url {} has no host", self.url);
        }

        if self.interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }
        if self.reload_interval.is_zero() {
            bail!("reload interval must be greater than zero");
        }
        if self.fetch_timeout.is_zero() {
            bail!("fetch timeout must be greater than zero");
        }

        for path in self.filters.iter() {
            if !path.is_file() {
                bail!("filter file {} does not exist", path.display());
            }
        }

        if !is_metric_prefix(&self.prefix) {
            bail!("prefix {:?} is not a valid metric name prefix", self.prefix);
        }
        Ok(())
    }
}

/// Parse a duration like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let parsed = if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| format!("invalid duration {s:?}, expected e.g. 500ms, 5s or 1m"))
}

fn is_metric_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    match chars.next() {
        None => true,
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_' || first == ':')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kudu-exporter").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("5s"), Ok(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Ok(Duration::from_secs(10)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn defaults_apply() {
        let config = Config::merge(cli(&["--url", "http://kudu:8050/metrics"]), FileConfig::default()).unwrap();
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert_eq!(config.reload_interval, DEFAULT_RELOAD_INTERVAL);
        assert_eq!(config.port, 9098);
        assert_eq!(config.max_fetch_failures, 5);
        assert_eq!(config.prefix, "kudu_");
        assert!(config.filters.is_empty());
        assert!(!config.log_json);
        config.validate().unwrap();
    }

    #[test]
    fn flags_override_file() {
        let file: FileConfig = toml::from_str(
            r#"
            url = "http://from-file:8050/metrics"
            interval = "30s"
            port = 9100
            prefix = "tserver_"
            log_json = true
            "#,
        )
        .unwrap();

        let config = Config::merge(cli(&["--interval", "250ms", "--port", "9200"]), file).unwrap();
        assert_eq!(config.url, "http://from-file:8050/metrics");
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.port, 9200);
        assert_eq!(config.prefix, "tserver_");
        assert!(config.log_json);
    }

    #[test]
    fn missing_url_is_an_error() {
        let err = Config::merge(cli(&[]), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--url"));
    }

    #[test]
    fn bad_file_duration_names_the_key() {
        let file = FileConfig {
            url: Some("http://kudu/metrics".to_string()),
            reload_interval: Some("often".to_string()),
            ..FileConfig::default()
        };
        let err = Config::merge(cli(&[]), file).unwrap_err();
        assert!(err.to_string().contains("reload_interval"));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("poll_every = \"1s\"").is_err());
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let base = Config::merge(cli(&["--url", "http://kudu:8050/metrics"]), FileConfig::default()).unwrap();

        let https = Config {
            url: "https://kudu:8050/metrics".to_string(),
            ..base.clone()
        };
        assert!(https.validate().is_err());

        let zero = Config {
            interval: Duration::ZERO,
            ..base.clone()
        };
        assert!(zero.validate().is_err());

        let missing_filter = Config {
            filters: FilterPaths {
                include: Some(PathBuf::from("/definitely/not/here.txt")),
                exclude: None,
            },
            ..base.clone()
        };
        assert!(missing_filter.validate().unwrap_err().to_string().contains("here.txt"));

        let bad_prefix = Config {
            prefix: "9kudu-".to_string(),
            ..base
        };
        assert!(bad_prefix.validate().is_err());
    }

    #[test]
    fn load_reads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let include = dir.path().join("include.txt");
        std::fs::write(&include, "rows_inserted\n").unwrap();
        let path = dir.path().join("exporter.toml");
        std::fs::write(
            &path,
            format!(
                "url = \"http://kudu:8050/metrics\"\ninclude_file = {:?}\nmax_fetch_failures = 2\n",
                include.display().to_string()
            ),
        )
        .unwrap();

        let config = Config::load(cli(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.max_fetch_failures, 2);
        assert_eq!(config.filters.include.as_deref(), Some(include.as_path()));
    }
}
