use anyhow::{anyhow, Result};
use clap::Parser;
use lib_common::actuators::{ColorOverrides, ColorTables, Credentials};
use lib_common::ingestors::{FeedKind, FeedSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "flags.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Race flag monitor: mirrors live race status on a smart bulb", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "FLAGS_PORT", help = "Port of the control API.")]
    pub port: Option<u16>,

    #[clap(long, env = "FLAGS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FLAGS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FLAGS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FLAGS_FEED", help = "Feed to follow at startup (f1, motogp, nascar).")]
    pub feed: Option<String>,

    #[clap(long, env = "KASA_IP", help = "Address of the Kasa bulb, host or host:port.")]
    pub kasa_ip: Option<String>,

    #[clap(long, env = "KASA_USERNAME", help = "Kasa account user name.")]
    pub kasa_username: Option<String>,

    #[clap(long, env = "KASA_PASSWORD", help = "Kasa account password.")]
    pub kasa_password: Option<String>,

    #[clap(long, env = "NASCAR_POLL_SECONDS", help = "Seconds between NASCAR polls.")]
    pub nascar_poll_seconds: Option<u64>,

    #[clap(long, env = "MOTOGP_POLL_SECONDS", help = "Seconds between MotoGP polls.")]
    pub motogp_poll_seconds: Option<u64>,

    #[clap(long, env = "FLAGS_NO_SESSION_SECONDS", help = "Seconds to wait after F1 reports no live session.")]
    pub no_session_seconds: Option<u64>,

    #[clap(long, env = "F1_BASE_URL", help = "F1 SignalR endpoint root.")]
    pub f1_base_url: Option<String>,

    // Only settable from the config file.
    #[clap(skip)]
    pub color_overrides: Option<ColorOverrides>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            feed: other.feed.or(self.feed),
            kasa_ip: other.kasa_ip.or(self.kasa_ip),
            kasa_username: other.kasa_username.or(self.kasa_username),
            kasa_password: other.kasa_password.or(self.kasa_password),
            nascar_poll_seconds: other.nascar_poll_seconds.or(self.nascar_poll_seconds),
            motogp_poll_seconds: other.motogp_poll_seconds.or(self.motogp_poll_seconds),
            no_session_seconds: other.no_session_seconds.or(self.no_session_seconds),
            f1_base_url: other.f1_base_url.or(self.f1_base_url),
            color_overrides: other.color_overrides.or(self.color_overrides),
        }
    }

    fn defaults() -> Config {
        let feeds = FeedSettings::default();
        Config {
            port: Some(5000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            feed: Some(FeedKind::F1.as_str().to_string()),
            kasa_ip: Some(String::new()),
            nascar_poll_seconds: Some(feeds.nascar.poll_interval.as_secs()),
            motogp_poll_seconds: Some(feeds.motogp.poll_interval.as_secs()),
            no_session_seconds: Some(feeds.f1.no_session_backoff.as_secs()),
            f1_base_url: Some(feeds.f1.base_url),
            ..Default::default()
        }
    }
}

/// Fully resolved settings the server runs with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub feed: FeedKind,
    pub kasa_ip: String,
    pub credentials: Option<Credentials>,
    pub feeds: FeedSettings,
    pub colors: ColorTables,
}

impl TryFrom<Config> for Settings {
    type Error = anyhow::Error;

    fn try_from(config: Config) -> Result<Self> {
        let defaults = Config::defaults();
        let config = defaults.merge(config);

        let feed_name = config.feed.unwrap_or_default();
        let feed = feed_name
            .parse::<FeedKind>()
            .map_err(|e| anyhow!("invalid feed setting: {e}"))?;

        let mut feeds = FeedSettings::default();
        if let Some(url) = config.f1_base_url {
            feeds.f1.base_url = url;
        }
        if let Some(secs) = config.no_session_seconds {
            feeds.f1.no_session_backoff = Duration::from_secs(secs);
        }
        if let Some(secs) = config.nascar_poll_seconds {
            feeds.nascar.poll_interval = poll_period(secs, "nascarPollSeconds")?;
            feeds.nascar.error_interval = feeds.nascar.poll_interval;
        }
        if let Some(secs) = config.motogp_poll_seconds {
            feeds.motogp.poll_interval = poll_period(secs, "motogpPollSeconds")?;
            feeds.motogp.error_interval = feeds.motogp.poll_interval;
        }

        let colors = match &config.color_overrides {
            Some(overrides) => ColorTables::with_overrides(overrides),
            None => ColorTables::default(),
        };

        Ok(Settings {
            port: config.port.unwrap_or(5000),
            log_dir: config.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
            feed,
            kasa_ip: config.kasa_ip.unwrap_or_default().trim().to_string(),
            credentials: Credentials::from_parts(config.kasa_username, config.kasa_password),
            feeds,
            colors,
        })
    }
}

fn poll_period(secs: u64, name: &str) -> Result<Duration> {
    if secs == 0 {
        return Err(anyhow!("{name} must be at least 1"));
    }
    Ok(Duration::from_secs(secs))
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers the config file under the CLI/env values in `cli`.
pub fn layer_config(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli)
}

/// Defaults, then the JSON config file, then environment variables and CLI
/// arguments. `.env` is loaded first so its values count as environment.
pub fn load_settings() -> Result<Settings> {
    dotenvy::dotenv().ok();
    Settings::try_from(layer_config(Config::parse()))
}
