use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reel::DEFAULT_SWIPE_THRESHOLD_PX;

const DEFAULT_ENV_PREFIX: &str = "REELGRAM";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub ui: UIConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    #[serde(default)]
    pub graphql_url: String,
    #[serde(default)]
    pub admin_secret: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            graphql_url: String::new(),
            admin_secret: String::new(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_user_agent() -> String {
    format!("reelgram/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_page_size() -> u32 {
    crate::data::DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionConfig {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GestureConfig {
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold_px: f64,
    #[serde(default)]
    pub wheel_min_delta: f64,
    #[serde(default = "default_row_height")]
    pub row_height_px: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            swipe_threshold_px: default_swipe_threshold(),
            wheel_min_delta: 0.0,
            row_height_px: default_row_height(),
        }
    }
}

fn default_swipe_threshold() -> f64 {
    DEFAULT_SWIPE_THRESHOLD_PX
}

fn default_row_height() -> f64 {
    16.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerConfig {
    #[serde(default = "default_video_command")]
    pub video_command: Vec<String>,
    #[serde(default = "default_mute_args")]
    pub mute_args: Vec<String>,
    #[serde(default)]
    pub autoplay: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            video_command: default_video_command(),
            mute_args: default_mute_args(),
            autoplay: false,
        }
    }
}

fn default_video_command() -> Vec<String> {
    vec![
        "mpv".into(),
        "--loop-file=inf".into(),
        "--really-quiet".into(),
        "%URL%".into(),
    ]
}

fn default_mute_args() -> Vec<String> {
    vec!["--mute=yes".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UIConfig {
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "default_feed")]
    pub feed: String,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            feed: default_feed(),
        }
    }
}

fn default_theme() -> String {
    "default".into()
}

fn default_feed() -> String {
    "posts".into()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_log_dir(),
        }
    }
}

fn default_log_level() -> String {
    "reelgram=info,warn".into()
}

fn default_log_dir() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join("reelgram"))
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.backend.graphql_url.is_empty() {
        base.backend.graphql_url = other.backend.graphql_url;
    }
    if !other.backend.admin_secret.is_empty() {
        base.backend.admin_secret = other.backend.admin_secret;
    }
    if !other.backend.user_agent.is_empty() {
        base.backend.user_agent = other.backend.user_agent;
    }
    base.backend.timeout = other.backend.timeout;
    if other.backend.page_size != 0 {
        base.backend.page_size = other.backend.page_size;
    }

    if !other.session.user_id.is_empty() {
        base.session.user_id = other.session.user_id;
    }
    if !other.session.access_token.is_empty() {
        base.session.access_token = other.session.access_token;
    }

    base.gestures = other.gestures;

    if !other.player.video_command.is_empty() {
        base.player.video_command = other.player.video_command;
    }
    base.player.mute_args = other.player.mute_args;
    base.player.autoplay = other.player.autoplay;

    if !other.ui.theme.is_empty() {
        base.ui.theme = other.ui.theme;
    }
    if !other.ui.feed.is_empty() {
        base.ui.feed = other.ui.feed;
    }

    if !other.logging.level.is_empty() {
        base.logging.level = other.logging.level;
    }
    if other.logging.directory.is_some() {
        base.logging.directory = other.logging.directory;
    }

    base
}

/// Applies `<PREFIX>_<SECTION>__<KEY>` variables on top of `base`. Unknown
/// keys and unparsable values are ignored.
fn merge_env(mut base: Config, prefix: &str) -> Config {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(&mut base, &key, value);
    }

    base
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "backend.graphql_url" => cfg.backend.graphql_url = value,
        "backend.admin_secret" => cfg.backend.admin_secret = value,
        "backend.user_agent" => cfg.backend.user_agent = value,
        "backend.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.backend.timeout = duration;
            }
        }
        "backend.page_size" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.backend.page_size = parsed;
            }
        }
        "session.user_id" => cfg.session.user_id = value,
        "session.access_token" => cfg.session.access_token = value,
        "gestures.swipe_threshold_px" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.gestures.swipe_threshold_px = parsed;
            }
        }
        "gestures.wheel_min_delta" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.gestures.wheel_min_delta = parsed;
            }
        }
        "gestures.row_height_px" => {
            if let Ok(parsed) = value.parse::<f64>() {
                cfg.gestures.row_height_px = parsed;
            }
        }
        "player.video_command" => {
            cfg.player.video_command = split_list(&value);
        }
        "player.mute_args" => {
            cfg.player.mute_args = split_list(&value);
        }
        "player.autoplay" => {
            cfg.player.autoplay = matches!(value.as_str(), "1" | "true" | "TRUE" | "True");
        }
        "ui.theme" => cfg.ui.theme = value,
        "ui.feed" => cfg.ui.feed = value,
        "logging.level" => cfg.logging.level = value,
        "logging.directory" => cfg.logging.directory = Some(PathBuf::from(value)),
        _ => {}
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reelgram").join("config.yaml"))
}
