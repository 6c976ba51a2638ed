use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    api::{DEFAULT_BASE_URL, MAX_MESSAGE_LENGTH},
    classify::RetryPolicy,
    errors::Error,
    history::DEFAULT_CAPACITY,
    segment::Segmenter,
    transport::HttpMethod,
    Result,
};

pub const ENV_TOKEN: &str = "TB_TOKEN";
pub const ENV_CHAT_ID: &str = "TB_CHAT_ID";

/// Typed configuration for a bot session.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub chat_id: String,

    pub base_url: String,
    /// Prepended to every outbound text to tell deployments apart.
    pub instance: String,

    pub max_message_length: usize,
    pub history_capacity: usize,

    pub http_method: HttpMethod,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    /// Defaults around the two required values. Performs no validation.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            instance: default_instance(),
            max_message_length: MAX_MESSAGE_LENGTH,
            history_capacity: DEFAULT_CAPACITY,
            http_method: HttpMethod::Post,
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }

    /// Environment, then `./.env` for keys the environment lacks.
    pub fn load() -> Result<Self> {
        Self::load_with(Path::new(".env"), |key| env::var(key).ok())
    }

    /// `env` always wins over the dotenv file. A missing file is not an error.
    pub fn load_with(dotenv: &Path, from_env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let file = read_dotenv(dotenv)?;
        Self::from_lookup(|key| from_env(key).or_else(|| file.get(key).cloned()))
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let token = get(ENV_TOKEN).unwrap_or_default();
        let chat_id = get(ENV_CHAT_ID).unwrap_or_default();
        require(
            &[(ENV_TOKEN, token.as_str()), (ENV_CHAT_ID, chat_id.as_str())],
            "environment variables",
        )?;

        let mut cfg = Self::new(token.trim(), chat_id.trim());
        if let Some(v) = get("TB_BASE_URL").and_then(non_empty) {
            cfg.base_url = v;
        }
        if let Some(v) = get("TB_INSTANCE") {
            cfg.instance = v;
        }
        if let Some(v) = parse_opt::<usize>(&get, "TB_MAX_MESSAGE_LEN")? {
            cfg.max_message_length = v;
        }
        if let Some(v) = parse_opt::<usize>(&get, "TB_HISTORY_SIZE")? {
            cfg.history_capacity = v;
        }
        if let Some(v) = get("TB_HTTP_METHOD").and_then(non_empty) {
            cfg.http_method = parse_method(&v)?;
        }
        if let Some(v) = parse_opt::<u64>(&get, "TB_REQUEST_TIMEOUT_SECS")? {
            cfg.request_timeout = Duration::from_secs(v);
        }

        cfg.validate_limits()?;
        Ok(cfg)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// YAML with `BotToken` and `ChatID`, plus optional overrides.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let file: FileConfig = serde_yaml_ng::from_str(raw)?;
        require(
            &[
                ("BotToken", file.bot_token.as_str()),
                ("ChatID", file.chat_id.as_str()),
            ],
            "config keys",
        )?;

        let mut cfg = Self::new(file.bot_token.trim(), file.chat_id.trim());
        if let Some(v) = file.base_url.and_then(non_empty) {
            cfg.base_url = v;
        }
        if let Some(v) = file.instance {
            cfg.instance = v;
        }
        if let Some(v) = file.max_message_length {
            cfg.max_message_length = v;
        }
        if let Some(v) = file.history_size {
            cfg.history_capacity = v;
        }
        if let Some(v) = file.http_method {
            cfg.http_method = parse_method(&v)?;
        }
        if let Some(v) = file.request_timeout_secs {
            cfg.request_timeout = Duration::from_secs(v);
        }

        cfg.validate_limits()?;
        Ok(cfg)
    }

    /// The message limit must leave room for the instance prefix and part labels.
    pub fn validate_limits(&self) -> Result<()> {
        Segmenter::new(self.instance.clone(), self.max_message_length).map(|_| ())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(rename = "BotToken", default)]
    bot_token: String,
    #[serde(rename = "ChatID", default)]
    chat_id: String,
    #[serde(rename = "BaseURL", default)]
    base_url: Option<String>,
    #[serde(rename = "Instance", default)]
    instance: Option<String>,
    #[serde(rename = "MaxMessageLength", default)]
    max_message_length: Option<usize>,
    #[serde(rename = "HistorySize", default)]
    history_size: Option<usize>,
    #[serde(rename = "HTTPMethod", default)]
    http_method: Option<String>,
    #[serde(rename = "RequestTimeoutSecs", default)]
    request_timeout_secs: Option<u64>,
}

fn require(fields: &[(&str, &str)], what: &str) -> Result<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| *k)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Error::Config(format!(
        "empty {what}: {} for bot creation",
        missing.join(", ")
    )))
}

fn parse_method(v: &str) -> Result<HttpMethod> {
    HttpMethod::parse(v).ok_or_else(|| Error::Config(format!("unsupported http method: {v}")))
}

fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = get(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key}: cannot parse {raw:?}")))
}

/// `[[#<executable>]] `
fn default_instance() -> String {
    let exe = env::args_os()
        .next()
        .map(PathBuf::from)
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "tgbot".to_string());
    format!("[[#{exe}]] ")
}

fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(Error::Config(format!("{}: {e}", path.display()))),
    };
    iter.map(|item| item.map_err(|e| Error::Config(format!("{}: {e}", path.display()))))
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
