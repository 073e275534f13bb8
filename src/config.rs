//! Runtime configuration.
//!
//! [`Settings`] is the immutable snapshot a check cycle runs against. [`ConfigHandle`]
//! owns the current snapshot and replaces it wholesale when an operator command changes
//! something, so a cycle that already started keeps seeing the values it began with.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use url::Url;

use crate::environment::{
    get_env_var_as_bool, get_env_var_as_vec, get_env_var_or, get_optional_env_var,
};
use crate::feed::DEFAULT_API_URL;
use crate::filter::FilterRules;
use crate::messaging::DispatchTarget;

const LIST_DELIMITER: char = ';';

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    /// Articles fetched (and at most announced) per cycle.
    pub per_page: usize,
    /// Pause between consecutive unfolded sends.
    pub send_interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplaySettings {
    pub show_thumbnail: bool,
    pub show_excerpt: bool,
    pub show_author: bool,
    /// Batches larger than this are folded into one grouped message.
    pub fold_threshold: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Receivers {
    pub groups: Vec<String>,
    pub users: Vec<String>,
}

impl Receivers {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.users.is_empty()
    }

    /// Groups first, then users, in configured order.
    pub fn targets(&self) -> Vec<DispatchTarget> {
        self.groups
            .iter()
            .cloned()
            .map(DispatchTarget::Group)
            .chain(self.users.iter().cloned().map(DispatchTarget::User))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub enabled: bool,
    /// Gap between the end of one scheduled cycle and the start of the next.
    pub interval: Duration,
    pub receivers: Receivers,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub network: NetworkSettings,
    pub display: DisplaySettings,
    pub monitor: MonitorSettings,
    pub filter: FilterRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: NetworkSettings {
                per_page: 1,
                send_interval: Duration::from_secs(2),
            },
            display: DisplaySettings {
                show_thumbnail: true,
                show_excerpt: false,
                show_author: false,
                fold_threshold: 2,
            },
            monitor: MonitorSettings {
                enabled: false,
                interval: Duration::from_secs(300),
                receivers: Receivers::default(),
            },
            filter: FilterRules::default(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Self {
            network: NetworkSettings {
                per_page: get_env_var_or("LV_PER_PAGE", defaults.network.per_page).max(1),
                send_interval: seconds_or_default(
                    get_env_var_or("LV_SEND_INTERVAL", defaults.network.send_interval.as_secs_f64()),
                    defaults.network.send_interval,
                ),
            },
            display: DisplaySettings {
                show_thumbnail: get_env_var_as_bool(
                    "LV_SHOW_THUMBNAIL",
                    defaults.display.show_thumbnail,
                ),
                show_excerpt: get_env_var_as_bool("LV_SHOW_EXCERPT", defaults.display.show_excerpt),
                show_author: get_env_var_as_bool("LV_SHOW_AUTHOR", defaults.display.show_author),
                fold_threshold: get_env_var_or(
                    "LV_FOLD_THRESHOLD",
                    defaults.display.fold_threshold,
                ),
            },
            monitor: MonitorSettings {
                enabled: get_env_var_as_bool("LV_MONITOR_ENABLED", defaults.monitor.enabled),
                interval: Duration::from_secs(
                    get_env_var_or("LV_MONITOR_INTERVAL", defaults.monitor.interval.as_secs())
                        .max(1),
                ),
                receivers: Receivers {
                    groups: get_env_var_as_vec("LV_RECEIVER_GROUPS", LIST_DELIMITER),
                    users: get_env_var_as_vec("LV_RECEIVER_USERS", LIST_DELIMITER),
                },
            },
            filter: FilterRules {
                include_keywords: get_env_var_as_vec("LV_FILTER_KEYWORDS", LIST_DELIMITER),
                exclude_keywords: get_env_var_as_vec("LV_FILTER_EXCLUDE_KEYWORDS", LIST_DELIMITER),
                include_categories: get_env_var_as_vec("LV_FILTER_CATEGORIES", LIST_DELIMITER),
                exclude_categories: get_env_var_as_vec(
                    "LV_FILTER_EXCLUDE_CATEGORIES",
                    LIST_DELIMITER,
                ),
            },
        }
    }
}

/// Holds the current [`Settings`] snapshot.
#[derive(Clone)]
pub struct ConfigHandle {
    tx: Arc<watch::Sender<Arc<Settings>>>,
}

impl ConfigHandle {
    pub fn new(settings: Settings) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(settings));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every snapshot swap.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }

    pub fn set_monitor_enabled(&self, enabled: bool) {
        self.update(|settings| settings.monitor.enabled = enabled);
    }

    /// Clones the current snapshot, applies `change` and publishes the result.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) {
        self.tx.send_modify(|current| {
            let mut next = (**current).clone();
            change(&mut next);
            *current = Arc::new(next);
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    OneBot,
    Slack,
}

#[derive(Debug, Clone)]
pub enum LlmBackend {
    Ollama { host: String, port: u16 },
    OpenAI { api_key: String },
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub model: String,
    pub temperature: f32,
}

/// Wiring that is fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub data_dir: PathBuf,
    pub api_url: String,
    pub transport: Transport,
    pub onebot_api_url: String,
    pub onebot_access_token: Option<String>,
    pub slack_token: Option<String>,
    pub render_endpoint: Option<String>,
    pub llm: Option<LlmSettings>,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let transport = match get_optional_env_var("LV_TRANSPORT")
            .unwrap_or_else(|| "onebot".to_string())
            .to_lowercase()
            .as_str()
        {
            "onebot" => Transport::OneBot,
            "slack" => Transport::Slack,
            other => anyhow::bail!("Unknown LV_TRANSPORT {:?} (expected onebot or slack)", other),
        };

        let slack_token = get_optional_env_var("SLACK_TOKEN");
        if transport == Transport::Slack && slack_token.is_none() {
            anyhow::bail!("SLACK_TOKEN environment variable required when LV_TRANSPORT=slack");
        }

        let llm = match get_optional_env_var("LLM_TYPE").map(|t| t.to_lowercase()) {
            None => None,
            Some(t) if t == "none" => None,
            Some(t) if t == "ollama" => Some(LlmSettings {
                backend: LlmBackend::Ollama {
                    host: get_optional_env_var("OLLAMA_HOST")
                        .unwrap_or_else(|| "http://localhost".to_string()),
                    port: get_env_var_or("OLLAMA_PORT", 11434),
                },
                model: get_optional_env_var("OLLAMA_MODEL")
                    .unwrap_or_else(|| "llama3".to_string()),
                temperature: get_env_var_or("LLM_TEMPERATURE", 0.0),
            }),
            Some(t) if t == "openai" => Some(LlmSettings {
                backend: LlmBackend::OpenAI {
                    api_key: get_optional_env_var("OPENAI_API_KEY").ok_or_else(|| {
                        anyhow::anyhow!("OPENAI_API_KEY environment variable required when LLM_TYPE=openai")
                    })?,
                },
                model: get_optional_env_var("OPENAI_MODEL")
                    .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                temperature: get_env_var_or("LLM_TEMPERATURE", 0.0),
            }),
            Some(other) => anyhow::bail!("Unknown LLM_TYPE {:?} (expected ollama, openai or none)", other),
        };

        Ok(Self {
            data_dir: get_optional_env_var("LV_DATA_DIR")
                .unwrap_or_else(|| "data/plugin_data/lvwatch".to_string())
                .into(),
            api_url: validated_url(
                "LV_API_URL",
                &get_optional_env_var("LV_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            )?,
            transport,
            onebot_api_url: validated_url(
                "ONEBOT_API_URL",
                &get_optional_env_var("ONEBOT_API_URL")
                    .unwrap_or_else(|| "http://127.0.0.1:3000".to_string()),
            )?,
            onebot_access_token: get_optional_env_var("ONEBOT_ACCESS_TOKEN"),
            slack_token,
            render_endpoint: get_optional_env_var("RENDER_ENDPOINT")
                .map(|endpoint| validated_url("RENDER_ENDPOINT", &endpoint))
                .transpose()?,
            llm,
            port: get_env_var_or("PORT", 8080),
        })
    }
}

/// Converts a configured number of seconds, falling back to `default` for negative,
/// non-finite or overflowing values.
pub fn seconds_or_default(secs: f64, default: Duration) -> Duration {
    if secs < 0.0 {
        return default;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(default)
}

/// Checks that `value` is an absolute http(s) URL and drops any trailing slash.
pub fn validated_url(var: &str, value: &str) -> Result<String> {
    let url = Url::parse(value.trim()).with_context(|| format!("{} is not a valid URL: {:?}", var, value))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("{} must be an http(s) URL, got {:?}", var, value);
    }
    Ok(value.trim().trim_end_matches('/').to_string())
}
