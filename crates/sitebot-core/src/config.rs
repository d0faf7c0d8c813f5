use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Integration sections
// ---------------------------------------------------------------------------

/// PostgREST-compatible structured store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
}

/// GitHub-style repository that receives snapshot commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub token: String,
    #[serde(default = "default_repo_api")]
    pub api_base: String,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_repo_api() -> String {
    "https://api.github.com".to_string()
}

/// Telegram-style chat bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub token: String,
    #[serde(default = "default_bot_api")]
    pub api_base: String,
    /// Compared against the `X-Telegram-Bot-Api-Secret-Token` header.
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Operator user ids allowed to talk to the bot. Empty allows nobody.
    #[serde(default)]
    pub allowed_users: Vec<i64>,
}

fn default_bot_api() -> String {
    "https://api.telegram.org".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriberConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// The rendering layer that must be told when content changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub base_url: String,
    #[serde(default)]
    pub revalidate_secret: Option<String>,
    #[serde(default)]
    pub deploy_hook_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shared secret for the programmatic API. `None` rejects every call.
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8787
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_secret: None,
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    #[serde(default = "default_mirror_retries")]
    pub mirror_retries: u32,
}

fn default_history_retention() -> usize {
    50
}

fn default_pending_ttl_secs() -> u64 {
    3600
}

fn default_mirror_retries() -> u32 {
    2
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_retention: default_history_retention(),
            pending_ttl_secs: default_pending_ttl_secs(),
            mirror_retries: default_mirror_retries(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Everything the engine and its surfaces need, built once at startup and
/// handed to each component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub repo: Option<RepoConfig>,
    #[serde(default)]
    pub bot: Option<BotConfig>,
    #[serde(default)]
    pub interpreter: Option<InterpreterConfig>,
    #[serde(default)]
    pub transcriber: Option<TranscriberConfig>,
    #[serde(default)]
    pub site: Option<SiteConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Build from `SITEBOT_*` process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. A section is present only
    /// when all of its required variables are set and non-empty.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store = match (get("SITEBOT_STORE_URL"), get("SITEBOT_STORE_KEY")) {
            (Some(url), Some(service_key)) => Some(StoreConfig { url, service_key }),
            _ => None,
        };

        let repo = match (
            get("SITEBOT_REPO_OWNER"),
            get("SITEBOT_REPO_NAME"),
            get("SITEBOT_REPO_TOKEN"),
        ) {
            (Some(owner), Some(repo), Some(token)) => Some(RepoConfig {
                owner,
                repo,
                token,
                branch: get("SITEBOT_REPO_BRANCH").unwrap_or_else(default_branch),
                api_base: get("SITEBOT_REPO_API").unwrap_or_else(default_repo_api),
            }),
            _ => None,
        };

        let bot = get("SITEBOT_BOT_TOKEN").map(|token| BotConfig {
            token,
            api_base: get("SITEBOT_BOT_API").unwrap_or_else(default_bot_api),
            webhook_secret: get("SITEBOT_BOT_WEBHOOK_SECRET"),
            allowed_users: get("SITEBOT_ALLOWED_USERS")
                .map(|s| parse_user_list(&s))
                .unwrap_or_default(),
        });

        let interpreter = get("SITEBOT_INTERPRETER_URL").map(|url| InterpreterConfig {
            url,
            api_key: get("SITEBOT_INTERPRETER_KEY"),
            model: get("SITEBOT_INTERPRETER_MODEL"),
        });

        let transcriber = get("SITEBOT_TRANSCRIBER_URL").map(|url| TranscriberConfig {
            url,
            api_key: get("SITEBOT_TRANSCRIBER_KEY"),
        });

        let site = get("SITEBOT_SITE_URL").map(|base_url| SiteConfig {
            base_url,
            revalidate_secret: get("SITEBOT_REVALIDATE_SECRET"),
            deploy_hook_url: get("SITEBOT_DEPLOY_HOOK"),
        });

        let server = ServerConfig {
            api_secret: get("SITEBOT_API_SECRET"),
            port: get("SITEBOT_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(default_port),
        };

        let engine = EngineConfig {
            history_retention: get("SITEBOT_HISTORY_RETENTION")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_history_retention),
            pending_ttl_secs: get("SITEBOT_PENDING_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_pending_ttl_secs),
            mirror_retries: get("SITEBOT_MIRROR_RETRIES")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_mirror_retries),
        };

        Config {
            store,
            repo,
            bot,
            interpreter,
            transcriber,
            site,
            server,
            engine,
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut warn = |level: WarnLevel, message: &str| {
            warnings.push(ConfigWarning {
                level,
                message: message.to_string(),
            })
        };

        if self.store.is_none() {
            warn(
                WarnLevel::Error,
                "store is not configured: content commands will report 'not configured'",
            );
        }
        if self.repo.is_none() {
            warn(
                WarnLevel::Warning,
                "repository is not configured: snapshot commits and revert are disabled",
            );
        }
        if self.server.api_secret.is_none() {
            warn(
                WarnLevel::Warning,
                "api_secret is not set: the programmatic API rejects every request",
            );
        }
        if let Some(bot) = &self.bot {
            if bot.allowed_users.is_empty() {
                warn(
                    WarnLevel::Warning,
                    "bot.allowed_users is empty: nobody can issue commands",
                );
            }
            if self.interpreter.is_none() {
                warn(
                    WarnLevel::Warning,
                    "bot is configured without an interpreter: free-text commands will fail",
                );
            }
        }
        if self.site.is_none() {
            warn(
                WarnLevel::Warning,
                "site is not configured: pages will not be revalidated after changes",
            );
        }
        if self.engine.history_retention == 0 {
            warn(
                WarnLevel::Error,
                "engine.history_retention is 0: undo will never find an entry",
            );
        }

        warnings
    }
}

fn parse_user_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse().ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
