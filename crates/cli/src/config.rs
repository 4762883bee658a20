//! Configuration from deskmate.toml, overridden by the environment.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use mcp::ClientConfig;
use runtime::{AgentConfig, DEFAULT_MAX_ROUNDS};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "deskmate.toml";

const SYSTEM_PROMPT: &str = "You are a helpful customer service assistant. \
Use the available tools to help customers with their requests. \
Always be professional and empathetic. \
Look up customer information first when possible, create tickets for issues \
that need follow-up, and calculate account values when discussing billing or \
purchases.";

/// Completion provider selected by `LLM_PROVIDER`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
    Ollama,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "ollama" => Ok(Provider::Ollama),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub host: HostConfig,
    pub agent: AgentSection,
}

/// Provider selection and credentials.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub name: Provider,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub ollama_model: String,
    pub ollama_base_url: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: Provider::default(),
            openai_api_key: None,
            openai_model: "gpt-4.1-2025-04-14".to_string(),
            openai_base_url: None,
            anthropic_api_key: None,
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            ollama_model: "gemma3:27b".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Model name for the selected provider.
    pub fn model(&self) -> &str {
        match self.name {
            Provider::OpenAi => &self.openai_model,
            Provider::Anthropic => &self.anthropic_model,
            Provider::Ollama => &self.ollama_model,
        }
    }
}

/// How to launch the tool host.
///
/// Without a `command`, the running binary is re-executed with `serve`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            connect_timeout_secs: Some(30),
            request_timeout_secs: mcp::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_rounds: usize,
    pub system: Option<String>,
    pub tool_timeout_secs: Option<u64>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            system: Some(SYSTEM_PROMPT.to_string()),
            tool_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The explicit file if given, else `deskmate.toml` when present, then
    /// `.env` and the process environment on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE)?,
            None => Self::default(),
        };

        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from environment variables.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let provider = &mut self.provider;
        if let Some(name) = lookup("LLM_PROVIDER") {
            provider.name = name.parse()?;
        }

        let strings: [(&str, &mut String); 4] = [
            ("OPENAI_MODEL", &mut provider.openai_model),
            ("ANTHROPIC_MODEL", &mut provider.anthropic_model),
            ("OLLAMA_MODEL", &mut provider.ollama_model),
            ("OLLAMA_BASE_URL", &mut provider.ollama_base_url),
        ];
        for (key, slot) in strings {
            if let Some(value) = lookup(key) {
                *slot = value;
            }
        }

        let optional: [(&str, &mut Option<String>); 3] = [
            ("OPENAI_API_KEY", &mut provider.openai_api_key),
            ("OPENAI_BASE_URL", &mut provider.openai_base_url),
            ("ANTHROPIC_API_KEY", &mut provider.anthropic_api_key),
        ];
        for (key, slot) in optional {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }

        if let Some(raw) = lookup("DESKMATE_MAX_ROUNDS") {
            self.agent.max_rounds = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "DESKMATE_MAX_ROUNDS",
                value: raw,
            })?;
        }

        Ok(())
    }

    /// Check that the selected provider has what it needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let provider = &self.provider;
        let missing = |var: &'static str| ConfigError::MissingCredential {
            provider: provider.name,
            var,
        };
        let absent = |key: &Option<String>| key.as_deref().is_none_or(str::is_empty);
        match provider.name {
            Provider::OpenAi if absent(&provider.openai_api_key) => Err(missing("OPENAI_API_KEY")),
            Provider::Anthropic if absent(&provider.anthropic_api_key) => {
                Err(missing("ANTHROPIC_API_KEY"))
            }
            _ => Ok(()),
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_rounds: self.agent.max_rounds,
            system: self.agent.system.clone(),
            tool_timeout: self.agent.tool_timeout_secs.map(Duration::from_secs),
            ..AgentConfig::default()
        }
    }

    /// Launch settings for the tool host.
    pub fn client_config(&self) -> Result<ClientConfig, ConfigError> {
        let host = &self.host;
        let (command, args) = match &host.command {
            Some(command) => (command.clone(), host.args.clone()),
            None => {
                let exe: PathBuf = std::env::current_exe()?;
                (exe.display().to_string(), vec!["serve".to_string()])
            }
        };

        let mut config = ClientConfig::new("desk", command)
            .args(args)
            .timeout(Duration::from_secs(host.request_timeout_secs));
        for (key, value) in &host.env {
            config = config.env(key, value);
        }
        Ok(config)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.host.connect_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("unknown provider `{0}`: expected openai, anthropic or ollama")]
    UnknownProvider(String),

    #[error("{var} is required when using the {provider} provider")]
    MissingCredential {
        provider: Provider,
        var: &'static str,
    },

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
