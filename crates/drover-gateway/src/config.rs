use anyhow::{Context, Result};
use drover_agent::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Config {
    pub agent: AgentConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    pub channel: ChannelConfig,
    pub operations: OperationsConfig,
    #[serde(default)]
    pub checkpoints: CheckpointsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AgentConfig {
    #[serde(default = "default_agent_id")]
    pub id: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Inline system prompt, used when no file is configured or readable.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Optional prompt file, re-read on every decision round.
    #[serde(default)]
    pub system_prompt_file: Option<String>,
    #[serde(default = "default_max_rounds")]
    pub max_decide_act_rounds: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct RetentionConfig {
    #[serde(default = "default_min_to_keep")]
    pub min_to_keep: usize,
    #[serde(default = "default_max_before_trigger")]
    pub max_before_trigger: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            min_to_keep: default_min_to_keep(),
            max_before_trigger: default_max_before_trigger(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChannelConfig {
    /// Endpoint long-polled for inbound envelopes.
    pub relay_url: String,
    /// Messaging API base for outbound sends.
    #[serde(default = "default_channel_api_url")]
    pub api_url: String,
    /// Sender phone-number id on the messaging API.
    pub number_id: String,
    /// Seconds to wait before re-polling an idle relay.
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OperationsConfig {
    /// Base URL of the operations API the actions call.
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CheckpointsConfig {
    #[serde(default = "default_checkpoints_dir")]
    pub dir: String,
}

impl Default for CheckpointsConfig {
    fn default() -> Self {
        Self {
            dir: default_checkpoints_dir(),
        }
    }
}

fn default_agent_id() -> String {
    "drover".to_owned()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_system_prompt() -> String {
    "You are an operations assistant reached over chat. Use the available \
     actions to answer questions about infrastructure; reply concisely."
        .to_owned()
}

fn default_max_rounds() -> usize {
    8
}

fn default_min_to_keep() -> usize {
    12
}

fn default_max_before_trigger() -> usize {
    30
}

fn default_channel_api_url() -> String {
    "https://graph.facebook.com/v18.0".to_owned()
}

fn default_poll_seconds() -> u64 {
    20
}

fn default_checkpoints_dir() -> String {
    "./data/checkpoints".to_owned()
}

impl Config {
    /// Load config from a TOML file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Validate thresholds and build the retention policy. Misconfigured
    /// thresholds fail here, at startup, not per message.
    pub(crate) fn retention_policy(&self) -> Result<RetentionPolicy> {
        RetentionPolicy::new(self.retention.min_to_keep, self.retention.max_before_trigger)
    }

    /// Resolve a path from the config file's directory.
    pub(crate) fn resolve_path(config_dir: &Path, raw: &str) -> PathBuf {
        let path = PathBuf::from(raw);
        if path.is_absolute() {
            path
        } else {
            config_dir.join(path)
        }
    }

    /// Resolve config path: check arg, then default locations.
    pub(crate) fn find_config_path(explicit: Option<&str>) -> PathBuf {
        if let Some(p) = explicit {
            return PathBuf::from(p);
        }

        // Check current directory
        let local = PathBuf::from("drover.toml");
        if local.exists() {
            return local;
        }

        // Check XDG config
        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            let xdg = PathBuf::from(config_dir).join("drover/drover.toml");
            if xdg.exists() {
                return xdg;
            }
        }

        // Check ~/.config/drover
        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home).join(".config/drover/drover.toml");
            if home_config.exists() {
                return home_config;
            }
        }

        // Default to local
        local
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let raw = r#"
[agent]
model = "claude-sonnet-4-20250514"

[channel]
relay_url = "https://relay.example/inbound"
number_id = "1234567890"

[operations]
base_url = "https://ops.example"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.agent.id, "drover");
        assert_eq!(config.agent.model, "claude-sonnet-4-20250514");
        assert_eq!(config.agent.max_decide_act_rounds, 8);
        assert_eq!(config.retention.min_to_keep, 12);
        assert_eq!(config.retention.max_before_trigger, 30);
        assert_eq!(config.checkpoints.dir, "./data/checkpoints");
        assert!(config.agent.system_prompt_file.is_none());
    }

    #[test]
    fn parse_full_config() {
        let raw = r#"
[agent]
id = "ops-bot"
model = "claude-sonnet-4-20250514"
max_tokens = 1024
system_prompt_file = "./prompt.md"
max_decide_act_rounds = 4

[retention]
min_to_keep = 6
max_before_trigger = 10

[channel]
relay_url = "https://relay.example/inbound"
api_url = "https://graph.example/v18.0"
number_id = "1234567890"
poll_seconds = 5

[operations]
base_url = "https://ops.example"

[checkpoints]
dir = "./state/checkpoints"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.agent.id, "ops-bot");
        assert_eq!(config.agent.max_tokens, 1024);
        assert_eq!(
            config.agent.system_prompt_file.as_deref(),
            Some("./prompt.md")
        );
        assert_eq!(config.retention.min_to_keep, 6);
        assert_eq!(config.channel.poll_seconds, 5);
        assert_eq!(config.checkpoints.dir, "./state/checkpoints");
        assert!(config.retention_policy().is_ok());
    }

    #[test]
    fn inverted_retention_thresholds_fail_validation() {
        let raw = r#"
[agent]
model = "test"

[retention]
min_to_keep = 50
max_before_trigger = 10

[channel]
relay_url = "https://relay.example/inbound"
number_id = "1234567890"

[operations]
base_url = "https://ops.example"
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.retention_policy().is_err());
    }

    #[test]
    fn resolve_path_keeps_absolute_paths() {
        let resolved = Config::resolve_path(Path::new("/etc/drover"), "/var/lib/drover");
        assert_eq!(resolved, PathBuf::from("/var/lib/drover"));

        let relative = Config::resolve_path(Path::new("/etc/drover"), "./data");
        assert_eq!(relative, PathBuf::from("/etc/drover/./data"));
    }
}
