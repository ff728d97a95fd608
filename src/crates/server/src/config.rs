//! Server configuration from CLI flags and environment

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use willow_agent::AgentCommand;
use willow_graph::snapshot;
use willow_pipeline::MaintenanceOptions;

/// Willow: a personal knowledge assistant's graph memory engine
#[derive(Debug, Clone, Parser)]
#[command(name = "willow-server", version, about)]
pub struct Config {
    /// Address to bind the HTTP server on
    #[arg(long, default_value = "127.0.0.1:7078", env = "WILLOW_BIND")]
    pub bind: SocketAddr,

    /// Graph snapshot path (default: $HOME/.willow/graph.json)
    #[arg(long, env = "WILLOW_GRAPH_PATH")]
    pub graph_path: Option<PathBuf>,

    /// Conversation store directory (default: next to the snapshot)
    #[arg(long, env = "WILLOW_CONVERSATIONS_DIR")]
    pub conversations_dir: Option<PathBuf>,

    /// Conversations between automatic maintenance runs
    #[arg(long, default_value_t = 5, env = "MAINTENANCE_THRESHOLD")]
    pub maintenance_threshold: u32,

    /// Delay in seconds before a triggered maintenance run starts
    #[arg(long, default_value_t = 15, env = "MAINTENANCE_DELAY_SECS")]
    pub maintenance_delay_secs: u64,

    /// Log level: debug, info, warn, or error
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Program spawned as the sub-agent CLI
    #[arg(long, default_value = "claude", env = "WILLOW_AGENT_PROGRAM")]
    pub agent_program: String,
}

impl Config {
    pub fn graph_path(&self) -> PathBuf {
        self.graph_path.clone().unwrap_or_else(snapshot::default_path)
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.conversations_dir.clone().unwrap_or_else(|| {
            self.graph_path()
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
                .join("conversations")
        })
    }

    pub fn agent_command(&self) -> AgentCommand {
        AgentCommand {
            program: self.agent_program.clone(),
            ..AgentCommand::default()
        }
    }

    pub fn maintenance_options(&self) -> MaintenanceOptions {
        MaintenanceOptions {
            threshold: self.maintenance_threshold,
            delay: Duration::from_secs(self.maintenance_delay_secs),
            ..MaintenanceOptions::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["willow-server"]);
        assert_eq!(config.maintenance_threshold, 5);
        assert_eq!(config.maintenance_delay_secs, 15);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.agent_program, "claude");
    }

    #[test]
    fn test_conversations_dir_defaults_next_to_snapshot() {
        let config = Config::parse_from([
            "willow-server",
            "--graph-path",
            "/tmp/willow-test/graph.json",
        ]);
        assert_eq!(
            config.conversations_dir(),
            PathBuf::from("/tmp/willow-test/conversations")
        );
    }
}
