//! Configuration handling for the ERP query agent.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::db::{DatabaseSettings, RetryPolicy};
use crate::safety::QueryGate;
use crate::tunnel::SshSettings;
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_SSH_KEY_PATH: &str = "~/.ssh/ai_agent_id_ed25519";
pub const DEFAULT_REMOTE_DB_HOST: &str = "localhost";
pub const DEFAULT_REMOTE_DB_PORT: u16 = 5432;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ROW_LIMIT: u32 = 100;
pub const DEFAULT_CONTEXT_TABLES: usize = 10;
pub const DEFAULT_CONNECT_RETRIES: u32 = 5;

/// Configuration for the ERP query agent.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "erp-query-agent",
    about = "Query an ERP database with natural language through an SSH tunnel",
    version,
    author
)]
pub struct Config {
    /// Natural language question to ask about the database
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Run in interactive mode
    #[arg(short, long)]
    pub interactive: bool,

    /// Test the database connection and exit
    #[arg(long)]
    pub test_connection: bool,

    /// Run this SQL through the safety gate instead of generating it
    #[arg(long, value_name = "SQL", conflicts_with = "interactive")]
    pub sql: Option<String>,

    /// Print the schema context selected for the question before answering
    #[arg(long)]
    pub show_context: bool,

    /// SSH host that can reach the database
    #[arg(long, default_value = "", env = "ERP_SSH_HOST")]
    pub ssh_host: String,

    /// SSH port
    #[arg(long, default_value_t = DEFAULT_SSH_PORT, env = "ERP_SSH_PORT")]
    pub ssh_port: u16,

    /// SSH username
    #[arg(long, default_value = "", env = "ERP_SSH_USERNAME")]
    pub ssh_username: String,

    /// Private key file (Ed25519 or RSA, unencrypted)
    #[arg(long, default_value = DEFAULT_SSH_KEY_PATH, env = "ERP_SSH_KEY_PATH")]
    pub ssh_key_path: String,

    /// Database host as seen from the SSH host
    #[arg(long, default_value = DEFAULT_REMOTE_DB_HOST, env = "ERP_DB_REMOTE_HOST")]
    pub remote_db_host: String,

    /// Database port as seen from the SSH host
    #[arg(long, default_value_t = DEFAULT_REMOTE_DB_PORT, env = "ERP_DB_REMOTE_PORT")]
    pub remote_db_port: u16,

    /// Database name
    #[arg(long, default_value = "", env = "ERP_DB_NAME")]
    pub db_name: String,

    /// Database user (defaults to the SSH username)
    #[arg(long, env = "ERP_DB_USER")]
    pub db_user: Option<String>,

    /// Database password (defaults to empty)
    #[arg(long, env = "ERP_DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Statement timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "ERP_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// LIMIT appended to queries that have none
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT, env = "ERP_ROW_LIMIT")]
    pub row_limit: u32,

    /// Maximum number of tables included in the generator context
    #[arg(
        long,
        default_value_t = DEFAULT_CONTEXT_TABLES,
        env = "ERP_CONTEXT_TABLES"
    )]
    pub context_tables: usize,

    /// Connection attempts while the tunnel listener comes up
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_RETRIES,
        env = "ERP_CONNECT_RETRIES"
    )]
    pub connect_retries: u32,

    /// Additionally parse SQL and require a single query statement
    #[arg(long, env = "ERP_STRICT_SQL")]
    pub strict_sql: bool,

    /// External command that turns a question into SQL.
    /// Receives {"question", "schema_context"} as JSON on stdin, prints SQL on stdout.
    #[arg(long, value_name = "COMMAND", env = "ERP_GENERATOR_CMD")]
    pub generator: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "ERP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "ERP_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            question: None,
            interactive: false,
            test_connection: false,
            sql: None,
            show_context: false,
            ssh_host: String::new(),
            ssh_port: DEFAULT_SSH_PORT,
            ssh_username: String::new(),
            ssh_key_path: DEFAULT_SSH_KEY_PATH.to_string(),
            remote_db_host: DEFAULT_REMOTE_DB_HOST.to_string(),
            remote_db_port: DEFAULT_REMOTE_DB_PORT,
            db_name: String::new(),
            db_user: None,
            db_password: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            row_limit: DEFAULT_ROW_LIMIT,
            context_tables: DEFAULT_CONTEXT_TABLES,
            connect_retries: DEFAULT_CONNECT_RETRIES,
            strict_sql: false,
            generator: None,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.ssh_host.trim().is_empty() {
            return Err("SSH host is required (--ssh-host or ERP_SSH_HOST)".to_string());
        }
        if self.ssh_username.trim().is_empty() {
            return Err("SSH username is required (--ssh-username or ERP_SSH_USERNAME)".to_string());
        }
        if self.db_name.trim().is_empty() {
            return Err("Database name is required (--db-name or ERP_DB_NAME)".to_string());
        }
        if self.query_timeout == 0 {
            return Err("query_timeout must be greater than 0".to_string());
        }
        if self.row_limit == 0 {
            return Err("row_limit must be greater than 0".to_string());
        }
        if self.context_tables == 0 {
            return Err("context_tables must be greater than 0".to_string());
        }
        if self.connect_retries == 0 {
            return Err("connect_retries must be greater than 0".to_string());
        }
        Ok(())
    }

    /// SSH connection settings for the tunnel.
    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            host: self.ssh_host.clone(),
            port: self.ssh_port,
            username: self.ssh_username.clone(),
            key_path: expand_home(&self.ssh_key_path),
            remote_host: self.remote_db_host.clone(),
            remote_port: self.remote_db_port,
        }
    }

    /// Database credentials used once the tunnel is up.
    pub fn database_settings(&self) -> DatabaseSettings {
        DatabaseSettings {
            database: self.db_name.clone(),
            user: self
                .db_user
                .clone()
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| self.ssh_username.clone()),
            password: self.db_password.clone().unwrap_or_default(),
        }
    }

    /// Backoff policy for connecting through a freshly started tunnel.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.connect_retries,
            ..RetryPolicy::default()
        }
    }

    /// Safety gate configured with the row limit and parse mode.
    pub fn query_gate(&self) -> QueryGate {
        QueryGate::new(self.row_limit).with_strict_parsing(self.strict_sql)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Expand a leading `~` to the current user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            ssh_host: "erp.example.com".to_string(),
            ssh_username: "odoo".to_string(),
            db_name: "erp_prod".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ssh_port, DEFAULT_SSH_PORT);
        assert_eq!(config.remote_db_port, DEFAULT_REMOTE_DB_PORT);
        assert_eq!(config.query_timeout, DEFAULT_QUERY_TIMEOUT_SECS);
        assert_eq!(config.row_limit, DEFAULT_ROW_LIMIT);
        assert_eq!(config.context_tables, DEFAULT_CONTEXT_TABLES);
        assert!(!config.strict_sql);
    }

    #[test]
    fn test_validate_requires_connection_details() {
        assert!(Config::default().validate().is_err());
        assert!(valid_config().validate().is_ok());

        let config = Config {
            db_name: " ".to_string(),
            ..valid_config()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("Database name"));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = Config {
            row_limit: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());

        let config = Config {
            query_timeout: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_user_defaults_to_ssh_username() {
        let settings = valid_config().database_settings();
        assert_eq!(settings.user, "odoo");
        assert_eq!(settings.password, "");

        let config = Config {
            db_user: Some("reporting".to_string()),
            db_password: Some("secret".to_string()),
            ..valid_config()
        };
        let settings = config.database_settings();
        assert_eq!(settings.user, "reporting");
        assert_eq!(settings.password, "secret");
    }

    #[test]
    fn test_ssh_settings_carry_remote_endpoint() {
        let config = Config {
            remote_db_port: 6432,
            ..valid_config()
        };
        let ssh = config.ssh_settings();
        assert_eq!(ssh.host, "erp.example.com");
        assert_eq!(ssh.remote_host, "localhost");
        assert_eq!(ssh.remote_port, 6432);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/etc/key"), PathBuf::from("/etc/key"));
        assert_eq!(expand_home("relative/key"), PathBuf::from("relative/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.ssh/id"), home.join(".ssh/id"));
        }
    }

    #[test]
    fn test_retry_policy_uses_connect_retries() {
        let config = Config {
            connect_retries: 9,
            ..Config::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 9);
    }
}
