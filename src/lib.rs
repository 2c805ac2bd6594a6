//! ERP Query Agent Library
//!
//! Answers natural-language questions against an Odoo PostgreSQL database
//! reached through an SSH tunnel. Generated SQL passes a read-only safety gate
//! and runs in a read-only session with a statement timeout.

pub mod agent;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod generator;
pub mod models;
pub mod safety;
pub mod tunnel;

pub use agent::{Agent, Answer};
pub use config::Config;
pub use error::{AgentError, AgentResult};
pub use generator::{CommandGenerator, SqlGenerator};
