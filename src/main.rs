//! ERP Query Agent - Main entry point.
//!
//! Opens the SSH tunnel, then answers one question, runs operator SQL, checks
//! the connection, or runs an interactive loop. The tunnel is stopped on every
//! exit path, Ctrl-C included.

use erp_query_agent::config::Config;
use erp_query_agent::format::format_result;
use erp_query_agent::{Agent, AgentError, Answer, CommandGenerator};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const EXIT_WORDS: &[&str] = &["exit", "quit", "q"];

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so result tables on stdout stay clean.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn report_error(err: &AgentError) {
    eprintln!("Error: {}", err);
    if let Some(suggestion) = err.suggestion() {
        eprintln!("Hint: {}", suggestion);
    }
    if let Some(sql) = err.sql() {
        eprintln!("SQL:\n{}", sql);
    }
}

fn print_answer(answer: &Answer) {
    println!("\nExecuted SQL:\n{}\n", answer.sql);
    print!("{}", format_result(&answer.result));
    let _ = std::io::stdout().flush();
}

fn generator(config: &Config) -> Result<CommandGenerator, AgentError> {
    let command = config.generator.as_deref().ok_or_else(|| {
        AgentError::invalid_input(
            "No SQL generator configured (--generator or ERP_GENERATOR_CMD)",
        )
    })?;
    CommandGenerator::from_command_line(command)
}

/// Answer one question, printing the result or the error. Returns success.
async fn answer_question(
    agent: &mut Agent,
    generator: &CommandGenerator,
    question: &str,
    show_context: bool,
) -> bool {
    if show_context {
        if !agent.schema().is_discovered() {
            if let Err(e) = agent.discover_schema().await {
                report_error(&e);
                return false;
            }
        }
        println!("Schema context:{}", agent.relevant_context(question));
    }

    let sql = match agent.generate_sql(question, generator).await {
        Ok(sql) => sql,
        Err(e) => {
            report_error(&e);
            return false;
        }
    };
    println!("Generated SQL:\n{}", sql);

    match agent.run_sql(&sql).await {
        Ok(answer) => {
            print_answer(&answer);
            true
        }
        Err(e) => {
            report_error(&e);
            if e.sql().is_none() {
                eprintln!("SQL:\n{}", sql);
            }
            false
        }
    }
}

async fn interactive(agent: &mut Agent, generator: &CommandGenerator, show_context: bool) -> bool {
    println!("ERP query agent. Type a question, or 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\nQuestion: ");
        let _ = std::io::stdout().flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "Failed to read from stdin");
                return false;
            }
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&question.to_lowercase().as_str()) {
            break;
        }

        answer_question(agent, generator, question, show_context).await;
    }
    true
}

/// Whether Ctrl-C counts as a clean exit. Only the interactive loop ends
/// cleanly on interrupt.
fn interrupt_is_success(config: &Config) -> bool {
    config.interactive && config.sql.is_none() && !config.test_connection
}

async fn run(agent: &mut Agent, config: &Config) -> bool {
    if config.test_connection {
        return match agent.test_connection().await {
            Ok(version) => {
                println!("Connected: {}", version);
                true
            }
            Err(e) => {
                report_error(&e);
                false
            }
        };
    }

    if let Some(sql) = &config.sql {
        return match agent.run_sql(sql).await {
            Ok(answer) => {
                print_answer(&answer);
                true
            }
            Err(e) => {
                report_error(&e);
                false
            }
        };
    }

    let generator = match generator(config) {
        Ok(generator) => generator,
        Err(e) => {
            report_error(&e);
            return false;
        }
    };

    if config.interactive {
        return interactive(agent, &generator, config.show_context).await;
    }

    match &config.question {
        Some(question) => answer_question(agent, &generator, question, config.show_context).await,
        None => {
            eprintln!("Error: provide a QUESTION, --interactive, --sql or --test-connection");
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();

    init_tracing(&config);

    if let Err(message) = config.validate() {
        eprintln!("Error: {}", message);
        eprintln!();
        eprintln!("Usage: erp-query-agent --ssh-host <host> --ssh-username <user> --db-name <db> <QUESTION>");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  erp-query-agent --test-connection");
        eprintln!("  erp-query-agent --generator 'python3 gen.py' \"total sales this month\"");
        eprintln!("  erp-query-agent --sql \"SELECT name FROM res_partner\"");
        eprintln!("  erp-query-agent --interactive --show-context");
        std::process::exit(1);
    }

    info!(
        host = %config.ssh_host,
        database = %config.db_name,
        "Starting ERP query agent v{}",
        env!("CARGO_PKG_VERSION")
    );

    let mut agent = Agent::new(&config);
    if let Err(e) = agent.start_tunnel().await {
        error!(error = %e, "Failed to start SSH tunnel");
        report_error(&e);
        std::process::exit(1);
    }

    let succeeded = tokio::select! {
        ok = run(&mut agent, &config) => ok,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
            interrupt_is_success(&config)
        }
    };

    agent.stop_tunnel().await;
    info!("Shutdown complete");

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
