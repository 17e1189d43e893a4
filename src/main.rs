//! db-gate - A read-only SQL execution gateway for LLM agents.

mod cli;

use cli::{Cli, Mode};
use db_gate::config::Config;
use db_gate::error::{GateError, Result};
use db_gate::gateway::tool::{self, ToolOutput};
use db_gate::gateway::SqlGateway;
use db_gate::logging;
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

fn main() {
    dotenvy::dotenv().ok();
    logging::init_stderr_logging(logging::DEFAULT_FILTER);

    if let Err(e) = run() {
        error!("{}: {}", e.category(), e.message());
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;
    cli.apply_to(&mut config)?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| GateError::internal(format!("Failed to start runtime: {e}")))?;

    runtime.block_on(async {
        let gateway = SqlGateway::connect(&config).await?;
        let outcome = run_mode(&gateway, cli.mode()).await;
        let closed = gateway.close().await;
        finish(outcome, closed)
    })
}

/// Merges the run result with the pool shutdown result. A run error takes
/// precedence over a close error, which is then only logged.
fn finish(outcome: Result<()>, closed: Result<()>) -> Result<()> {
    if let (Err(_), Err(e)) = (&outcome, &closed) {
        warn!("Failed to close database pool: {}", e);
    }
    outcome.and(closed)
}

async fn run_mode(gateway: &SqlGateway, mode: Mode) -> Result<()> {
    match mode {
        Mode::Execute(sql) => {
            print_output(&gateway.execute(sql).await.into())?;
        }
        Mode::Schema => {
            println!("{}", gateway.describe_schema().await?);
        }
        Mode::Prompt => {
            let schema = gateway.describe_schema().await?;
            println!("{}", tool::system_prompt(gateway.backend(), &schema));
            let tools = serde_json::to_string_pretty(&tool::get_tool_definitions())
                .map_err(|e| GateError::internal(e.to_string()))?;
            println!("{tools}");
        }
        Mode::Repl => repl(gateway, BufReader::new(tokio::io::stdin())).await?,
    }
    Ok(())
}

/// Reads one statement per line until EOF, `exit` or `quit`.
async fn repl<R>(gateway: &SqlGateway, input: R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        print!("> ");
        io::stdout()
            .flush()
            .map_err(|e| GateError::internal(e.to_string()))?;

        let line = lines
            .next_line()
            .await
            .map_err(|e| GateError::internal(format!("Failed to read stdin: {e}")))?;
        let Some(line) = line else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let candidate = db_gate::CandidateStatement::new(input).with_origin("repl");
        print_output(&gateway.execute(candidate).await.into())?;
    }
    Ok(())
}

fn print_output(output: &ToolOutput) -> Result<()> {
    let rendered = match output {
        ToolOutput::Rows(_) => serde_json::to_string_pretty(&output.to_json())
            .map_err(|e| GateError::internal(e.to_string()))?,
        ToolOutput::Error(message) => message.clone(),
    };
    println!("{rendered}");
    Ok(())
}
