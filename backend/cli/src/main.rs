mod api;
mod integrations_cmd;
mod run_cmd;
mod sessions_cmd;
mod terminal_output;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use conductor_agent::{AgentInvoker, CliQueryRunner};
use conductor_config::Settings;
use conductor_logging::{init_logger, ConsoleTarget, LoggerOptions};
use conductor_mcp::{McpServer, ToolRouter};
use conductor_session::SessionLayout;
use conductor_tools::standard_handlers;

use api::AppState;
use run_cmd::RunArgs;
use sessions_cmd::SessionCommands;
use terminal_output::note_error;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Conductor: run, track and orchestrate external coding agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session of the external agent CLI
    Launch { agent: String, prompt: String },
    /// Run an agent non-interactively and record the session
    Run {
        agent: String,
        prompt: Option<String>,
        /// Abort the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Continue an existing session instead of creating one
        #[arg(long = "continue", value_name = "SESSION_ID")]
        continue_session: Option<String>,
        /// Do not write the streaming log file
        #[arg(long)]
        no_stream_file: bool,
    },
    /// Send a follow-up prompt to an existing session
    Continue { session_id: String, prompt: String },
    /// Serve the tool namespaces over MCP on stdio
    Mcp,
    /// Start the HTTP status API
    Serve {
        /// Port to bind the HTTP server to
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Ask a running server for its health
    Status,
    /// Inspect recorded sessions
    #[command(subcommand)]
    Sessions(SessionCommands),
    /// Show integrations and whether their environment is complete
    Integrations,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            note_error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load().await?;
    let config = &settings.config;

    init_logger(&LoggerOptions {
        level: config.log_level.clone(),
        console: match cli.command {
            Commands::Mcp => ConsoleTarget::Stderr,
            _ => ConsoleTarget::Stdout,
        },
        log_dir: config.log_dir.clone(),
    });

    let runner = Arc::new(
        CliQueryRunner::new(config.query_command.clone()).with_env(settings.env.file_vars()),
    );
    let invoker = AgentInvoker::from_settings(&settings, runner);

    match cli.command {
        Commands::Launch { agent, prompt } => run_cmd::launch(&settings, &agent, &prompt).await,
        Commands::Run {
            agent,
            prompt,
            timeout,
            continue_session,
            no_stream_file,
        } => {
            let args = RunArgs {
                agent,
                prompt,
                timeout_secs: timeout,
                continue_session_id: continue_session,
                no_stream_file,
            };
            run_cmd::run(&invoker, args).await
        }
        Commands::Continue { session_id, prompt } => {
            run_cmd::continue_session(&invoker, session_id, prompt).await
        }
        Commands::Mcp => {
            let router = ToolRouter::with_handlers(standard_handlers(config, invoker))?;
            info!(tools = router.definitions().len(), "MCP server listening on stdio");
            McpServer::new(router).serve_stdio().await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            serve(&settings, invoker, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => status(&settings).await,
        Commands::Sessions(cmd) => {
            let layout = SessionLayout::new(&config.output_dir, &config.reports_dir);
            sessions_cmd::run(layout, cmd).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Integrations => {
            integrations_cmd::run(&settings.integrations, &settings.env);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn serve(settings: &Settings, invoker: AgentInvoker, port: u16) -> Result<()> {
    let state = AppState {
        invoker,
        plans_dir: settings.config.plans_dir.clone(),
    };
    let app = api::build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", settings.config.bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Conductor API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn status(settings: &Settings) -> Result<ExitCode> {
    let url = format!(
        "http://{}:{}/api/health",
        settings.config.bind_address, settings.config.port
    );
    match reqwest::get(&url).await {
        Ok(resp) => {
            let body: serde_json::Value = resp.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(_) => {
            note_error(&format!("Conductor is not running at {url}"));
            Ok(ExitCode::FAILURE)
        }
    }
}
