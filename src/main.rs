//! scratchpad-runner
//!
//! `serve` runs the code execution service; `run` executes one file the way
//! the editor's Run button does. Configuration comes from
//! `SCRATCHPAD_CONFIG` (JSON) and a few plain environment variables.

use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use scratchpad_runner::client::{Backend, RunRouter};
use scratchpad_runner::config::Config;
use scratchpad_runner::dispatcher::Dispatcher;
use scratchpad_runner::hosted::HostedClient;
use scratchpad_runner::language::Language;
use scratchpad_runner::local::LocalEvaluator;
use scratchpad_runner::server::{ExecuteResponse, ExecutionServer};

#[derive(Parser, Debug)]
#[command(name = "scratchpad-runner")]
#[command(about = "Build and run editor code snippets")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve `POST /execute` over HTTP
    Serve {
        /// Listen address (overrides config and PORT)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run one program and print its output
    Run {
        /// python, java, cpp or javascript
        #[arg(long, short)]
        language: String,

        /// Source file (reads stdin when omitted)
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// Input passed to the program (hosted API only)
        #[arg(long, default_value = "")]
        stdin: String,

        /// Send non-JavaScript code to the hosted API instead of running it here
        #[arg(long)]
        hosted: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so `run` output stays clean on stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::from_env().context("Failed to load configuration")?;

    match args.command {
        Cmd::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            info!(
                bind = %config.bind,
                work_root = %config.work_root.display(),
                "Loaded configuration"
            );
            let server = ExecutionServer::new(Dispatcher::new(&config));
            server.serve(config.bind).await?;
        }
        Cmd::Run {
            language,
            file,
            stdin,
            hosted,
        } => {
            let language: Language = language.parse()?;
            let code = read_source(file.as_ref())?;

            let backend = if hosted {
                Backend::Hosted(HostedClient::new(&config.hosted_url))
            } else {
                Backend::Service(Dispatcher::new(&config))
            };
            let router = RunRouter::new(LocalEvaluator::new(&config.local), backend);

            match router.run(language, &code, &stdin).await {
                ExecuteResponse::Output { output } => print!("{output}"),
                ExecuteResponse::Error { error, .. } => {
                    eprintln!("{error}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn read_source(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut code = String::new();
            std::io::stdin()
                .read_to_string(&mut code)
                .context("Failed to read source from stdin")?;
            Ok(code)
        }
    }
}
