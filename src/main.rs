use std::panic;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::core::domain::ExecutionResult;
use crate::core::glitch::{GlitchInfo, classify};
use crate::core::runtime::SandboxRuntime;
use crate::core::session::{QuestSession, RunReport, SubmitOutcome};
use crate::core::traits::executor::CodeExecutor;
use crate::core::traits::quests::QuestSource;
use crate::native::python_host::PythonHostLoader;
use crate::native::quests::FsQuestSource;
use crate::native::submission::HttpSubmissionClient;

mod config;
mod constants;
mod core;
mod native;

#[cfg(test)]
mod stubs;

const SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "codequest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run, check and submit CodeQuest solutions in a Python sandbox", long_about = None)]
struct Cli {
    /// Print machine-readable JSON instead of terminal output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a Python file in the sandbox
    Run { file: PathBuf },

    /// Run a file and grade it against a quest's hidden tests
    Check {
        #[arg(short, long)]
        quest: String,
        file: PathBuf,
    },

    /// Check a file and, when every test passes, submit it for XP
    Submit {
        #[arg(short, long)]
        quest: String,
        file: PathBuf,
    },

    /// Print a quest's starter code
    Starter {
        #[arg(short, long)]
        quest: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env().context("Invalid configuration")?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let quests = FsQuestSource::new(&config.content_dir);

    match cli.command {
        Commands::Run { file } => {
            let code = read_code(&file).await?;
            let runtime = start_runtime(&config).await?;
            let execution = runtime.execute(&code).await;
            print_execution(&execution, cli.json)
        }
        Commands::Check { quest, file } => {
            let code = read_code(&file).await?;
            let mut session = open_session(&config, &quests, &quest).await?;
            let report = session.run(&code).await;
            print_report(&report, cli.json)
        }
        Commands::Submit { quest, file } => {
            let code = read_code(&file).await?;
            let mut session = open_session(&config, &quests, &quest).await?;
            let report = session.run(&code).await;
            if !report.all_passed() {
                return print_report(&report, cli.json);
            }
            if !cli.json {
                print_report(&report, false)?;
            }
            let outcome = session.submit(&code).await?;
            print_outcome(&outcome, cli.json)
        }
        Commands::Starter { quest } => {
            let starter = quests
                .starter_code(&quest)
                .await
                .with_context(|| format!("Failed to load quest {quest}"))?;
            println!("{starter}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn read_code(file: &Path) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))
}

#[tracing::instrument(skip(config))]
async fn start_runtime(config: &Config) -> Result<Arc<SandboxRuntime>> {
    let loader = PythonHostLoader::new(&config.python, config.load_timeout);
    let runtime = SandboxRuntime::with_timeout(Arc::new(loader), config.execution_timeout);
    runtime.ensure_ready().await?;
    Ok(Arc::new(runtime))
}

async fn open_session(config: &Config, quests: &FsQuestSource, quest_id: &str) -> Result<QuestSession> {
    let bundle = quests
        .bundle(quest_id)
        .await
        .with_context(|| format!("Failed to load quest {quest_id}"))?;
    let submitter = HttpSubmissionClient::new(
        &config.backend_api_url,
        config.internal_api_key.clone(),
        SUBMISSION_TIMEOUT,
    )?;
    let runtime = start_runtime(config).await?;

    Ok(QuestSession::new(bundle, runtime, Arc::new(submitter)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn print_glitch(glitch: &GlitchInfo) {
    eprintln!("[{:?}] {}: {}", glitch.category, glitch.error_kind, glitch.hint);
}

fn print_execution(execution: &ExecutionResult, json: bool) -> Result<ExitCode> {
    let glitch = (!execution.succeeded()).then(|| classify(execution.standard_error()));

    if json {
        #[derive(Serialize)]
        struct RunOutput<'a> {
            execution: &'a ExecutionResult,
            glitch: Option<GlitchInfo>,
        }
        print_json(&RunOutput { execution, glitch })?;
    } else {
        print!("{}", execution.standard_output());
        if let Some(glitch) = &glitch {
            eprintln!("{}", execution.standard_error().trim_end());
            print_glitch(glitch);
        }
    }

    Ok(exit_code(execution.succeeded()))
}

fn print_report(report: &RunReport, json: bool) -> Result<ExitCode> {
    if json {
        print_json(report)?;
    } else {
        print!("{}", report.execution.standard_output());
        if !report.execution.succeeded() {
            eprintln!("{}", report.execution.standard_error().trim_end());
        }
        print!("{}", report.summary());
        if let Some(glitch) = &report.glitch {
            print_glitch(glitch);
        }
    }

    Ok(exit_code(report.all_passed()))
}

fn print_outcome(outcome: &SubmitOutcome, json: bool) -> Result<ExitCode> {
    if json {
        print_json(outcome)?;
        return Ok(exit_code(matches!(outcome, SubmitOutcome::Accepted { .. })));
    }

    match outcome {
        SubmitOutcome::Accepted {
            xp_earned,
            level_up,
            new_level,
            unlocked_badges,
            feedback,
        } => {
            println!("{feedback} +{xp_earned} XP");
            if *level_up {
                match new_level {
                    Some(level) => println!("Level up! You reached level {level}."),
                    None => println!("Level up!"),
                }
            }
            for badge in unlocked_badges {
                println!("Badge unlocked: {badge}");
            }
            Ok(ExitCode::SUCCESS)
        }
        SubmitOutcome::Rejected { glitch } => {
            print_glitch(glitch);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
