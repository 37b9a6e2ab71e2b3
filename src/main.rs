use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod config;
mod controller;
mod device;
mod error;
mod metadata;
mod patch;
mod pipeline;
mod preflight;
mod runner;
mod toolchain;
mod ui;
mod vcs;
mod workspace;

use config::ToolConfig;
use controller::{LoopController, LoopOutcome};
use error::PipelineError;
use runner::{CommandRunner, SystemRunner};
use toolchain::{DecodeOptions, Toolchain};
use workspace::Preparation;

#[derive(Parser)]
#[command(name = "apkloop")]
#[command(
    about = "Decompile an APK, patch it for MITM, and rebuild it in a loop while you edit",
    long_about = None
)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Configuration file (default: <config dir>/apkloop/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Clone)]
struct RunArgs {
    /// Path to the apk
    apk_path: Option<PathBuf>,

    /// Do not decode resources
    #[arg(short = 'r', long)]
    no_res: bool,

    /// Do not decode sources
    #[arg(short = 's', long)]
    no_src: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode, patch and enter the build loop (the default command)
    Run(RunArgs),
    /// Print package info and workspace paths
    Info {
        /// Path to the apk
        apk_path: PathBuf,
    },
    /// Merge a split apk bundle
    Merge {
        /// Path to the xapk/apks/apkm bundle
        xapk_path: PathBuf,
    },
    /// Show the current configuration
    Config {
        /// Write a template configuration file if none exists
        #[arg(long)]
        init: bool,
        /// Open the configuration file in an editor, then validate it
        #[arg(short, long)]
        edit: bool,
    },
    /// Show where each external tool resolves
    Env,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(ToolConfig::default_path);

    match dispatch(cli, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ui::error(format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli, config_path: &Path) -> Result<()> {
    let command = match cli.command {
        Some(command) => command,
        None => Commands::Run(cli.run),
    };

    let runner = SystemRunner;
    match command {
        Commands::Config { init, edit } => handle_config(config_path, init, edit).await,
        Commands::Env => {
            show_env(&ToolConfig::load(config_path)?);
            Ok(())
        }
        Commands::Run(args) => {
            let config = ToolConfig::load(config_path)?;
            run_lifecycle(&Toolchain::new(&config, &runner), args).await
        }
        Commands::Info { apk_path } => {
            let config = ToolConfig::load(config_path)?;
            show_info(&Toolchain::new(&config, &runner), &apk_path).await
        }
        Commands::Merge { xapk_path } => {
            let config = ToolConfig::load(config_path)?;
            merge(&Toolchain::new(&config, &runner), &xapk_path).await
        }
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PipelineError::MissingPath(path.to_path_buf()).into());
    }
    Ok(())
}

async fn resolve_session<R: CommandRunner>(
    tools: &Toolchain<'_, R>,
    apk_path: &Path,
) -> Result<metadata::WorkspaceSession> {
    let dump = tools.inspect(apk_path).await?;
    let session = metadata::resolve_streams(&dump.stdout, &dump.stderr, apk_path)?;
    Ok(session)
}

async fn show_info<R: CommandRunner>(tools: &Toolchain<'_, R>, apk_path: &Path) -> Result<()> {
    ensure_exists(apk_path)?;
    let session = resolve_session(tools, apk_path).await?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

async fn merge<R: CommandRunner>(tools: &Toolchain<'_, R>, xapk_path: &Path) -> Result<()> {
    ensure_exists(xapk_path)?;
    ui::step(
        "Merging split apk",
        tools.run("Merging split apk", &tools.merge_invocation(xapk_path)),
    )
    .await?;
    ui::success("apk merged");
    Ok(())
}

async fn run_lifecycle<R: CommandRunner>(tools: &Toolchain<'_, R>, args: RunArgs) -> Result<()> {
    let apk_path = args
        .apk_path
        .context("missing <APK_PATH>; see `apkloop --help`")?;

    ensure_exists(&apk_path)?;
    preflight::check(tools.config)?;

    ui::info("get package info");
    let session = resolve_session(tools, &apk_path).await?;
    info!(
        "{} {} → {}",
        session.identity.name,
        session.identity.version,
        session.paths.root.display()
    );

    let options = DecodeOptions {
        skip_resources: args.no_res,
        skip_sources: args.no_src,
    };
    if !session.paths.root.exists() {
        preflight::check_init(tools.config)?;
    }
    match workspace::prepare(tools, &session, options).await? {
        Preparation::Initialized => info!("Workspace initialized"),
        Preparation::Reused => info!("Reusing workspace {}", session.paths.root.display()),
    }

    ui::info("build loop");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let outcome = LoopController::new(tools, &session, stdin)
        .run(&mut std::io::stdout())
        .await?;
    if let LoopOutcome::Quit = outcome {
        warn!("Left the build loop without writing a patch");
    }
    Ok(())
}

async fn handle_config(config_path: &Path, init: bool, edit: bool) -> Result<()> {
    if init {
        if config_path.exists() {
            warn!("Configuration file already exists!");
        } else {
            if let Some(dir) = config_path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            let template = serde_json::to_string_pretty(&ToolConfig::template())?;
            tokio::fs::write(config_path, template).await?;
            ui::success(format!("Created configuration file: {}", config_path.display()));
        }
    }

    if edit {
        let editor = std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .unwrap_or_else(|_| "vim".to_string());
        let invocation = runner::Invocation::new(&editor).arg(config_path);
        let success = SystemRunner
            .interactive(&invocation)
            .await
            .with_context(|| format!("Error editing configuration with {editor}"))?;
        if !success {
            anyhow::bail!("{editor} exited unsuccessfully");
        }
        ToolConfig::load(config_path)?;
        ui::success("Configuration updated successfully!");
    }

    let config = ToolConfig::load(config_path)?;
    ui::info(format!("Configuration: {}", config_path.display()));
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn show_env(config: &ToolConfig) {
    for (name, value) in config.tools() {
        match which::which(&value) {
            Ok(path) => println!("{name:>16}: {value} ({})", path.display()),
            Err(_) => println!("{name:>16}: {value} (not found)"),
        }
    }
    for (name, path) in config.jars() {
        let state = if path.exists() { "ok" } else { "missing" };
        println!("{name:>16}: {} ({state})", path.display());
    }
    println!("{:>16}: {}", "patches", config.output_patch_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use crate::runner::CommandOutput;

    #[tokio::test]
    async fn missing_apk_fails_before_any_tool_runs() {
        let config = ToolConfig::default();
        let runner = ScriptedRunner::new(|_| CommandOutput::ok(""));
        let tools = Toolchain::new(&config, &runner);
        let args = RunArgs {
            apk_path: Some(PathBuf::from("/nonexistent/app.apk")),
            no_res: false,
            no_src: false,
        };

        let err = run_lifecycle(&tools, args).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingPath(_))
        ));
        assert!(runner.calls.borrow().is_empty());
    }
}
