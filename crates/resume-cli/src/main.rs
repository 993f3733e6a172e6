// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;
mod show;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use resume_db::CatalogStore;
use resume_fetch::FetchBridge;
use show::Listing;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(
    name = "claude-resume",
    version,
    about = "Browse and resume recent Claude Code sessions"
)]
struct Cli {
    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Read session logs from this directory instead of ~/.claude/projects
    #[arg(long, global = true, value_name = "DIR")]
    projects_dir: Option<String>,

    /// List projects and sample sessions without the TUI
    #[arg(long)]
    debug: bool,

    /// Print the resolved config path
    #[arg(long)]
    print_config_path: bool,

    /// Print a v1 config template
    #[arg(long)]
    print_example_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Show projects, a project's sessions, or a session's messages without the TUI
    Show {
        project: Option<String>,
        session_id: Option<String>,
    },
    /// Print a session's summary and raw user messages
    DebugSession { session_id: String },
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };

    if cli.print_config_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if cli.print_example_config {
        print!("{}", Config::example_config(&config_path));
        return Ok(());
    }

    let config = Config::load(&config_path).with_context(|| {
        format!(
            "load config {}; run `claude-resume --print-example-config` to generate a v1 template",
            config_path.display()
        )
    })?;

    let _logging = match logging::init_logging() {
        Ok(handle) => Some(handle),
        Err(error) => {
            eprintln!("warning: logging disabled: {error:#}");
            None
        }
    };

    let projects_dir = match &cli.projects_dir {
        Some(raw) => resume_db::resolve_projects_dir(raw)?,
        None => config.projects_dir()?,
    };
    let store = CatalogStore::open(&projects_dir)
        .with_context(|| {
            format!(
                "open session catalog for {} -- if this path is wrong, set [catalog].projects_dir or {}",
                projects_dir.display(),
                resume_db::PROJECTS_DIR_ENV
            )
        })?
        .with_limits(config.project_limit(), config.session_limit());
    let deadlines = config.deadlines()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Some(Command::Show {
            project,
            session_id,
        }) => Listing::new(&store, deadlines).show(
            &mut out,
            project.as_deref(),
            session_id.as_deref(),
        )?,
        Some(Command::DebugSession { session_id }) => {
            let debug = store
                .debug_session(&session_id)
                .with_context(|| format!("debug session {session_id}"))?;
            show::write_session_debug(&mut out, &debug)?;
        }
        None if cli.debug => Listing::new(&store, deadlines).write_debug_overview(&mut out)?,
        None => {
            drop(out);
            let mut bridge = FetchBridge::new(Arc::new(store), deadlines);
            let target = resume_tui::run_app(&mut bridge)?;
            drop(bridge);
            if let Some(target) = target {
                runtime::launch_resume(config.resume_command(), &target)?;
            }
            return Ok(());
        }
    }
    out.flush().context("flush output")
}
