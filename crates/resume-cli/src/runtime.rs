// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use resume_app::UNKNOWN_PROJECT;
use resume_tui::ResumeTarget;
use std::path::Path;
use std::process::{Command, Stdio};

/// `<program> --resume <id>`, run from the project directory when it is known
/// and attached to this terminal.
pub fn resume_command(program: &str, target: &ResumeTarget) -> Command {
    let mut command = Command::new(program);
    command
        .arg("--resume")
        .arg(&target.session_id)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    if has_project_dir(&target.project_path) {
        command.current_dir(&target.project_path);
    }
    command
}

pub fn launch_resume(program: &str, target: &ResumeTarget) -> Result<()> {
    if has_project_dir(&target.project_path) && !Path::new(&target.project_path).is_dir() {
        bail!(
            "project directory {} no longer exists; cannot resume session {}",
            target.project_path,
            target.session_id
        );
    }

    tracing::info!(
        session_id = %target.session_id,
        project_path = %target.project_path,
        program,
        "resuming session"
    );
    let status = resume_command(program, target)
        .status()
        .with_context(|| format!("run `{program} --resume {}`", target.session_id))?;
    if !status.success() {
        bail!(
            "`{program} --resume {}` exited with {status}",
            target.session_id
        );
    }
    Ok(())
}

fn has_project_dir(project_path: &str) -> bool {
    !project_path.is_empty() && project_path != UNKNOWN_PROJECT
}
