use std::path::{Path, PathBuf};
use std::process::Command;

use devlink_core::{LinkError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl ResolverCommand {
    /// `update` restricted to `package_names`, with plugins, scripts and
    /// audits disabled for the child run.
    pub fn update_packages(program: &str, project_root: &Path, package_names: &[&str]) -> Self {
        let mut args = vec![
            "--no-plugins".to_string(),
            "--no-scripts".to_string(),
            format!("--working-dir={}", project_root.display()),
            "update".to_string(),
            "--no-audit".to_string(),
        ];
        args.extend(package_names.iter().map(|name| name.to_string()));

        Self {
            program: program.to_string(),
            args,
            working_dir: project_root.to_path_buf(),
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Subprocess facility the resolver step runs through.
pub trait ProcessExecutor {
    fn execute(&mut self, command: &ResolverCommand) -> Result<ProcessOutput>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessExecutor;

impl ProcessExecutor for SystemProcessExecutor {
    fn execute(&mut self, command: &ResolverCommand) -> Result<ProcessOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_dir)
            .output()
            .map_err(|source| LinkError::ResolverLaunch {
                command: command.command_line(),
                source,
            })?;

        Ok(ProcessOutput {
            // Terminated by a signal.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
