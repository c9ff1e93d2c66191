use std::path::{Path, PathBuf};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use devlink_core::PackagePathIndex;
use devlink_linker::{CycleOutcome, LinkReport, ResolverStatus};
use indicatif::{ProgressBar, ProgressStyle};

use crate::dispatch::is_restore_failure;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(plain_requested: bool, stdout_is_tty: bool) -> OutputStyle {
    if plain_requested || !stdout_is_tty {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    /// Status lines go to stderr so stdout stays clean for piped output.
    pub(crate) fn print_status(self, status: &str, message: &str) {
        let line = match self.style {
            OutputStyle::Plain => render_status_line(self.style, status, message),
            OutputStyle::Rich => format!(
                "{} {message}",
                colorize(status_style(status), &status_badge(status))
            ),
        };
        eprintln!("{line}");
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn print_error(self, err: &anyhow::Error) {
        self.print_status("err", &format!("{err:#}"));
        if is_restore_failure(err) {
            self.print_status(
                "warn",
                "composer.json and composer.lock may not match their state before this run",
            );
        }
    }

    pub(crate) fn start_spinner(self, label: &str) -> Option<ProgressBar> {
        if self.style != OutputStyle::Rich {
            return None;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg} {elapsed}") {
            spinner.set_style(style.tick_chars("<^>v "));
        }
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        Some(spinner)
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!("{} {message}", status_badge(status)),
    }
}

fn status_badge(status: &str) -> String {
    format!("[{}]", status.to_ascii_uppercase())
}

fn status_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "err" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

/// `(status, message)` pairs for a finished post-resolve cycle.
pub(crate) fn format_cycle_outcome(outcome: &CycleOutcome) -> Vec<(&'static str, String)> {
    match outcome {
        CycleOutcome::NoLocalPackages => {
            vec![("info", "no local packages found, nothing to link".to_string())]
        }
        CycleOutcome::Linked(LinkReport {
            packages,
            resolver: ResolverStatus::Succeeded,
            ..
        }) => vec![("ok", format!("linked dev packages: {}", packages.join(" ")))],
        CycleOutcome::Linked(LinkReport {
            packages,
            command_line,
            resolver: ResolverStatus::Failed { exit_code, stderr },
        }) => {
            let mut lines = vec![(
                "err",
                format!(
                    "could not link dev packages: {} (exit code {exit_code})",
                    packages.join(" ")
                ),
            )];
            lines.push(("err", format!("command: {command_line}")));
            lines.extend(
                stderr
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| ("err", line.to_string())),
            );
            lines.push((
                "info",
                "composer.json and composer.lock were restored".to_string(),
            ));
            lines
        }
    }
}

pub(crate) fn format_cleanup_lines(removed: &[PathBuf], root: &Path) -> Vec<(&'static str, String)> {
    if removed.is_empty() {
        return vec![("info", "no stale package links found".to_string())];
    }
    removed
        .iter()
        .map(|path| ("ok", format!("removed package link {}", display_relative(path, root))))
        .collect()
}

/// One `name -> path` line per package, then one warning per duplicate.
pub(crate) fn format_package_list(index: &PackagePathIndex, root: &Path) -> Vec<String> {
    let mut lines: Vec<String> = index
        .iter()
        .map(|(name, path)| format!("{name} -> {}", display_relative(path, root)))
        .collect();
    lines.extend(index.duplicates().iter().map(|duplicate| {
        format!(
            "warning: {} declared again, {} replaces {}",
            duplicate.name,
            display_relative(&duplicate.kept, root),
            display_relative(&duplicate.replaced, root)
        )
    }));
    lines
}

fn display_relative(path: &Path, root: &Path) -> String {
    let Ok(relative) = path.strip_prefix(root) else {
        return path.display().to_string();
    };
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
