//! sqlrack: a headless command assembler and run supervisor for sqlmap.
//!
//! This is the entry point of the application. It parses command-line
//! arguments, loads the optional TOML profile, assembles the sqlmap command
//! line, and either prints it or hands it to the supervisor and drains run
//! events until every run reaches a terminal state.

mod catalog;
mod clipboard;
mod command;
mod config;
mod events;
mod output;
mod process;
mod runner;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::catalog::{Catalog, ValueSet};
use crate::command::{assemble, resolve_invocation, CommandLine};
use crate::config::{apply_values, load_config, Config};
use crate::events::RunEvent;
use crate::output::sanitize_text;
use crate::process::{RunId, RunState, RunStatus};
use crate::runner::{ShutdownConfig, Supervisor};

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "sqlrack",
    version,
    about = "Headless sqlmap front: assemble command lines, supervise concurrent runs",
    styles = help_styles()
)]
struct Cli {
    /// Path to a sqlrack.toml profile.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ignore any sqlrack.toml in the current directory.
    #[arg(long, global = true)]
    no_config: bool,
    /// Increase verbosity (-v, -vv, -vvv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Assemble the command line and run sqlmap, streaming its output.
    Run {
        /// Override an option value by catalogue id (e.g. req_timeout=45).
        #[arg(long = "set", value_name = "ID=VALUE")]
        sets: Vec<String>,
        /// Target URLs; each one starts its own concurrent run.
        targets: Vec<String>,
    },
    /// Assemble the command line and print it without running anything.
    Command {
        /// Override an option value by catalogue id (e.g. req_timeout=45).
        #[arg(long = "set", value_name = "ID=VALUE")]
        sets: Vec<String>,
        /// Copy the command line to the clipboard.
        #[arg(long)]
        copy: bool,
        /// Print as JSON instead of a shell-quoted line.
        #[arg(long)]
        json: bool,
        /// Target URL, as a positional convenience.
        target: Option<String>,
    },
    /// List the option catalogue (id, flag, kind, default).
    Options,
    /// Show sqlmap's advanced help (-hh).
    ToolHelp,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = resolve_config(&cli)?;
    let catalog = Catalog::sqlmap();

    match cli.command {
        Commands::Run { sets, targets } => run_scans(&catalog, config, &sets, &targets).await,
        Commands::Command {
            sets,
            copy,
            json,
            target,
        } => {
            let mut values = base_values(&catalog, &config)?;
            apply_sets(&catalog, &mut values, &sets)?;
            if let Some(target) = target {
                values.set_parsed(&catalog, "target_url", &target)?;
            }
            let cmd = assemble(&catalog, &values, &config.tool)?;
            print_command(&cmd, copy, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Options => {
            print_options(&catalog);
            Ok(ExitCode::SUCCESS)
        }
        Commands::ToolHelp => tool_help(&config).await,
    }
}

fn resolve_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return load_config(path);
    }
    if cli.no_config {
        return Ok(Config::default());
    }
    let default = Path::new("sqlrack.toml");
    if default.exists() {
        load_config(default)
    } else {
        Ok(Config::default())
    }
}

fn base_values(catalog: &Catalog, config: &Config) -> Result<ValueSet> {
    let mut values = ValueSet::new();
    apply_values(catalog, &config.values, &mut values)?;
    Ok(values)
}

fn apply_sets(catalog: &Catalog, values: &mut ValueSet, sets: &[String]) -> Result<()> {
    for entry in sets {
        let Some((id, raw)) = entry.split_once('=') else {
            bail!("--set takes ID=VALUE, got '{entry}'");
        };
        values.set_parsed(catalog, id.trim(), raw)?;
    }
    Ok(())
}

async fn run_scans(
    catalog: &Catalog,
    config: Config,
    sets: &[String],
    targets: &[String],
) -> Result<ExitCode> {
    let mut values = base_values(catalog, &config)?;
    apply_sets(catalog, &mut values, sets)?;

    // One command line per requested target; with no targets the profile
    // must already designate one.
    let mut commands = Vec::new();
    if targets.is_empty() {
        commands.push(assemble(catalog, &values, &config.tool)?);
    } else {
        for target in targets {
            let mut per_run = values.clone();
            per_run.set_parsed(catalog, "target_url", target)?;
            commands.push(assemble(catalog, &per_run, &config.tool)?);
        }
    }
    if commands.iter().any(|cmd| !cmd.has_target) {
        bail!(
            "no target option set (one of -u, -d, -l, -m, -r, -g, -c); \
             pass a target or use --set target_url=..."
        );
    }
    for cmd in &commands {
        let interactive = cmd.interactive_flags();
        if !interactive.is_empty() && !cmd.has_flag("--batch") {
            tracing::warn!(
                flags = ?interactive,
                "interactive flags without --batch; captured output will stall on prompts"
            );
        }
    }

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let supervisor = Supervisor::new(event_tx, ShutdownConfig::new(config.run.term_grace_ms));
    let multi = commands.len() > 1;
    let mut runs: HashMap<RunId, RunState> = HashMap::new();
    for cmd in commands {
        let label = run_label(&cmd);
        let quoted = cmd.shell_quoted();
        let id = supervisor.start(cmd.argv.clone());
        println!("{}starting: {quoted}", run_prefix(id, &label, multi));
        runs.insert(id, RunState::new(cmd.argv, label, config.run.max_lines));
    }

    let mut cancel_requested = false;
    let mut open = runs.len();
    while open > 0 {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let id = event.id();
                let Some(state) = runs.get_mut(&id) else { continue };
                let prefix = run_prefix(id, &state.label, multi);
                if event.is_terminal() {
                    state.apply(&event);
                    open -= 1;
                    match &state.status {
                        RunStatus::Exited { code } => {
                            let code = code.map_or("none".to_string(), |c| c.to_string());
                            println!("{prefix}finished with code {code}");
                        }
                        RunStatus::Cancelled { .. } => {
                            println!("{prefix}cancelled");
                        }
                        RunStatus::Failed { error } => {
                            eprintln!("{prefix}error: {error}");
                        }
                        RunStatus::Running => {}
                    }
                } else if let RunEvent::Output { line, .. } = &event {
                    let line = sanitize_text(line, config.run.strip_ansi);
                    println!("{prefix}{line}");
                    state.logs.push(line);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if cancel_requested {
                    bail!("forced exit before runs completed");
                }
                cancel_requested = true;
                eprintln!("stopping runs (ctrl-c again to force quit)");
                supervisor.cancel_all();
            }
        }
    }

    let all_ok = runs.values().all(|state| {
        state.status.is_success() || matches!(state.status, RunStatus::Cancelled { .. })
    });
    Ok(if all_ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_command(cmd: &CommandLine, copy: bool, json: bool) -> Result<()> {
    if json {
        let payload = serde_json::json!({
            "argv": cmd.argv,
            "has_target": cmd.has_target,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", cmd.shell_quoted());
    }
    if copy {
        clipboard::copy_text(&cmd.shell_quoted())?;
        eprintln!("command copied to clipboard");
    }
    if !cmd.has_target {
        tracing::warn!("no target option set; sqlmap will refuse this command");
    }
    Ok(())
}

fn print_options(catalog: &Catalog) {
    for spec in catalog.options() {
        let flag = match spec.technique {
            Some(letter) => format!("--technique {letter}"),
            None => spec.flag.to_string(),
        };
        let default = spec.default.render();
        let default = if default.is_empty() {
            "-".to_string()
        } else {
            default
        };
        println!(
            "{:<24} {:<20} {:<15} {}",
            spec.id,
            flag,
            spec.kind.expects(),
            default
        );
    }
}

async fn tool_help(config: &Config) -> Result<ExitCode> {
    let mut invocation = resolve_invocation(&config.tool)?;
    invocation.push("-hh".to_string());

    let mut command = tokio::process::Command::new(&invocation[0]);
    command.args(&invocation[1..]);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let output = tokio::time::timeout(Duration::from_secs(15), command.output())
        .await
        .context("timed out fetching sqlmap help")?
        .with_context(|| format!("failed to run '{}'", invocation[0]))?;

    print!("{}", String::from_utf8_lossy(&output.stdout));
    if !output.status.success() {
        eprint!("{}", String::from_utf8_lossy(&output.stderr));
        bail!("'{}' exited with {}", invocation[0], output.status);
    }
    Ok(ExitCode::SUCCESS)
}

// Tab-title style label: the target argument, shortened from the left.
fn run_label(cmd: &CommandLine) -> String {
    let argv = &cmd.argv;
    for (i, token) in argv.iter().enumerate() {
        if ["-u", "-d", "-l", "-m", "-r", "-g", "-c"].contains(&token.as_str()) {
            if let Some(value) = argv.get(i + 1) {
                return shorten(value, 20);
            }
        }
        if let Some(rest) = token.strip_prefix("--url=") {
            return shorten(rest, 20);
        }
    }
    "run".to_string()
}

fn shorten(text: &str, max: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max {
        return text.to_string();
    }
    let tail: String = chars[chars.len() - (max - 3)..].iter().collect();
    format!("...{tail}")
}

fn run_prefix(id: RunId, label: &str, multi: bool) -> String {
    if multi {
        format!("[{id}:{label}] ")
    } else {
        String::new()
    }
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
        .valid(Style::new().fg_color(Some(AnsiColor::Green.into())))
        .invalid(
            Style::new()
                .fg_color(Some(AnsiColor::Red.into()))
                .effects(Effects::BOLD),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_sets_parses_id_value_pairs() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        apply_sets(
            &catalog,
            &mut values,
            &["req_timeout=45".to_string(), "gen_batch=true".to_string()],
        )
        .unwrap();
        assert!(values.get("req_timeout").is_some());
        assert!(values.get("gen_batch").is_some());
        assert!(apply_sets(&catalog, &mut values, &["nonsense".to_string()]).is_err());
    }

    #[test]
    fn run_label_prefers_the_target_argument() {
        let cmd = CommandLine {
            argv: vec![
                "sqlmap".into(),
                "-u".into(),
                "http://example.org/page.php?id=1".into(),
            ],
            has_target: true,
        };
        let label = run_label(&cmd);
        assert!(label.starts_with("..."));
        assert!(label.ends_with("page.php?id=1"));

        let bare = CommandLine {
            argv: vec!["sqlmap".into(), "--batch".into()],
            has_target: false,
        };
        assert_eq!(run_label(&bare), "run");
    }

    #[test]
    fn shorten_keeps_short_text_intact() {
        assert_eq!(shorten("short", 20), "short");
        let long = "abcdefghijklmnopqrstuvwxyz";
        let shortened = shorten(long, 20);
        assert_eq!(shortened.chars().count(), 20);
        assert!(shortened.starts_with("..."));
        assert!(shortened.ends_with("z"));
    }
}
