use anyhow::{Context, Result};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use smartdl::download::progress::format_bytes;
use smartdl::{ConfigManager, ControlOutcome, DownloadManager, TaskId, TaskSnapshot, TracingSink};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptCommand {
    Add(String),
    List,
    Pause(TaskId),
    Resume(TaskId),
    Cancel(TaskId),
    Clear,
    Watch,
    Help,
    Exit,
}

/// Parse one prompt line. `Ok(None)` for blank input, `Err` carries the
/// message to show the user.
pub fn parse_command(line: &str) -> Result<Option<PromptCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(None);
    };
    let argument = parts.next();

    let id = |usage: &str| -> Result<TaskId, String> {
        let raw = argument.ok_or_else(|| format!("Usage: {}", usage))?;
        raw.parse::<TaskId>()
            .map_err(|_| format!("Invalid ID '{}'", raw))
    };

    let parsed = match command.to_lowercase().as_str() {
        "add" => PromptCommand::Add(
            argument
                .ok_or_else(|| "Usage: add <URL>".to_string())?
                .to_string(),
        ),
        "list" | "ls" => PromptCommand::List,
        "pause" => PromptCommand::Pause(id("pause <ID>")?),
        "resume" => PromptCommand::Resume(id("resume <ID>")?),
        "cancel" => PromptCommand::Cancel(id("cancel <ID>")?),
        "clear" => PromptCommand::Clear,
        "watch" => PromptCommand::Watch,
        "help" | "?" => PromptCommand::Help,
        "exit" | "quit" | "q" => PromptCommand::Exit,
        other => return Err(format!("Unknown command '{}', type 'help'", other)),
    };
    Ok(Some(parsed))
}

pub async fn handle_interactive(config_manager: &ConfigManager) -> Result<()> {
    let config = config_manager.config();
    let manager = DownloadManager::new(config.download_options(), Arc::new(TracingSink))?;
    let term = Term::stdout();

    term.write_line(&format!(
        "{} {}",
        style("⬇️").cyan(),
        style("Concurrent File Downloader").bold()
    ))?;
    term.write_line(&format!(
        "{} Downloads will be saved to: {}",
        style("📁").cyan(),
        style(manager.download_dir().display()).cyan()
    ))?;
    print_help(&term)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                term.write_line(&format!("{} {}", style("❌").red(), message))?;
                continue;
            }
        };

        match command {
            PromptCommand::Add(url) => {
                let id = manager.add_download(&url).await;
                term.write_line(&format!(
                    "{} Download added with ID {}",
                    style("✅").green(),
                    style(id).bold()
                ))?;
            }
            PromptCommand::List => print_list(&term, &manager.list_statuses().await)?,
            PromptCommand::Pause(id) => {
                let outcome = manager.pause(id).await;
                print_outcome(&term, id, "paused", outcome)?;
            }
            PromptCommand::Resume(id) => {
                let outcome = manager.resume(id).await;
                print_outcome(&term, id, "resumed", outcome)?;
            }
            PromptCommand::Cancel(id) => {
                let outcome = manager.cancel(id).await;
                print_outcome(&term, id, "cancelled", outcome)?;
            }
            PromptCommand::Clear => {
                let removed = manager.clear_errored().await;
                term.write_line(&format!(
                    "{} Removed {} failed download(s)",
                    style("🧹").cyan(),
                    removed.len()
                ))?;
            }
            PromptCommand::Watch => {
                watch(&term, &manager, &mut lines, config.watch_interval()).await?
            }
            PromptCommand::Help => print_help(&term)?,
            PromptCommand::Exit => break,
        }
    }

    let cancelled = manager.cancel_all().await;
    if cancelled > 0 {
        term.write_line(&format!(
            "{} Stopping {} active download(s), partial files are kept",
            style("⏹").yellow(),
            cancelled
        ))?;
        manager.wait_until_settled(SHUTDOWN_GRACE).await;
    }
    term.write_line("Exiting...")?;
    Ok(())
}

fn print_help(term: &Term) -> Result<()> {
    term.write_line("Commands:")?;
    for (usage, description) in [
        ("add <URL>", "start a download"),
        ("list", "show all downloads"),
        ("pause <ID>", "pause a download"),
        ("resume <ID>", "resume a paused download"),
        ("cancel <ID>", "cancel a download"),
        ("clear", "remove failed downloads from the list"),
        ("watch", "live progress until Enter is pressed"),
        ("exit", "quit"),
    ] {
        term.write_line(&format!("  {:<12} {}", style(usage).cyan(), description))?;
    }
    Ok(())
}

fn print_list(term: &Term, snapshots: &[TaskSnapshot]) -> Result<()> {
    if snapshots.is_empty() {
        term.write_line("📭 No downloads yet")?;
        return Ok(());
    }

    term.write_line("Downloads:")?;
    for snapshot in snapshots {
        let size = match snapshot.total_bytes {
            Some(total) => format!(
                "{}/{}",
                format_bytes(snapshot.downloaded_bytes),
                format_bytes(total)
            ),
            None => format_bytes(snapshot.downloaded_bytes),
        };
        term.write_line(&format!(
            "ID: {} | URL: {} | Status: {} | Progress: {:.2}% | {}",
            snapshot.id, snapshot.url, snapshot.status, snapshot.progress, size
        ))?;
        if let Some(error) = &snapshot.error {
            term.write_line(&format!("   {} {}", style("⚠").red(), style(error).dim()))?;
        }
    }
    Ok(())
}

fn print_outcome(term: &Term, id: TaskId, verb: &str, outcome: ControlOutcome) -> Result<()> {
    let line = match outcome {
        ControlOutcome::Applied => format!("{} Download {} {}", style("✅").green(), id, verb),
        ControlOutcome::Ignored(status) => format!(
            "{} Download {} is {}, nothing {}",
            style("⚠").yellow(),
            id,
            status,
            verb
        ),
        ControlOutcome::NotFound => format!("{} Download ID {} not found", style("❌").red(), id),
    };
    term.write_line(&line)?;
    Ok(())
}

/// Redraw one progress bar per download until the user presses Enter.
async fn watch(
    term: &Term,
    manager: &DownloadManager,
    lines: &mut Lines<BufReader<Stdin>>,
    interval: Duration,
) -> Result<()> {
    term.write_line("Watching downloads, press Enter to stop")?;

    let bar_style = ProgressStyle::with_template(
        "{prefix:>4} [{bar:40.cyan/blue}] {pos:>3}% {msg}",
    )?
    .progress_chars("#>-");
    let multi = MultiProgress::new();
    let mut bars: BTreeMap<TaskId, ProgressBar> = BTreeMap::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for snapshot in manager.list_statuses().await {
                    let bar = bars.entry(snapshot.id).or_insert_with(|| {
                        let bar = multi.add(ProgressBar::new(100));
                        bar.set_style(bar_style.clone());
                        bar.set_prefix(format!("#{}", snapshot.id));
                        bar
                    });
                    bar.set_position(snapshot.progress.round() as u64);
                    bar.set_message(format!(
                        "{} {} {}",
                        snapshot.status,
                        format_bytes(snapshot.downloaded_bytes),
                        snapshot.file_name.as_deref().unwrap_or(&snapshot.url)
                    ));
                }
            }
            line = lines.next_line() => {
                line.context("Failed to read input")?;
                break;
            }
        }
    }

    for bar in bars.values() {
        bar.abandon();
    }
    term.write_line("Exited watch mode.")?;
    Ok(())
}
