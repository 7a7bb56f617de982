use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{
    CommandReport, activity, backup, bulk_set, check, list, set, status, undo, update_check,
    watch,
};
use crate::warden::activity::Bucket;
use crate::warden::model::AssociationKind;

#[derive(Parser)]
#[command(name = "warden", version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Track default applications, catch external overwrites, undo changes")]
struct Cli {
    /// Emit the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show paths, backend, baseline and history state
    Status,

    /// List tracked associations with their current handler
    List {
        /// file-type or url-scheme (both when omitted)
        #[arg(long)]
        kind: Option<AssociationKind>,
    },

    /// Set the default handler for one identifier
    Set {
        kind: AssociationKind,
        identifier: String,
        handler: String,
        /// Apply without recording an activity entry
        #[arg(long)]
        no_log: bool,
    },

    /// Point several identifiers at one handler
    BulkSet {
        #[arg(long)]
        kind: AssociationKind,
        #[arg(long)]
        handler: String,
        #[arg(required = true)]
        identifiers: Vec<String>,
    },

    /// Detect changes made by other programs since the last baseline
    Check {
        /// Revert one change (`kind:identifier` or bare identifier); repeatable
        #[arg(long)]
        revert: Vec<String>,
        #[arg(long)]
        revert_all: bool,
        #[arg(long)]
        dismiss_all: bool,
    },

    /// Show the activity history grouped by day
    Activity {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Undo one activity entry
    Undo { entry_id: String },

    /// Undo every change in a group (today, yesterday, this-week, earlier)
    UndoGroup { bucket: Bucket },

    /// Delete the activity history
    ClearActivity,

    /// Create, inspect and restore backups
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Run the guard watcher
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },

    /// Ask the release feed whether a newer version exists
    UpdateCheck,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Save the current mapping to a new backup file
    Create,
    /// List backups, newest first
    List,
    /// Show what restoring a backup would change (newest when omitted)
    Preview { path: Option<PathBuf> },
    /// Apply a backup (newest when omitted)
    Restore { path: Option<PathBuf> },
}

fn dispatch(command: Commands) -> Result<CommandReport> {
    match command {
        Commands::Status => status::run(),
        Commands::List { kind } => list::run(&list::ListOptions { kind }),
        Commands::Set {
            kind,
            identifier,
            handler,
            no_log,
        } => set::run(&set::SetOptions {
            kind,
            identifier,
            handler,
            no_log,
        }),
        Commands::BulkSet {
            kind,
            handler,
            identifiers,
        } => bulk_set::run(&bulk_set::BulkSetOptions {
            kind,
            identifiers,
            handler,
        }),
        Commands::Check {
            revert,
            revert_all,
            dismiss_all,
        } => check::run(&check::CheckOptions {
            revert,
            revert_all,
            dismiss_all,
        }),
        Commands::Activity { limit } => activity::run(&activity::ActivityOptions { limit }),
        Commands::Undo { entry_id } => undo::run(&undo::UndoOptions { entry_id }),
        Commands::UndoGroup { bucket } => undo::run_group(&undo::UndoGroupOptions { bucket }),
        Commands::ClearActivity => activity::run_clear(),
        Commands::Backup { command } => backup::run(&match command {
            BackupCommands::Create => backup::BackupAction::Create,
            BackupCommands::List => backup::BackupAction::List,
            BackupCommands::Preview { path } => backup::BackupAction::Preview { path },
            BackupCommands::Restore { path } => backup::BackupAction::Restore { path },
        }),
        Commands::Watch { once, daemon } => watch::run(&watch::WatchOptions { once, daemon }),
        Commands::UpdateCheck => update_check::run(),
    }
}

fn render_text(report: &CommandReport) -> String {
    let mut out = format!(
        "{}: {}\n",
        report.command,
        if report.ok { "ok" } else { "issues" }
    );
    for detail in &report.details {
        out.push_str(&format!("  {detail}\n"));
    }
    for issue in &report.issues {
        out.push_str(&format!("  ! {issue}\n"));
    }
    out
}

/// Parses arguments, runs the command and prints its report. Returns the
/// process exit code: 0 when clean, 2 when the report carries issues.
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    let report = dispatch(cli.command)?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize report json")?
        );
    } else {
        print!("{}", render_text(&report));
    }

    Ok(if report.ok { 0 } else { 2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn kinds_and_buckets_parse_from_the_command_line() {
        let cli = Cli::try_parse_from(["warden", "set", "file-type", ".json", "org.b"])
            .expect("parse set");
        assert!(matches!(
            cli.command,
            Commands::Set {
                kind: AssociationKind::FileType,
                ..
            }
        ));

        let cli = Cli::try_parse_from(["warden", "--json", "undo-group", "this-week"])
            .expect("parse undo-group");
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::UndoGroup {
                bucket: Bucket::ThisWeek
            }
        ));

        assert!(Cli::try_parse_from(["warden", "bulk-set", "--kind", "url", "--handler", "x"]).is_err());
    }

    #[test]
    fn text_report_marks_issues() {
        let mut report = CommandReport::new("check");
        report.detail("external_changes=1");
        report.issue("unreviewed external change");
        let text = render_text(&report);
        assert!(text.starts_with("check: issues\n"));
        assert!(text.contains("  ! unreviewed external change"));
    }
}
