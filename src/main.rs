use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use arboard::Clipboard;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use is_terminal::IsTerminal;
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use linepatch::config::{self, CliOverrides};
use linepatch::diff::{DiffStyle, print_diff};
use linepatch::encoding::EncodingStrategy;
use linepatch::files::{self, ProjectRoot};
use linepatch::lifecycle::restore_latest_backup;
use linepatch::logging::{self, ChangeLogEntry};
use linepatch::normalize::scan_diff_text;
use linepatch::numbered::{self, Slice};
use linepatch::parser::{self, ParsedBlock};
use linepatch::report::{ApplyResult, ApplyStatus, BatchReport};
use linepatch::{FileDirective, apply_batch, apply_directives};

/// Exit code for a batch that ran but left at least one file failed.
const EXIT_PARTIAL: u8 = 2;

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq, Default)]
enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn should_color(self) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stdout().is_terminal(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "linepatch",
    version,
    about = "Apply line-addressed diffs to a project tree"
)]
struct Cli {
    /// Increase diagnostic output (-v info, -vv debug). RUST_LOG wins.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Preview or apply a diff document.
    Apply(ApplyCommand),
    /// Parse a diff document and summarize it without touching files.
    Check(CheckCommand),
    /// Print a file with the line numbers diffs address.
    Show(ShowCommand),
    /// Print recent change log entries.
    Log(LogCommand),
    /// List or remove backup files.
    Cleanup(CleanupCommand),
    /// Put a file's latest backup back in place.
    Restore(RestoreCommand),
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
struct InputArgs {
    /// Read the diff document from a file.
    #[arg(long = "diff", value_name = "FILE", value_hint = ValueHint::FilePath)]
    diff: Option<PathBuf>,
    /// Read the diff document from stdin.
    #[arg(long, action = ArgAction::SetTrue)]
    stdin: bool,
    /// Read the diff document from the clipboard.
    #[arg(long, action = ArgAction::SetTrue)]
    clipboard: bool,
}

#[derive(Debug, Clone, Args)]
struct RootArg {
    #[arg(long = "root", value_name = "DIR", default_value = ".", value_hint = ValueHint::DirPath)]
    root: PathBuf,
}

#[derive(Debug, Args)]
struct ApplyCommand {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    root: RootArg,
    /// Write changes; without this flag the run is a dry-run preview.
    #[arg(long, action = ArgAction::SetTrue)]
    apply: bool,
    /// Let CREATE FILE replace existing files.
    #[arg(long, action = ArgAction::SetTrue)]
    overwrite: bool,
    /// Apply a bare operation list (no file headers) to this file.
    #[arg(long = "target", value_name = "PATH", value_hint = ValueHint::FilePath)]
    target: Option<PathBuf>,
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<String>,
    /// Accept files whose encoding could only be decoded lossily.
    #[arg(long = "allow-uncertain", action = ArgAction::SetTrue)]
    allow_uncertain: bool,
    /// Skip brace-balance and shrink checks.
    #[arg(long = "no-verify", action = ArgAction::SetTrue)]
    no_verify: bool,
    #[arg(long = "no-change-log", action = ArgAction::SetTrue)]
    no_change_log: bool,
    #[arg(long, default_value_t = 3)]
    context: usize,
    #[arg(long = "color", value_enum, default_value = "auto")]
    color: ColorChoice,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckCommand {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Args)]
struct ShowCommand {
    #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
    path: PathBuf,
    #[command(flatten)]
    root: RootArg,
    /// START:END, 1-based and inclusive.
    #[arg(long = "lines", value_name = "START:END", conflicts_with = "around")]
    lines: Option<String>,
    /// LINE:CONTEXT
    #[arg(long = "around", value_name = "LINE:CONTEXT")]
    around: Option<String>,
    #[arg(long, value_name = "ENCODING")]
    encoding: Option<String>,
}

#[derive(Debug, Args)]
struct LogCommand {
    #[command(flatten)]
    root: RootArg,
    #[arg(long = "tail", default_value_t = 20)]
    tail: usize,
    #[arg(long = "since", value_name = "RFC3339")]
    since: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Debug, Args)]
struct CleanupCommand {
    #[command(flatten)]
    root: RootArg,
    #[arg(long, action = ArgAction::SetTrue)]
    apply: bool,
}

#[derive(Debug, Args)]
struct RestoreCommand {
    #[command(flatten)]
    root: RootArg,
    #[arg(long = "path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    path: PathBuf,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli)
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Apply(cmd) => handle_apply(cmd),
        Command::Check(cmd) => handle_check(cmd),
        Command::Show(cmd) => handle_show(cmd).map(|()| ExitCode::SUCCESS),
        Command::Log(cmd) => handle_log(cmd).map(|()| ExitCode::SUCCESS),
        Command::Cleanup(cmd) => handle_cleanup(cmd).map(|()| ExitCode::SUCCESS),
        Command::Restore(cmd) => handle_restore(cmd).map(|()| ExitCode::SUCCESS),
    }
}

fn open_root(arg: &RootArg) -> Result<ProjectRoot> {
    ProjectRoot::open(&arg.root)
        .with_context(|| format!("opening project root {}", arg.root.display()))
}

fn handle_apply(cmd: ApplyCommand) -> Result<ExitCode> {
    let root = open_root(&cmd.root)?;
    let (config_path, project_config) = config::discover(root.path())?;
    if let Some(path) = &config_path {
        debug!(path = %path.display(), "using project config");
    }
    let merged = config::merge_overrides(
        &project_config,
        &CliOverrides {
            encoding: cmd.encoding.clone(),
            allow_uncertain: cmd.allow_uncertain.then_some(true),
            no_verify: cmd.no_verify,
            no_change_log: cmd.no_change_log,
        },
    );
    let mut options = merged.apply_options()?;
    options.dry_run = !cmd.apply;
    options.overwrite = cmd.overwrite;
    options.keep_preview = !cmd.json;
    debug!(encoding = %options.encoding.describe(), "encoding strategy");

    let text = read_input(&cmd.input)?;
    if !cmd.json {
        warn_about_text(&text);
    }

    let report = match &cmd.target {
        Some(target) => {
            let operations =
                parser::parse_operations(&text).context("parsing operation list")?;
            let directive = FileDirective::Modify {
                path: target.clone(),
                operations,
            };
            apply_directives(vec![directive], root.path(), &options)?
        }
        None => {
            let blocks = parser::parse(&text).context("parsing diff")?;
            if blocks.is_empty() {
                bail!("diff contains no file blocks");
            }
            apply_batch(blocks, root.path(), &options)?
        }
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report.to_document())?);
    } else {
        let style = DiffStyle {
            context: cmd.context,
            color: cmd.color.should_color(),
        };
        print_report(&report, &root, style);
    }

    Ok(if report.has_failures() {
        ExitCode::from(EXIT_PARTIAL)
    } else {
        ExitCode::SUCCESS
    })
}

fn print_report(report: &BatchReport, root: &ProjectRoot, style: DiffStyle) {
    for result in &report.results {
        print_result(result, root, report.dry_run, style);
    }
    let counts = report.counts();
    println!("summary: {counts}");
    if report.dry_run && !report.changed_paths().is_empty() {
        println!("dry-run: rerun with --apply to write these changes.");
    }
}

fn print_result(result: &ApplyResult, root: &ProjectRoot, dry_run: bool, style: DiffStyle) {
    let path = result.path.display();
    if let Some(err) = &result.error {
        println!("failed   {path}: {err}");
        return;
    }
    let status = if dry_run && result.status.is_change() {
        format!("would be {}", result.status)
    } else {
        result.status.to_string()
    };
    match &result.summary {
        Some(summary) => println!("{status:<8} {path} ({summary})"),
        None => println!("{status:<8} {path}"),
    }
    if result.encoding_uncertain {
        println!("  warning: encoding of {path} was guessed; review the result");
    }
    if let Some(backup) = &result.backup {
        println!("backup saved: {path} -> {}", root.display_path(backup).display());
    }
    if let Some(preview) = result.preview.as_ref().filter(|_| dry_run) {
        print_diff(&preview.before, &preview.after, style);
    }
}

fn warn_about_text(text: &str) {
    let scan = scan_diff_text(text);
    if scan.zero_width > 0 {
        println!(
            "note: diff text contains {} zero-width character(s); markers were read without them",
            scan.zero_width
        );
    }
    if scan.control_chars > 0 {
        println!(
            "note: diff text contains {} control character(s)",
            scan.control_chars
        );
    }
}

fn read_input(input: &InputArgs) -> Result<String> {
    if let Some(path) = &input.diff {
        let bytes = fs::read(path).with_context(|| format!("reading diff {}", path.display()))?;
        let decoded = EncodingStrategy::default()
            .detect_and_decode(&bytes)
            .with_context(|| format!("decoding diff {}", path.display()))?;
        return Ok(decoded.text());
    }
    if input.clipboard {
        let mut clipboard = Clipboard::new().context("opening clipboard")?;
        return clipboard.get_text().context("reading clipboard text");
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading diff from stdin")?;
    Ok(buf)
}

fn handle_check(cmd: CheckCommand) -> Result<ExitCode> {
    let text = read_input(&cmd.input)?;
    let blocks = parser::parse(&text).context("parsing diff")?;
    let summary = parser::summarize(&blocks);
    let scan = scan_diff_text(&text);

    if cmd.json {
        let rows: Vec<_> = blocks
            .iter()
            .map(|block| {
                json!({
                    "path": block.path,
                    "action": block.label,
                    "line": block.header_line,
                    "operations": operation_labels(block),
                    "error": block.directive.as_ref().err().map(ToString::to_string),
                })
            })
            .collect();
        let document = json!({ "summary": summary, "text": scan, "blocks": rows });
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        for block in &blocks {
            match &block.directive {
                Ok(_) => {
                    let ops = operation_labels(block);
                    if ops.is_empty() {
                        println!("{:<7} {}", block.label, block.path.display());
                    } else {
                        println!(
                            "{:<7} {}: {}",
                            block.label,
                            block.path.display(),
                            ops.join(", ")
                        );
                    }
                }
                Err(err) => println!("invalid {}: {err}", block.path.display()),
            }
        }
        println!(
            "check summary: files={}, modify={}, create={}, delete={}, malformed={}",
            summary.files, summary.modify, summary.create, summary.delete_file, summary.malformed
        );
        warn_about_text(&text);
    }

    Ok(if summary.malformed > 0 {
        ExitCode::from(EXIT_PARTIAL)
    } else {
        ExitCode::SUCCESS
    })
}

fn operation_labels(block: &ParsedBlock) -> Vec<String> {
    match &block.directive {
        Ok(FileDirective::Modify { operations, .. }) => {
            operations.iter().map(ToString::to_string).collect()
        }
        Ok(FileDirective::Create { content, .. }) => vec![format!("{} line(s)", content.len())],
        _ => Vec::new(),
    }
}

fn handle_show(cmd: ShowCommand) -> Result<()> {
    let root = open_root(&cmd.root)?;
    let (_, project_config) = config::discover(root.path())?;
    let merged = config::merge_overrides(
        &project_config,
        &CliOverrides {
            encoding: cmd.encoding.clone(),
            ..CliOverrides::default()
        },
    );
    let strategy = merged.encoding_strategy()?;
    let target = root.resolve(&cmd.path)?;
    let bytes = fs::read(&target).with_context(|| format!("reading {}", target.display()))?;
    let file = strategy.detect_and_decode(&bytes)?;

    let slice = match (&cmd.lines, &cmd.around) {
        (Some(spec), _) => numbered::parse_range_spec(spec)?,
        (None, Some(spec)) => numbered::parse_line_context(spec)?,
        (None, None) => Slice::All,
    };
    if file.lines.is_empty() {
        println!("(file is empty)");
        return Ok(());
    }
    print!("{}", numbered::render(&file.lines, slice));
    Ok(())
}

fn handle_log(cmd: LogCommand) -> Result<()> {
    let root = open_root(&cmd.root)?;
    let since = match &cmd.since {
        Some(raw) => Some(
            OffsetDateTime::parse(raw, &Rfc3339)
                .with_context(|| format!("parsing --since '{raw}' as RFC3339 timestamp"))?,
        ),
        None => None,
    };
    let limit = if since.is_some() { usize::MAX } else { cmd.tail };
    let mut entries = logging::read_recent(&root, limit)?;
    if let Some(min) = since {
        entries.retain(|entry| {
            OffsetDateTime::parse(&entry.timestamp, &Rfc3339).is_ok_and(|ts| ts >= min)
        });
        let skip = entries.len().saturating_sub(cmd.tail);
        entries.drain(..skip);
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("change log is empty.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "[{}] {:<8} {:<7} {:<8} {}",
            entry.timestamp,
            entry.command,
            entry.action,
            entry.status,
            entry.path.display()
        );
        if let Some(kind) = &entry.error_kind {
            println!("    error: {kind}");
        }
        if let Some(lines) = &entry.line_info {
            println!("    {lines}");
        }
    }
    Ok(())
}

fn handle_cleanup(cmd: CleanupCommand) -> Result<()> {
    let root = open_root(&cmd.root)?;
    let (_, project_config) = config::discover(root.path())?;
    let naming = project_config.backup_naming()?;
    let candidates = files::find_backups(&root, &naming)?;
    if candidates.is_empty() {
        println!("no backups found under {}", root.path().display());
        return Ok(());
    }
    println!("cleanup root: {}", root.path().display());
    println!("found {} backup(s):", candidates.len());
    for path in &candidates {
        println!("  - {}", root.display_path(path).display());
    }
    if !cmd.apply {
        println!("dry-run: rerun with --apply to delete these backups.");
        return Ok(());
    }

    let mut removed = 0usize;
    for path in &candidates {
        files::remove_backup(path)?;
        println!("removed {}", root.display_path(path).display());
        removed += 1;
    }
    println!("cleanup summary: removed={removed}");
    Ok(())
}

fn handle_restore(cmd: RestoreCommand) -> Result<()> {
    let root = open_root(&cmd.root)?;
    let (_, project_config) = config::discover(root.path())?;
    let naming = project_config.backup_naming()?;
    let used = restore_latest_backup(&root, &cmd.path, &naming)?;
    println!(
        "restored {} from {}",
        cmd.path.display(),
        root.display_path(&used).display()
    );

    if project_config.change_log.unwrap_or(true) {
        let mut result = ApplyResult::new(&cmd.path, "restore", ApplyStatus::Applied);
        result.backup = Some(used);
        record(&root, "restore", &result);
    }
    Ok(())
}

fn record(root: &ProjectRoot, command: &str, result: &ApplyResult) {
    let entry = ChangeLogEntry::from_result(root, command, result);
    if let Err(err) = logging::record_change(root, &entry) {
        tracing::warn!(%err, "unable to append to change log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn apply_requires_exactly_one_input() {
        assert!(Cli::try_parse_from(["linepatch", "apply"]).is_err());
        assert!(
            Cli::try_parse_from(["linepatch", "apply", "--stdin", "--clipboard"]).is_err()
        );
        let cli = Cli::try_parse_from(["linepatch", "apply", "--diff", "d.txt", "--apply"])
            .expect("parses");
        match cli.command {
            Command::Apply(cmd) => {
                assert!(cmd.apply);
                assert_eq!(cmd.input.diff.as_deref(), Some(Path::new("d.txt")));
                assert_eq!(cmd.root.root, PathBuf::from("."));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn show_ranges_are_exclusive_options() {
        assert!(
            Cli::try_parse_from([
                "linepatch", "show", "a.rs", "--lines", "1:2", "--around", "3:1"
            ])
            .is_err()
        );
    }
}
