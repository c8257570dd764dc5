//! Purpose: `dataflow-pqt` CLI entry point.
//! Role: Binary crate root; parses args, runs the requested stages, prints a run summary.
//! Invariants: Progress and diagnostics go to stderr through `tracing`; stdout holds the summary.
//! Invariants: Errors are emitted as text on a terminal and as JSON otherwise.
//! Invariants: Exit code is `api::to_exit_code` for errors, 1 when a stage did no work, else 0.
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Parser, ValueHint, error::ErrorKind as ClapErrorKind};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod summary_json;

use dataflow_pqt::api::{Error, ErrorKind, RetryPolicy, to_exit_code};
use summary_json::error_json;

const DEFAULT_MOVE_RETRY_DELAY: &str = "500ms";

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(RunOutcome::ok());
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Pick exactly one of --decode, --convert or --all; see --help."));
            }
        },
    };

    let retry = RetryPolicy {
        max_attempts: cli.move_retries.max(1),
        base_delay: parse_duration(&cli.move_retry_delay)?,
        ..RetryPolicy::default()
    };
    let config = command_dispatch::RunConfig {
        mode: cli.mode(),
        source: cli.source_directory,
        output: cli.output,
        json: cli.json,
        retry,
    };
    command_dispatch::dispatch(config)
}

#[derive(Parser)]
#[command(
    name = "dataflow-pqt",
    version,
    about = "Decode exported dataflows and package them as Power Query templates",
    long_about = None,
    after_help = r#"EXAMPLES
  $ dataflow-pqt --all ./PIE_WORKSPACES                  # decode, then build .pqt files in place
  $ dataflow-pqt --decode ./PIE_WORKSPACES               # decode WS__*.json into item_NNN/
  $ dataflow-pqt --convert ./PIE_WORKSPACES -o ./out     # package decoded items into ./out
  $ RUST_LOG=debug dataflow-pqt --all ./PIE_WORKSPACES --json

NOTES
  - Decoded items land in item_NNN/ directories; see item_mapping.txt for their origin
  - Items with a .pqt archive are moved into with_dataflows/"#
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["decode", "convert", "all"])
))]
struct Cli {
    #[arg(long, help = "Decode base64-encoded dataflow exports only")]
    decode: bool,
    #[arg(long, help = "Convert decoded dataflows to .pqt files only")]
    convert: bool,
    #[arg(long, help = "Run the complete workflow (decode + convert)")]
    all: bool,
    #[arg(
        value_name = "SOURCE_DIRECTORY",
        help = "Directory with exported WS__*.json files or decoded item_NNN/ directories",
        value_hint = ValueHint::DirPath
    )]
    source_directory: PathBuf,
    #[arg(
        short = 'o',
        long,
        help = "Output directory for .pqt items (default: in place)",
        value_hint = ValueHint::DirPath
    )]
    output: Option<PathBuf>,
    #[arg(long, help = "Print the run summary as JSON")]
    json: bool,
    #[arg(long, default_value_t = 3, help = "Attempts when moving a locked item directory")]
    move_retries: u32,
    #[arg(
        long,
        default_value = DEFAULT_MOVE_RETRY_DELAY,
        help = "First backoff delay between move attempts (ms|s|m)"
    )]
    move_retry_delay: String,
}

impl Cli {
    fn mode(&self) -> command_dispatch::Mode {
        if self.decode {
            command_dispatch::Mode::Decode
        } else if self.convert {
            command_dispatch::Mode::Convert
        } else {
            command_dispatch::Mode::All
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.render().to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error:").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn parse_duration(input: &str) -> Result<Duration, Error> {
    let invalid = || {
        Error::new(ErrorKind::Usage)
            .with_message("invalid duration")
            .with_hint("Use a number plus ms|s|m (e.g. 500ms).")
    };
    let trimmed = input.trim();
    let split = trimmed
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(idx, _)| idx)
        .ok_or_else(invalid)?;
    let (num_str, unit) = trimmed.split_at(split);
    let value: u64 = num_str.parse().map_err(|_| invalid())?;
    let millis = match unit {
        "ms" => value,
        "s" => value.saturating_mul(1_000),
        "m" => value.saturating_mul(60_000),
        _ => return Err(invalid()),
    };
    Ok(Duration::from_millis(millis))
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    let mut message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| err.kind().label().to_string());
    if let Some(path) = err.path() {
        message.push_str(&format!(" ({})", path.display()));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::{Cli, parse_duration};
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn durations_accept_known_units() {
        assert_eq!(parse_duration("500ms").expect("ms"), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").expect("s"), Duration::from_secs(2));
        assert_eq!(parse_duration("1m").expect("m"), Duration::from_secs(60));
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5h").is_err());
    }

    #[test]
    fn modes_are_mutually_exclusive_and_required() {
        assert!(Cli::try_parse_from(["dataflow-pqt", "--decode", "dir"]).is_ok());
        assert!(Cli::try_parse_from(["dataflow-pqt", "--decode", "--all", "dir"]).is_err());
        assert!(Cli::try_parse_from(["dataflow-pqt", "dir"]).is_err());
    }
}
