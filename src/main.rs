//! Purpose: `genbog` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;
mod serve;

use genbog::api::{Error, ErrorKind, to_exit_code};

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
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `genbog --help`."));
            }
        },
    };

    command_dispatch::dispatch_command(cli.command)
}

#[derive(Parser)]
#[command(
    name = "genbog",
    version,
    about = "Count held copies of books by ISBN over HTTP",
    long_about = r#"Count held copies of books by ISBN over HTTP.

State lives in process memory only; restarting the server clears every count."#,
    arg_required_else_help = true,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Serve the book-count API over HTTP (loopback default)",
        long_about = r#"Serve the book-count API over HTTP (loopback default)."#,
        after_help = r#"EXAMPLES
  $ genbog serve
  $ genbog serve --bind 127.0.0.1:8080
  $ genbog serve check

ENDPOINTS
  GET    /books/{isbn}   current count (0 if untracked)
  POST   /books/{isbn}   add one copy
  DELETE /books/{isbn}   remove one copy (never below 0)
  GET    /books          every tracked ISBN with its count
  POST   /books          add a JSON array of ISBNs (all-or-nothing validation)

NOTES
  - Loopback is the default; non-loopback binds require --allow-non-loopback
  - Set RUST_LOG (e.g. RUST_LOG=debug) to adjust log verbosity"#
    )]
    Serve {
        #[command(subcommand)]
        subcommand: Option<ServeSubcommand>,
        #[command(flatten)]
        run: ServeRunArgs,
    },
    #[command(
        arg_required_else_help = true,
        about = "Check ISBN syntax without a server",
        long_about = r#"Check that each value is exactly 13 ASCII digits (no check-digit math).

Prints one JSON line per value. Exits non-zero if any value is invalid."#,
        after_help = r#"EXAMPLES
  $ genbog validate 9780306406157
  $ genbog validate 1234567890123 123"#
    )]
    Validate {
        #[arg(required = true, help = "Candidate ISBN values")]
        isbns: Vec<String>,
    },
    #[command(about = "Print version info as JSON")]
    Version,
}

#[derive(Subcommand)]
enum ServeSubcommand {
    #[command(
        about = "Validate serve config and print effective endpoints without starting",
        after_help = r#"EXAMPLES
  $ genbog serve check
  $ genbog serve --bind 0.0.0.0:5000 --allow-non-loopback check --json"#
    )]
    Check {
        #[arg(long, help = "Emit JSON instead of text")]
        json: bool,
    },
}

#[derive(Args)]
struct ServeRunArgs {
    #[arg(
        long,
        default_value = serve::DEFAULT_BIND,
        help = "Bind address",
        help_heading = "Connection"
    )]
    bind: String,
    #[arg(
        long,
        help = "Allow binding to non-loopback addresses",
        help_heading = "Connection"
    )]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = serve::DEFAULT_MAX_BODY_BYTES,
        help = "Maximum request body size in bytes",
        help_heading = "Limits"
    )]
    max_body_bytes: u64,
}

fn serve_config_from_run_args(run: ServeRunArgs) -> Result<serve::ServeConfig, Error> {
    let bind: SocketAddr = run.bind.parse().map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid bind address")
            .with_hint("Use a host:port value like 127.0.0.1:5000.")
    })?;
    Ok(serve::ServeConfig {
        bind,
        max_body_bytes: run.max_body_bytes,
        allow_non_loopback: run.allow_non_loopback,
    })
}

fn serve_check_json(config: &serve::ServeConfig) -> Value {
    let base_url = format!("http://{}", config.bind);
    json!({
        "check": {
            "bind": config.bind.to_string(),
            "base_url": base_url,
            "max_body_bytes": config.max_body_bytes,
            "allow_non_loopback": config.allow_non_loopback,
            "endpoints": [
                format!("GET {base_url}/books/{{isbn}}"),
                format!("POST {base_url}/books/{{isbn}}"),
                format!("DELETE {base_url}/books/{{isbn}}"),
                format!("GET {base_url}/books"),
                format!("POST {base_url}/books"),
                format!("GET {base_url}/healthz"),
            ],
        }
    })
}

fn emit_serve_check_report(config: &serve::ServeConfig, json: bool) {
    let report = serve_check_json(config);
    if json {
        emit_json(report);
        return;
    }
    let check = &report["check"];
    println!("genbog serve check: ok");
    println!("  bind: {}", config.bind);
    println!("  max body bytes: {}", config.max_body_bytes);
    println!("  endpoints:");
    if let Some(endpoints) = check["endpoints"].as_array() {
        for endpoint in endpoints {
            println!("    {}", endpoint.as_str().unwrap_or_default());
        }
    }
}

fn emit_json(value: Value) {
    let encoded = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", err.kind()))
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(isbn) = err.isbn() {
        inner.insert("isbn".to_string(), json!(isbn));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(isbn) = err.isbn() {
        lines.push(format!("isbn: {isbn}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
