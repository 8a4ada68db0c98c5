//! Purpose: Hold top-level CLI command dispatch for `genbog`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Output envelopes and exit code semantics are stable.

use super::*;
use genbog::api::validate;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Version => {
            emit_json(json!({
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }));
            Ok(RunOutcome::ok())
        }
        Command::Validate { isbns } => {
            let mut all_valid = true;
            for isbn in isbns {
                let valid = validate(&isbn);
                all_valid &= valid;
                emit_json(json!({ "isbn": isbn, "valid": valid }));
            }
            let exit_code = if all_valid {
                0
            } else {
                to_exit_code(ErrorKind::InvalidIsbn)
            };
            Ok(RunOutcome::with_code(exit_code))
        }
        Command::Serve { subcommand, run } => match subcommand {
            Some(ServeSubcommand::Check { json }) => {
                let config = serve_config_from_run_args(run)?;
                serve::validate_config(&config)?;
                emit_serve_check_report(&config, json);
                Ok(RunOutcome::ok())
            }
            None => {
                let config = serve_config_from_run_args(run)?;
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|err| {
                        Error::new(ErrorKind::Internal)
                            .with_message("failed to start runtime")
                            .with_source(err)
                    })?;
                runtime.block_on(serve::serve(config))?;
                Ok(RunOutcome::ok())
            }
        },
    }
}
