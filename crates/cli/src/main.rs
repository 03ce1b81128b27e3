mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{Diagnostic, IntoDiagnostic, Report, WrapErr};
use thiserror::Error;

use crate::report::{check_source, summarize, Summary};

/// Check .mm1 files and render their diagnostics.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Files to check
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Treat warnings as errors
    #[arg(long)]
    deny_warnings: bool,

    /// Only print the summary line
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Error, Diagnostic, Debug)]
enum CheckError {
    #[error("elaboration of {0} was cancelled")]
    Cancelled(String),
}

fn main() -> miette::Result<ExitCode> {
    let args = Cli::parse();

    let mut total = Summary::default();
    for path in &args.files {
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("cannot read {name}"))?;

        let reports =
            check_source(&name, &text).map_err(|_| CheckError::Cancelled(name.clone()))?;
        total.add(summarize(&reports));
        if !args.quiet {
            for report in reports {
                eprintln!("{:?}", Report::new(report));
            }
        }
    }

    eprintln!("checked {} file(s): {total}", args.files.len());
    let failed = total.errors > 0 || (args.deny_warnings && total.warnings > 0);
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
