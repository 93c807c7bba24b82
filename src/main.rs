use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::info;

use statement_ledger::accounting::ledger::Ledger;
use statement_ledger::data;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Beancount,
    Csv,
}

/// Extract transactions from exported Nationwide statements.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Statement files, or directories containing them
    inputs: Vec<PathBuf>,

    /// Log every parsing and merging decision
    #[arg(short, long)]
    verbose: bool,

    /// Where to write the ledger (defaults to stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "beancount")]
    format: OutputFormat,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    info!("starting...");

    let statements = data::collect_statement_paths(&args.inputs)?;
    if statements.is_empty() {
        info!("nothing to do");
        return Ok(());
    }

    let mut ledger = Ledger::new();
    let successful_reads = data::process_statements(&statements, &mut ledger)?;

    if successful_reads == 0 {
        info!("could not parse any input files");
        return Ok(());
    }

    if successful_reads == statements.len() {
        info!("parsed all {} files successfully", statements.len());
    } else {
        info!("parsed {}/{} files successfully", successful_reads, statements.len());
    }

    for (name, account) in ledger.accounts_iter() {
        let completeness = if account.all_transactions_are_continuous().is_ok() {
            "complete"
        } else {
            "incomplete"
        };

        match account.window() {
            Some((first, last)) => info!(
                "account {}: {} {} transactions from {} to {}",
                name,
                account.transactions().len(),
                completeness,
                first,
                last
            ),
            None => info!("account {}: no transactions", name),
        }
    }

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    match args.format {
        OutputFormat::Beancount => data::export_beancount(&ledger, writer)?,
        OutputFormat::Csv => data::export_csv(&ledger, writer)?,
    }

    Ok(())
}
