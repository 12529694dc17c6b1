use anyhow::Result;
use clap::Parser;
use lockutils::cli::Cli;
use lockutils::commands::dispatch;
use lockutils::logging::{flush_logs, init_tracing, init_tracing_with_file};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.log_dir {
        Some(dir) => init_tracing_with_file(dir, cli.verbose)?,
        None => init_tracing(cli.verbose)?,
    }

    let code = dispatch(&cli);
    flush_logs();
    std::process::exit(code?);
}
