// src/main.rs

use std::process::ExitCode;

use rundag::{cli, exit_status, logging, run};

#[tokio::main]
async fn main() -> ExitCode {
    match run_main().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rundag error: {err:?}");
            ExitCode::from(exit_status(&err))
        }
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
