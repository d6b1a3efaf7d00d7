//! cvaudit - Main Entry Point
//!
//! Cross-validation evaluation and target-leakage auditing from the command line.

use clap::Parser;
use cvaudit::cli::{cmd_ablate, cmd_audit, cmd_evaluate, cmd_info, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cvaudit=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Evaluate { input, model, eval } => {
            cmd_evaluate(&input, &model, &eval)?;
        }
        Commands::Audit { input, columns, sentinel } => {
            cmd_audit(&input, &columns, sentinel)?;
        }
        Commands::Ablate { input, suspects, model, eval } => {
            cmd_ablate(&input, &suspects, &model, &eval)?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
