use crate::commands::{
    run_declare, run_emit_das, run_preview, run_resolve, DeclareArgs, EmitDasArgs, PreviewArgs,
    ResolveArgs,
};
use clap::{Parser, Subcommand};
use pgdas::config::AppConfig;
use pgdas::error::AppError;
use pgdas::telemetry;

#[derive(Parser, Debug)]
#[command(
    name = "pgdas-filer",
    about = "Assemble, file and audit PGDAS-D declarations through SERPRO Integra-SN",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble and transmit declarations for one or more taxpayers
    Declare(DeclareArgs),
    /// Print the declaration payload without contacting SERPRO
    Preview(PreviewArgs),
    /// Issue the DAS payment slip for a filed period
    EmitDas(EmitDasArgs),
    /// Show how a tax-table description maps to an activity id
    Resolve(ResolveArgs),
}

pub(crate) fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    match cli.command {
        Command::Declare(args) => run_declare(&config, args),
        Command::Preview(args) => run_preview(&config, args),
        Command::EmitDas(args) => run_emit_das(&config, args),
        Command::Resolve(args) => run_resolve(args),
    }
}
