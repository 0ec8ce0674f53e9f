mod cli;
mod commands;
mod infra;

use pgdas::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}
