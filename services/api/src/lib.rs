mod cli;
mod infra;
mod routes;
mod server;

use classbook::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
