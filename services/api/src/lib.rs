mod cli;
mod decide;
mod infra;
mod routes;
mod server;

use marketplace_ai::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
