mod cli;
mod infra;
mod quote;
mod routes;
mod server;

use procan_intake::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
