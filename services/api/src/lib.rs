mod cli;
mod demo;
mod infra;
mod portal;
mod routes;
mod server;

use apply_pilot::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
