mod cli;
mod documents;
mod infra;
mod routes;
mod server;

use hire_ai::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
