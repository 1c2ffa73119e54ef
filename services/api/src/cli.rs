use crate::documents::{run_extract, run_validate, ExtractArgs, ValidateArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use hire_ai::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "hire-ai",
    about = "Screen CVs against job posts and serve the screening API",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Extract plain text from a CV document and print it
    Extract(ExtractArgs),
    /// Check a CV document against the configured upload policy
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Extract(args) => run_extract(args),
        Command::Validate(args) => run_validate(args),
    }
}
