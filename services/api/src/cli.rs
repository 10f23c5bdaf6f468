use crate::quote::{run_quote, QuoteArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use procan_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "procan-intake-api",
    about = "Serve the ProCan intake API or price a service mix from the command line",
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
    /// Price a service mix and print the breakdown
    Quote(QuoteArgs),
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
        Command::Quote(args) => run_quote(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn quote_flags_parse() {
        let cli = Cli::try_parse_from([
            "procan-intake-api",
            "quote",
            "--cans",
            "60",
            "--pad-size",
            "large",
            "--billing",
            "annual",
            "--promo",
            "ea2026",
            "--json",
        ])
        .expect("valid flags");
        let Some(Command::Quote(args)) = cli.command else {
            panic!("expected quote command");
        };
        assert_eq!(args.cans, 60);
        assert!(args.json);
        assert_eq!(args.promo.as_deref(), Some("ea2026"));
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["procan-intake-api"]).expect("no args");
        assert!(cli.command.is_none());
    }
}
