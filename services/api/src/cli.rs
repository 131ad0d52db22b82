use crate::demo::{run_classify, run_demo, ClassifyArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use quote_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Quote Intake",
    about = "Run and demonstrate the insurance quote intake service from the command line",
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
    /// Classify a coverage start date as a hot or standard lead
    Classify(ClassifyArgs),
    /// Walk a prospect through the wizard against in-memory storage
    Demo(DemoArgs),
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
        Command::Classify(args) => run_classify(args),
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote_intake::workflows::quote::InsuranceType;

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["quote-intake"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn classify_requires_start_date() {
        assert!(Cli::try_parse_from(["quote-intake", "classify"]).is_err());

        let cli = Cli::try_parse_from([
            "quote-intake",
            "classify",
            "--start-date",
            "2025-10-01",
            "--today",
            "2025-09-24",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Classify(args)) => {
                assert_eq!(args.start_date.to_string(), "2025-10-01");
                assert_eq!(args.today.map(|today| today.to_string()).as_deref(), Some("2025-09-24"));
            }
            other => panic!("expected classify command, got {other:?}"),
        }
    }

    #[test]
    fn demo_accepts_insurance_type() {
        let cli = Cli::try_parse_from(["quote-intake", "demo", "--insurance-type", "home"])
            .expect("parses");
        match cli.command {
            Some(Command::Demo(args)) => assert_eq!(args.insurance_type, InsuranceType::Home),
            other => panic!("expected demo command, got {other:?}"),
        }

        assert!(Cli::try_parse_from(["quote-intake", "demo", "--insurance-type", "boat"]).is_err());
    }
}
