mod commands;
mod terminal;

use commands::{CommandLine, Commands, check, scan};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    match commands.command {
        Commands::Scan(args) => {
            logging::init(args.verbose, args.log_file.as_deref())?;
            print::banner(args.no_banner, args.quiet);
            scan::scan(args).await
        }
        Commands::Check(args) => {
            logging::init(false, None)?;
            print::header("checking stage binaries", false);
            check::check(&args)
        }
    }
}
