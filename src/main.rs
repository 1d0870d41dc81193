// CEE orchestrator command line entry point
use clap::Parser;
use cee_orchestrator::cli::{Cli, CliApp};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut app = CliApp::new(&cli.global);

    if let Err(e) = app.run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
