use std::process;

use clap::{Parser, Subcommand};

use clipwatch::config::AppPaths;
use clipwatch::errors::Result;
use clipwatch::{logging, tui, watcher};

#[derive(Parser)]
#[command(name = "clipwatch", version, about = "Clipboard history with a background watcher")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the headless clipboard watcher
    Watch,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::new()?;

    match cli.command {
        Some(Commands::Watch) => {
            logging::init_stderr();
            watcher::run_watcher(&paths)
        }
        None => {
            let _guard = logging::init_file(&paths.log_file)?;
            tui::run(&paths)
        }
    }
}
