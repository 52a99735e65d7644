pub mod console;
pub mod stacks;
pub mod track;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stacks::{process_next_command, process_stacks_command, NextCommand};
use track::{process_track_command, TrackCommand};
use tracing::level_filters::LevelFilter;

use crate::utils::{
    dir::{create_application_default_path, create_dir},
    logging::{enable_logging, CLI_PREFIX},
};

#[derive(Parser, Debug)]
#[command(name = "Timestack", version, long_about = None)]
#[command(about = "Time tracking with stacked task sessions", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track a task until interrupted")]
    Track {
        #[command(flatten)]
        command: TrackCommand,
    },
    #[command(about = "Print the name of the next session of a stack")]
    Next {
        #[command(flatten)]
        command: NextCommand,
    },
    #[command(about = "List stacks with their tracked time")]
    Stacks {},
}

/// Entry point of the binary. Must run inside a [tokio::task::LocalSet].
pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => create_dir(dir)?,
        None => create_application_default_path()?,
    };

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &dir.join("logs"), logging_level, args.log)?;

    match args.commands {
        Commands::Track { command } => process_track_command(dir, command).await,
        Commands::Next { command } => process_next_command(dir, command).await,
        Commands::Stacks {} => process_stacks_command(dir).await,
    }
}
