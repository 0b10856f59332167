#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

mod commands;
mod logging;
mod progress;

use clap::Parser;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tinypm")]
#[command(author, version, about = "A tiny npm-compatible package manager", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install dependencies, optionally adding new packages first
    Install {
        /// Packages to add before installing (e.g., "react", "lodash")
        packages: Vec<String>,

        /// Skip devDependencies entirely
        #[arg(long)]
        production: bool,

        /// Save added packages as devDependencies
        #[arg(short = 'D', long = "save-dev", visible_alias = "dev")]
        save_dev: bool,
    },

    /// Bare packages without a subcommand install them (e.g., `tinypm react`)
    #[command(external_subcommand)]
    Packages(Vec<String>),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    logging::init(cli.verbose);

    let action = match cli.command {
        Some(Commands::Install {
            packages,
            production,
            save_dev,
        }) => commands::install::InstallAction {
            cwd,
            packages,
            production,
            save_dev,
        },
        Some(Commands::Packages(packages)) => commands::install::InstallAction {
            cwd,
            packages,
            production: false,
            save_dev: false,
        },
        None => commands::install::InstallAction {
            cwd,
            packages: Vec::new(),
            production: false,
            save_dev: false,
        },
    };

    let rt = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    rt.block_on(commands::install::run(action))
}
