//! datafsctl - Inspect and modify DataFS stores from the command line.

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;

use datafs::{open_store, DataFs, OpenMode, StoreConfig};

/// Inspect and modify DataFS stores.
#[derive(Debug, Parser)]
#[command(name = "datafsctl", version, about)]
struct Cli {
    /// Root directory of a local store.
    #[arg(long, group = "store")]
    root: Option<PathBuf>,

    /// TOML file describing the store.
    #[arg(long, group = "store")]
    config: Option<PathBuf>,

    /// Validate object names before using them (implied by a config file
    /// that sets `strict = true`).
    #[arg(long)]
    strict: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the names of all objects in the store.
    Ls,
    /// Write the contents of an object to stdout.
    Cat {
        /// The object name.
        name: String,
    },
    /// Store stdin as an object, replacing any previous contents.
    Put {
        /// The object name.
        name: String,
    },
    /// Print whether an object exists; exits with status 1 if it doesn't.
    Exists {
        /// The object name.
        name: String,
    },
    /// Print the capabilities of the store's backend.
    Capacity,
}

fn open(cli: &Cli) -> Result<DataFs> {
    let mut config = match (&cli.root, &cli.config) {
        (Some(root), None) => StoreConfig::local(root, false),
        (None, Some(path)) => StoreConfig::from_path(path)?,
        _ => bail!("one of --root or --config is required"),
    };
    config.strict |= cli.strict;
    debug!("opening store {config:?}");

    open_store(&config).with_context(|| format!("Opening store at {}", config.root.display()))
}

fn run(cli: &Cli, store: &DataFs) -> Result<ExitCode> {
    match &cli.command {
        Command::Ls => {
            let mut stdout = io::stdout().lock();
            for name in store.iter_names()? {
                writeln!(stdout, "{}", name?)?;
            }
        }
        Command::Cat { name } => {
            let mut file = store.open(name, OpenMode::Read)?;
            io::copy(&mut file, &mut io::stdout().lock())?;
            file.close()?;
        }
        Command::Put { name } => {
            let mut file = store.open(name, OpenMode::Write)?;
            let n = io::copy(&mut io::stdin().lock(), &mut file)?;
            file.close()?;
            debug!("wrote {n} bytes to {name:?}");
        }
        Command::Exists { name } => {
            let exists = store.isfile(name)?;
            println!("{exists}");
            if !exists {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Capacity => {
            for cap in store.capacity().iter() {
                println!("{cap}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    env_logger::init();

    let cli = Cli::parse();
    let store = open(&cli)?;
    let status = run(&cli, &store)?;
    store.close()?;
    Ok(status)
}
