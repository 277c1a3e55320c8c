use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::model::Locale;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level (overridden by ZEILE_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    /// Root for build products
    #[arg(long, global = true, default_value = "DerivedData")]
    pub derived_data: PathBuf,
    /// Root archives are extracted into (defaults to the system temp dir)
    #[arg(long, global = true)]
    pub temp: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scaffold a new .zeileproj bundle
    New {
        name: String,
        /// Directory the bundle is created in
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long, default_value = "jp")]
        locale: Locale,
    },
    /// Build a project into <derived>/<project>/Build/<project>.zir
    Build {
        project: PathBuf,
    },
    /// Print the diagnostics of one .zeile file
    Check {
        file: PathBuf,
        /// Files linked before FILE, in order
        #[arg(long = "after")]
        preceding: Vec<PathBuf>,
        #[arg(long, default_value = "jp")]
        locale: Locale,
        #[arg(long)]
        assets: Option<PathBuf>,
    },
    /// Build a project and pack it with its assets into a .sar archive
    Pack {
        project: PathBuf,
        output: PathBuf,
    },
    /// Unpack a .sar archive into an empty directory
    Extract {
        archive: PathBuf,
        output: PathBuf,
    },
    /// Play a .zir or .sar story in the terminal
    Play {
        story: PathBuf,
        /// Asset root for a bare .zir
        #[arg(long)]
        assets: Option<PathBuf>,
        /// Answers for choices, in order; stdin is read once they run out
        #[arg(long, value_delimiter = ',')]
        choose: Vec<usize>,
    },
    /// Print the plain text listing of a story, or write both debug dumps
    Dump {
        story: PathBuf,
        /// Write <name>.txt and <name>.sirius.json here instead of printing
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print completions at a character index as JSON
    Complete {
        file: PathBuf,
        /// Character left of the caret
        #[arg(long)]
        index: usize,
        #[arg(long, default_value = "jp")]
        locale: Locale,
        #[arg(long)]
        assets: Option<PathBuf>,
    },
}
