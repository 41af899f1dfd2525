//! Command line arguments, parsed with clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
/// Log a listener's ratings from a serial slider while a stimulus plays
pub struct RateArgs {
    #[command(subcommand)]
    /// What to do
    pub command: CommandTask,
}

#[derive(Debug, Subcommand, Clone)]
/// The things `ratethissound` can do
pub enum CommandTask {
    /// Run rating sessions, appending them to a log file
    Record(RecordCommand),

    /// List the serial ports a rating device could be on
    Ports,

    /// Summarise an existing rating log
    Show(ShowCommand),
}

#[derive(Debug, Args, Clone)]
/// Arguments for `record`
pub struct RecordCommand {
    /// Log file that sessions are appended to
    #[arg(short = 'o', long = "out")]
    pub outfile: PathBuf,

    /// Serial port of the rating device, or "dummy" for a simulated one.
    /// Asked for interactively when left out
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Uncompressed WAV file to play during each session
    #[arg(short = 'a', long = "audio")]
    pub audio: Option<PathBuf>,

    /// RON preset with session tunables
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Line speed, overriding the preset
    #[arg(short = 'b', long = "baud")]
    pub baud_rate: Option<u32>,
}

#[derive(Debug, Args, Clone)]
/// Arguments for `show`
pub struct ShowCommand {
    /// Log file to read
    pub logfile: PathBuf,

    /// Print every record, not just the summary
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
