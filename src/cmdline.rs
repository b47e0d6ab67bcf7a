use clap::Parser;
use std::path::PathBuf;

/// A status indicator light daemon for Echo360 capture appliances
///
/// Echolight is free software released under the GNU AGPL v3.
/// You can find its source code at https://github.com/rrah/echolight
#[derive(Parser, Debug)]
#[command(name = "echolight")]
pub struct Opt {
    /// Path of the local config file. Created from a built-in example if absent
    #[arg(short, long, default_value = "echolight.json")]
    pub config: PathBuf,
    /// Write the log to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
