use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// livemark: live markdown previews in the browser
#[derive(Parser, Debug)]
#[command(name = "livemark", version)]
#[command(about = "Preview markdown files in a browser, live-updating as they change", long_about = None)]
pub struct Cli {
    /// Port of the preview server
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Browser to launch the preview in
    #[arg(short, long, global = true)]
    pub browser: Option<String>,

    /// Launch the preview in the browser
    #[arg(short = 'l', global = true, default_value_t = false)]
    pub launch: bool,

    /// Log output (stdout, stderr)
    #[arg(long, global = true)]
    pub logging: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Preview a file at a given path
    Start {
        #[arg(value_name = "FILEPATH")]
        file: PathBuf,
    },
    /// Stop previewing a file, or stop the server when no file is given
    Stop {
        #[arg(value_name = "FILEPATH")]
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse CLI arguments from the environment
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
