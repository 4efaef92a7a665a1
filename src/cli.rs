use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "Megawarc")]
#[command(about = "Repack a tar of warc.gz files into a megawarc warc+tar+json set")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Log every member as it is processed
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Converts FILE into FILE.megawarc.{warc.gz,tar,json.gz}
    Build {
        /// Source tar of (mostly) warc.gz members
        file: PathBuf,
    },

    /// Reconstructs the original tar from FILE.megawarc.* back to FILE
    Restore {
        /// Basename of the megawarc set; must not itself exist yet
        file: PathBuf,
    },

    /// Rewrites BASENAME.megawarc.* as FIXED-BASENAME.megawarc.*,
    /// moving corrupt warc members into the residual tar
    Fix {
        /// Basename of the megawarc set to repair
        basename: PathBuf,
    },
}
