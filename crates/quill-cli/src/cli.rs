use clap::{Parser, Subcommand};

use quill_core::VERSION;

/// Quill - a local-first, end-to-end-encrypted note store
#[derive(Parser)]
#[command(name = "quill")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the quill data directory
    #[arg(short, long, global = true, env = "QUILL_PATH")]
    pub data_dir: Option<String>,

    #[command(subcommand)]
    pub command: Commands,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up a passphrase and create the encrypted note store
    Init,

    /// List notes
    List,

    /// Add a new note
    Add {
        /// Note title
        #[arg(value_name = "TITLE")]
        title: String,

        /// Note content (reads stdin when omitted)
        #[arg(long)]
        content: Option<String>,
    },

    /// Show a note
    Show {
        /// Note ID (full UUID or unique prefix)
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Edit a note
    Edit {
        /// Note ID (full UUID or unique prefix)
        #[arg(value_name = "ID")]
        id: String,

        /// New title
        #[arg(long)]
        title: Option<String>,

        /// New content
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete a note (tombstoned; removed everywhere on next sync)
    Delete {
        /// Note ID (full UUID or unique prefix)
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Sync with the configured endpoint
    Sync {
        /// Set (and remember) the sync endpoint URL
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,
    },

    /// Resolve a pending sync conflict
    Resolve {
        /// Which side to keep
        #[arg(value_enum, value_name = "SIDE")]
        keep: ResolveSide,
    },

    /// Change the passphrase and re-encrypt all data
    Rotate,

    /// Export an encrypted backup file
    Export {
        /// Destination path
        #[arg(value_name = "PATH")]
        path: String,
    },

    /// Import an encrypted backup file, replacing local data
    Import {
        /// Backup file path
        #[arg(value_name = "PATH")]
        path: String,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Erase all local data
    Wipe {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show session and sync status
    Status,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum ResolveSide {
    Local,
    Server,
}
