use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use logbook::context::Context;
use logbook::identity::AuthorId;
use logbook::model::types::{DatasetName, Username};
use logbook_cas::Address;

mod commands;
mod format;
mod session;
mod telemetry;

use format::OutputFormat;
use session::Session;
use telemetry::LogFormat;

/// Signed, append-only history for datasets
///
/// Every dataset has an operation log: who created it, every rename, every
/// saved version, every deletion, each signed by the owner's key. Names and
/// heads are derived by replaying the log.
///
/// QUICK START:
///
///   logbook keygen b5
///   logbook init movies
///   logbook save movies /sha256/<hex> --title "first cut"
///   logbook resolve movies
///   logbook log movies
///
/// Datasets are named `username/name`; a bare `name` means one of yours.
/// Set LOGBOOK_LOG=debug for detailed logs on stderr.
#[derive(Parser)]
#[command(name = "logbook")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'logbook <command> --help' for more information on a specific command.")]
struct Cli {
    /// Logbook root directory (holds config.toml, the key file, and the store)
    #[arg(long, global = true, env = "LOGBOOK_ROOT", default_value = ".")]
    root: PathBuf,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t)]
    format: OutputFormat,

    /// Log format on stderr
    #[arg(long, global = true, value_enum, default_value_t)]
    log_format: LogFormat,

    /// Give up after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a signing key and record the local username
    ///
    /// Writes the key file and config.toml under the root directory.
    Keygen {
        /// Username the key acts for
        username: Username,

        /// Replace an existing key file
        #[arg(short, long)]
        force: bool,
    },

    /// Create a new dataset
    Init {
        /// Dataset name
        name: DatasetName,
    },

    /// Rename a dataset (history and id are kept)
    Rename {
        /// Dataset to rename
        dataset: String,

        /// New name
        new_name: DatasetName,
    },

    /// Record a new version of a dataset
    Save {
        /// Dataset to save to
        dataset: String,

        /// Content address of the new version
        path: Address,

        /// Commit title
        #[arg(short, long, default_value = "")]
        title: String,

        /// Head this version builds on (defaults to the current head)
        #[arg(long)]
        previous: Option<Address>,
    },

    /// Drop the most recent versions of a dataset
    Delete {
        /// Dataset to delete from
        dataset: String,

        /// Number of versions to drop
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },

    /// Resolve a reference to its head (or check a pinned version)
    Resolve {
        /// `name`, `username/name`, or `username/name@path`
        reference: String,
    },

    /// Show a dataset's versions, newest first
    Versions {
        /// Dataset to show
        dataset: String,
    },

    /// Show a dataset's operation log, oldest first
    Log {
        /// Dataset to show
        dataset: String,
    },

    /// List every known dataset
    List,

    /// Write a dataset's signed log to stdout
    Export {
        /// Dataset to export
        dataset: String,
    },

    /// Verify and register another identity's exported log
    Import {
        /// File holding the exported log
        file: PathBuf,

        /// Trust this public key for the log's username
        #[arg(long)]
        key: Option<AuthorId>,
    },

    /// Inspect or rebuild the dataset cache
    #[command(subcommand)]
    Cache(commands::CacheCommands),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    if let Commands::Keygen { username, force } = cli.command {
        let (author, key_file) = session::keygen(&cli.root, username, force)?;
        println!("{} {}", author.username(), author.id());
        eprintln!("key written to {}", key_file.display());
        return Ok(());
    }

    let ctx = cli
        .timeout
        .map_or_else(Context::background, |secs| {
            Context::with_timeout(Duration::from_secs(secs))
        });
    let session = Session::open(&cli.root, ctx)?;
    let format = cli.format;

    match cli.command {
        Commands::Keygen { .. } => Ok(()),
        Commands::Init { name } => commands::init(&session, name, format),
        Commands::Rename { dataset, new_name } => {
            commands::rename(&session, &dataset, new_name, format)
        }
        Commands::Save {
            dataset,
            path,
            title,
            previous,
        } => commands::save(&session, &dataset, path, title, previous, format),
        Commands::Delete { dataset, count } => commands::delete(&session, &dataset, count, format),
        Commands::Resolve { reference } => commands::resolve(&session, &reference, format),
        Commands::Versions { dataset } => commands::versions(&session, &dataset, format),
        Commands::Log { dataset } => commands::log(&session, &dataset, format),
        Commands::List => commands::list(&session, format),
        Commands::Export { dataset } => commands::export(&session, &dataset),
        Commands::Import { file, key } => commands::import(&session, &file, key, format),
        Commands::Cache(ref cmd) => commands::cache(&session, cmd, format),
    }
}
