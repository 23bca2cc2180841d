mod check_schema;
mod logging;
mod record;
mod serve;
mod watch;

use std::future::Future;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use crate::logging::LogFormat;

/// Live test-case dashboard.
#[derive(Parser)]
#[command(name = "testboard", version, about = "Live test-case dashboard")]
struct Cli {
    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info", env = "TESTBOARD_LOG_LEVEL")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, default_value = "compact", value_enum)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Where records live and how they are shaped.
#[derive(Args, Debug, Clone)]
pub(crate) struct StoreArgs {
    /// Schema definition file (kind name -> field specs)
    #[arg(long, default_value = "schemas.json", env = "TESTBOARD_SCHEMA")]
    schema: PathBuf,
    /// Store URL: `memory:` or `file:<path>`
    #[arg(long, default_value = "file:records.json", env = "TESTBOARD_STORE_URL")]
    store: String,
    /// Record kind to operate on
    #[arg(long, default_value = "TestCase", env = "TESTBOARD_KIND")]
    kind: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve live snapshots of one record kind over WebSocket
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080", env = "TESTBOARD_PORT")]
        port: u16,
        #[command(flatten)]
        store: StoreArgs,
        /// Comma-separated origins allowed to connect; `*` allows any
        #[arg(long, default_value = "*", env = "TESTBOARD_ALLOWED_ORIGINS")]
        allowed_origins: String,
        /// How often the schema and file store are checked for changes
        #[arg(long, default_value = "500")]
        schema_poll_ms: u64,
    },

    /// Connect to a server and display the live table
    Watch {
        /// Server socket URL
        #[arg(long, default_value = "ws://127.0.0.1:8080/socket")]
        url: String,
        /// Render timestamps in UTC instead of the local offset
        #[arg(long)]
        utc: bool,
        /// Exit after the first snapshot
        #[arg(long)]
        once: bool,
    },

    /// Parse and compile a schema definition, reporting each kind
    CheckSchema {
        /// Path to the schema definition file
        file: PathBuf,
    },

    /// Create, change, remove or list records
    Record {
        #[command(subcommand)]
        command: RecordCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum RecordCommands {
    /// Insert a record from a JSON object
    Add {
        #[command(flatten)]
        store: StoreArgs,
        /// Field values as a JSON object
        #[arg(long)]
        data: String,
    },
    /// Merge a JSON object into an existing record; `null` removes a field
    Update {
        #[command(flatten)]
        store: StoreArgs,
        /// Record id
        id: String,
        /// Field values as a JSON object
        #[arg(long)]
        data: String,
    },
    /// Remove a record
    Delete {
        #[command(flatten)]
        store: StoreArgs,
        /// Record id
        id: String,
    },
    /// Print every record of the kind as JSON
    List {
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level, cli.log_format) {
        eprintln!("error: {}", e);
        process::exit(1);
    }

    match cli.command {
        Commands::Serve {
            port,
            store,
            allowed_origins,
            schema_poll_ms,
        } => {
            let config = serve::ServeConfig {
                port,
                schema: store.schema,
                store_url: store.store,
                kind: store.kind,
                allowed_origins,
                poll_interval: std::time::Duration::from_millis(schema_poll_ms.max(1)),
            };
            if let Err(e) = block_on(serve::start_server(config)) {
                eprintln!("Server error: {}", e);
                process::exit(1);
            }
        }
        Commands::Watch { url, utc, once } => {
            if let Err(e) = block_on(watch::cmd_watch(&url, utc, once)) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
        Commands::CheckSchema { file } => {
            let ok = block_on(check_schema::cmd_check_schema(&file));
            if !ok {
                process::exit(1);
            }
        }
        Commands::Record { command } => {
            if let Err(e) = block_on(record::cmd_record(command)) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
    }
}

/// Run `fut` to completion on a fresh multi-threaded runtime.
fn block_on<F: Future>(fut: F) -> F::Output {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(fut),
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {}", e);
            process::exit(1);
        }
    }
}
