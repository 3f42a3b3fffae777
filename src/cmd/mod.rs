mod replay;
mod tokenize;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sql-replay")]
#[command(version)]
#[command(about = "Replay SQL dumps into a database, statement by statement", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a SQL dump into MySQL or DuckDB
    Replay {
        /// Dump source: http(s) URL, local file, or literal SQL text.
        /// Supports .gz, .bz2, .xz, .zst compression
        source: Option<String>,

        /// MySQL host
        #[arg(long, env = "SQL_REPLAY_HOST")]
        host: Option<String>,

        /// MySQL port
        #[arg(short = 'P', long, env = "SQL_REPLAY_PORT")]
        port: Option<u16>,

        /// MySQL user
        #[arg(short, long, env = "SQL_REPLAY_USER")]
        user: Option<String>,

        /// MySQL password
        #[arg(long, env = "SQL_REPLAY_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// MySQL database to select before replaying
        #[arg(short, long)]
        database: Option<String>,

        /// Replay into a DuckDB file instead of MySQL (":memory:" for a scratch database)
        #[arg(long)]
        duckdb: Option<PathBuf>,

        /// Commit after this many successful statements [default: 200]
        #[arg(long)]
        commit_every: Option<usize>,

        /// Abort on the first failing statement
        #[arg(long)]
        stop_on_error: bool,

        /// Exit with status 1 when any statement failed
        #[arg(long)]
        fail_on_errors: bool,

        /// YAML config file with source, destination and replay settings
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Show progress during replay
        #[arg(short, long)]
        progress: bool,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the statements a dump splits into, without executing them
    Tokenize {
        /// Dump source: http(s) URL, local file, or literal SQL text
        source: String,

        /// Stop after this many statements
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output statements as a JSON array
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Replay {
            source,
            host,
            port,
            user,
            password,
            database,
            duckdb,
            commit_every,
            stop_on_error,
            fail_on_errors,
            config,
            progress,
            json,
        } => replay::run(replay::ReplayArgs {
            overrides: crate::config::ReplayOverrides {
                source,
                host,
                port,
                user,
                password,
                database,
                duckdb,
                commit_every,
                stop_on_error,
            },
            config,
            fail_on_errors,
            progress,
            json,
        }),
        Commands::Tokenize {
            source,
            limit,
            json,
        } => tokenize::run(source, limit, json),
        Commands::Completions { shell } => {
            generate(
                shell,
                &mut Cli::command(),
                "sql-replay",
                &mut io::stdout(),
            );
            Ok(())
        }
    }
}
