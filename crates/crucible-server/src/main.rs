//! Crucible server binary
//!
//! TCP session gateway for crucible games.
//!
//! ## Usage
//!
//! ```bash
//! crucible-server [port] [--games-dir DIR] [--data-dir DIR]
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crucible_catalog::Catalog;
use crucible_server::constants::{
    DEFAULT_DATA_DIR, DEFAULT_GAMES_DIR, DEFAULT_PORT, ENV_DATA_DIR, ENV_GAMES_DIR, ENV_PORT,
};
use crucible_server::Gateway;
use crucible_store::GameDirectory;

fn print_usage() {
    eprintln!(
        r#"crucible-server - TCP session gateway for crucible games

USAGE:
    crucible-server [OPTIONS] [PORT]

OPTIONS:
    --games-dir <DIR>    Directory for per-game SQLite files (default: {games})
    --data-dir <DIR>     Directory holding catalog JSON files (default: {data})
    --help, -h           Show this help

ENVIRONMENT:
    {env_port}        Overrides the default port
    {env_games}   Overrides the games directory
    {env_data}    Overrides the data directory
"#,
        games = DEFAULT_GAMES_DIR,
        data = DEFAULT_DATA_DIR,
        env_port = ENV_PORT,
        env_games = ENV_GAMES_DIR,
        env_data = ENV_DATA_DIR,
    );
}

struct Config {
    port: u16,
    games_dir: PathBuf,
    data_dir: PathBuf,
}

fn parse_args(args: &[String]) -> Result<Config, String> {
    let mut config = Config {
        port: env::var(ENV_PORT)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT),
        games_dir: env::var(ENV_GAMES_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_GAMES_DIR)),
        data_dir: env::var(ENV_DATA_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR)),
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--games-dir" => {
                let value = args.get(i + 1).ok_or("--games-dir requires a value")?;
                config.games_dir = PathBuf::from(value);
                i += 2;
            }
            "--data-dir" => {
                let value = args.get(i + 1).ok_or("--data-dir requires a value")?;
                config.data_dir = PathBuf::from(value);
                i += 2;
            }
            arg => {
                config.port = arg
                    .parse()
                    .map_err(|_| format!("unknown argument: {arg}"))?;
                i += 1;
            }
        }
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let catalog = match Catalog::load(&config.data_dir) {
        Ok(catalog) => Arc::new(catalog),
        Err(err) => {
            tracing::error!(dir = %config.data_dir.display(), %err, "failed to load catalog");
            return ExitCode::FAILURE;
        }
    };

    let games = Arc::new(GameDirectory::new(&config.games_dir));
    let gateway = Arc::new(Gateway::new(games, catalog, config.port));

    tracing::info!(
        port = config.port,
        games_dir = %config.games_dir.display(),
        "starting crucible server"
    );

    if let Err(err) = crucible_server::server::run(gateway, config.port).await {
        tracing::error!(%err, "server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
