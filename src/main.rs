use tabledash::config::{self, Config};
use tabledash::core::db::DatabaseHandler;
use tabledash::dashboard::{session, Dashboard};
use tabledash::logger;
use tracing::info;

/// Connects once before serving so a bad database path stops the process
/// at startup instead of on the first page load.
fn probe_database(config: &Config) {
    match DatabaseHandler::connect(config.database.clone()) {
        Ok(mut handler) => match handler.list_tables() {
            Ok(tables) => info!("Database {} has {} tables", config.database.path, tables.len()),
            Err(e) => session::terminate(&e, Some(&mut handler)),
        },
        Err(e) => session::terminate(&e, None),
    }
}

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let args: Vec<String> = std::env::args().collect();
    let config = match config::resolve_config(args.get(1).map(String::as_str)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };

    // Initialize the log file and stdout mirror
    if let Err(e) = logger::init(&config.logging.dir) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    info!("Starting tabledash...");
    probe_database(&config);

    let dashboard = Dashboard::new(&config);
    if let Err(e) = dashboard.start().await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
