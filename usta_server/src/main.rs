use log::*;
use usta_server::{cli::handle_command_line_args, config::ServerConfig, server::run_server};

#[actix_web::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("No .env file loaded ({e}). Using the process environment only.");
    }
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = ServerConfig::from_env_or_default();
    info!("🚀️ Usta admin server listening on {}:{}", config.host, config.port);
    if let Err(e) = run_server(config).await {
        error!("🚀️ Server stopped with an error. {e}");
        std::process::exit(1);
    }
    info!("🚀️ Server shut down cleanly");
}
