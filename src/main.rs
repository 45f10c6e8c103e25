use log::*;
use service::config::Config;
use service::logging::Logger;
use service::AppState;
use sse::StreamRegistry;
use std::sync::Arc;
use std::time::Duration;
use upstream::Fetcher;

#[tokio::main]
async fn main() {
    let config = Config::new();
    Logger::init_logger(&config);

    let fetcher = Fetcher::new(Duration::from_secs(config.fetch_timeout_secs))
        .expect("Failed to build the upstream HTTP client");
    let stream_registry = Arc::new(StreamRegistry::new(fetcher));
    let app_state = AppState::new(config, stream_registry);

    if let Err(err) = web::init_server(app_state).await {
        error!("Server error: {err}");
        std::process::exit(1);
    }
}
