mod api;
mod config;
mod fotos;
mod guard;
mod models;
mod output;
mod rows;
mod tasks;

use log::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    info!(
        "polling {} every {}s",
        config.base_url, config.interval_seconds
    );

    let client = api::ApiClient::new(&config);
    let fotos = fotos::Fotos::load(&config);
    let ctx = tasks::feed::FeedContext::new(config, client, fotos);

    // Only a startup failure (categories unreachable) gets here; once the
    // loop is running, cycle errors are logged and absorbed.
    if let Err(e) = tasks::feed::run_feed_loop(ctx).await {
        error!("startup failed: {e}");
    }
}
