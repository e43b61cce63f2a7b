use clap::Parser;
use pantry_api::{
    connection::{connect, migrate},
    filters::routes,
    Config, DEFAULT_LOG_FILTER,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    // Also forwards `log` records from the library and from warp.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let url = config.database_url();
    let pool = connect(&url, config.max_connections()).await?;
    migrate(&pool).await?;

    let (addr, server) = warp::serve(routes(pool)).try_bind_with_graceful_shutdown(
        config.bind,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Could not listen for shutdown signal ({e})");
            }
            log::info!("Shutting down");
        },
    )?;

    log::info!("Serving {:?} environment on http://{addr}", config.environment);
    server.await;

    Ok(())
}
