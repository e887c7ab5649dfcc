//! kittend: the Kitten daemon.
//!
//! Serves captioned images and GIFs over HTTP from a shared
//! [`CaptionService`](kitten::CaptionService).

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kitten::providers::{TenorClient, UnsplashClient};
use kitten::server::config::{Config, Secrets};
use kitten::{CaptionService, Kitten, KittenError};

/// Kitten daemon, serving captioned media over HTTP.
#[derive(Parser)]
#[command(name = "kittend")]
#[command(version = kitten::PKG_VERSION)]
#[command(about = "Kitten caption rendering daemon")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;

    let service = Arc::new(build_service(&config, &secrets).await?);

    if let Some(artifacts) = service.artifact_cache() {
        artifacts.spawn_sweeper(config.cache.sweep_config(), config.cache.sweep_interval());
    }

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .map_err(|e| KittenError::Configuration(format!("Invalid address: {e}")))?;

    info!(version = kitten::version_string(), %addr, "kittend starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, kitten::server::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("kittend stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Build a [`CaptionService`] from configuration.
async fn build_service(config: &Config, secrets: &Secrets) -> Result<CaptionService, KittenError> {
    let mut builder = Kitten::builder()
        .cache_ttl(config.cache.ttl())
        .caption_config(config.render.caption_config())
        .frame_concurrency(config.render.frame_concurrency)
        .jpeg_quality(config.render.jpeg_quality)
        .max_gif_pixels(config.render.max_gif_pixels)
        .fetch_config(config.render.fetch_config())
        .remote_cache_config(config.remote.remote_cache_config());

    if let Some(dir) = &config.cache.dir {
        builder = builder.artifact_dir(dir);
    }
    if let Some(gif_caption) = config.render.gif_caption_config() {
        builder = builder.gif_caption_config(gif_caption);
    }

    // Only register providers when the section is present AND keys are available
    if let Some(unsplash) = &config.providers.unsplash {
        match secrets.unsplash_key() {
            Some(key) => {
                let mut client = match &unsplash.base_url {
                    Some(base) => UnsplashClient::with_base_url(key, base)?,
                    None => UnsplashClient::new(key)?,
                };
                if let Some(name) = &unsplash.app_name {
                    client = client.app_name(name);
                }
                builder = builder.image_resolver(Arc::new(client));
            }
            None => warn!("unsplash configured without an access key"),
        }
    }

    if let Some(tenor) = &config.providers.tenor {
        match secrets.tenor_keys() {
            Some((api_key, client_key)) => {
                let client = match &tenor.base_url {
                    Some(base) => TenorClient::with_base_url(api_key, client_key, base)?,
                    None => TenorClient::new(api_key, client_key)?,
                };
                builder = builder.gif_resolver(Arc::new(client));
            }
            None => warn!("tenor configured without API keys"),
        }
    }

    if let Some(url) = &config.remote.redis_url {
        builder = with_redis(builder, url).await?;
    }

    builder.build()
}

#[cfg(feature = "redis")]
async fn with_redis(
    builder: kitten::KittenBuilder,
    url: &str,
) -> Result<kitten::KittenBuilder, KittenError> {
    let store = kitten::cache::RedisStore::connect(url).await?;
    Ok(builder.remote_store(Arc::new(store)))
}

#[cfg(not(feature = "redis"))]
async fn with_redis(
    builder: kitten::KittenBuilder,
    _url: &str,
) -> Result<kitten::KittenBuilder, KittenError> {
    warn!("redis_url is set but kittend was built without the `redis` feature; using the in-process store");
    Ok(builder)
}
