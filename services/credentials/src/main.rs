use clap::Parser;
use sea_orm::Database;
use tracing::info;

use sesame_credentials::config::CredentialsConfig;
use sesame_credentials::state::AppState;
use sesame_credentials::sweeper::sweep_tier;

#[derive(Parser)]
#[command(about = "Remove expired OTPs and sessions from both credential tiers")]
struct Args {
    /// Run a single sweep and exit instead of looping
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sesame_core::tracing::init_tracing();

    let args = Args::parse();
    let config = CredentialsConfig::from_env()?;

    let db = Database::connect(&config.database_url).await?;

    let redis_cfg = deadpool_redis::Config::from_url(&config.redis_url);
    let redis = redis_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;

    let state = AppState::new(db, redis, config.hybrid());
    let repo = state.credentials();
    let limit = repo.config.operation_timeout;

    let mut ticker = tokio::time::interval(config.cleanup_interval());
    info!(interval = ?config.cleanup_interval(), once = args.once, "credsweep started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_tier("cache", &repo.cache_otps, &repo.cache_sessions, limit).await;
                sweep_tier("durable", &repo.durable_otps, &repo.durable_sessions, limit).await;
                if args.once {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}
