// =============================================================================
// Nebula Signals — Main Entry Point
// =============================================================================
//
// Wires the Pricing Fabric's providers, the message-source adapter, the
// Outcome/Reputation/Bootstrap engines, persistence, and the REST/WS
// surface into one shared `EngineState`, then spawns:
//   - one bootstrap pass per monitored channel (§4.5), gating that
//     channel's live subscription until its replay completes;
//   - a checkpoint-realization loop (§4.3);
//   - a periodic ATH/termination poll loop (§4.3);
//   - the axum HTTP/WS server (§6).
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use nebula_signals::clock::{SharedClock, SystemClock};
use nebula_signals::config::RuntimeConfig;
use nebula_signals::message::MessageSource;
use nebula_signals::persistence::PersistenceLayer;
use nebula_signals::pricing::provider::PriceProvider;
use nebula_signals::providers::{CoinGeckoProvider, DexScreenerProvider, HttpPollingMessageSource};
use nebula_signals::state::EngineState;
use nebula_signals::types::ChainId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║              Nebula Signals — Starting Up                 ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });

    let monitored_channels: Vec<String> = std::env::var("NEBULA_CHANNELS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if monitored_channels.is_empty() {
        warn!("NEBULA_CHANNELS is empty — no channel will be bootstrapped or monitored until configured");
    } else {
        info!(channels = ?monitored_channels, "monitoring channels");
    }

    // ── 2. Pricing Fabric providers (§4.2) ───────────────────────────────
    // Ordered per chain: DexScreener first (on-chain, spot-only, fast) then
    // CoinGecko (slower but carries `at`/`ohlc` capability for historical
    // resolution and bootstrap).
    let dexscreener: Arc<dyn PriceProvider> = Arc::new(DexScreenerProvider::new());
    let coingecko: Arc<dyn PriceProvider> = Arc::new(CoinGeckoProvider::new());

    let mut providers_by_chain: HashMap<ChainId, Vec<Arc<dyn PriceProvider>>> = HashMap::new();
    providers_by_chain.insert(ChainId::Ethereum, vec![dexscreener.clone(), coingecko.clone()]);
    providers_by_chain.insert(ChainId::Solana, vec![dexscreener.clone(), coingecko.clone()]);
    providers_by_chain.insert(ChainId::Other, vec![coingecko]);

    // ── 3. Message source (§6; transport itself out of scope per §1) ────
    let message_source_url =
        std::env::var("NEBULA_MESSAGE_SOURCE_URL").unwrap_or_else(|_| "http://localhost:8090".to_string());
    let message_source: Arc<dyn MessageSource> =
        Arc::new(HttpPollingMessageSource::new(message_source_url, Duration::from_secs(10)));

    if let Err(e) = message_source.connect().await {
        warn!(error = %e, "message source connect failed at startup, will retry on subscribe");
    }

    // ── 4. Persistence ────────────────────────────────────────────────────
    let persistence = Arc::new(PersistenceLayer::load(&config.data_dir)?);
    let flush_handles = persistence.spawn_flushers(Duration::from_secs(5));

    // ── 5. Build shared engine state ─────────────────────────────────────
    let clock: SharedClock = Arc::new(SystemClock);
    let state = EngineState::new(
        config,
        persistence.clone(),
        providers_by_chain,
        message_source.clone(),
        clock,
        monitored_channels.clone(),
    );

    // ── 6. Bootstrap each monitored channel, then subscribe it live ─────
    for channel_id in &monitored_channels {
        let state = state.clone();
        let channel_id = channel_id.clone();
        let message_source = message_source.clone();
        tokio::spawn(async move {
            info!(channel_id = %channel_id, "historical bootstrap starting");
            state.run_bootstrap_for_channel(channel_id.clone()).await;
            info!(channel_id = %channel_id, "historical bootstrap complete, switching to live monitoring");

            loop {
                let live_state = state.clone();
                let handler_channel = channel_id.clone();
                let result = message_source
                    .subscribe(
                        &channel_id,
                        Box::new(move |message| {
                            let state = live_state.clone();
                            tokio::spawn(async move {
                                state.ingest_message(message).await;
                            });
                        }),
                    )
                    .await;

                if let Err(e) = result {
                    error!(channel_id = %handler_channel, error = %e, "message subscription ended, reconnecting in 5s");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    // ── 7. Checkpoint realization loop (§4.3) ────────────────────────────
    let checkpoint_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            checkpoint_state.run_checkpoint_cycle().await;
        }
    });

    // ── 8. Periodic ATH/termination poll loop (§4.3) ─────────────────────
    let poll_interval_secs = state.config.poll_interval_secs;
    let ath_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(poll_interval_secs));
        loop {
            interval.tick().await;
            ath_state.run_ath_poll_cycle().await;
        }
    });

    // ── 9. REST/WS server (§6) ────────────────────────────────────────────
    let bind_addr = state.config.bind_addr.clone();
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = nebula_signals::api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("all subsystems running. Press Ctrl+C to stop.");

    // ── 10. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, flushing persistence before exit");

    persistence.flush_all();
    drop(flush_handles);

    info!("nebula-signals shut down complete.");
    Ok(())
}
