//! tollgate-daemon: the seller-side payment channel service.
//!
//! Single OS process on a Tokio runtime: opens the database, loads the
//! seller key, connects the ledger client, and runs the sweep scheduler
//! until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use tollgate_channel::ChannelManager;
use tollgate_crypto::Keypair;
use tollgate_daemon::config::DaemonConfig;
use tollgate_daemon::scheduler::SweepScheduler;
use tollgate_ledger::rpc::RpcLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DaemonConfig::load()?;

    // A bare level directive so every tollgate_* crate picks it up;
    // RUST_LOG still overrides per target.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.advanced.log_level.parse()?),
        )
        .init();

    info!("tollgate daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let db_path = data_dir.join("tollgate.db");
    let conn = tollgate_db::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;

    // Config is authoritative for the rate; persist it so other tools read
    // the same value the daemon charges with.
    tollgate_db::queries::settings::set(
        &conn,
        "exchange_rate",
        &config.seller.exchange_rate.to_string(),
    )?;
    let exchange_rate = tollgate_db::queries::settings::exchange_rate(&conn)?;
    let db = Arc::new(tokio::sync::Mutex::new(conn));

    let key_path = config.seller_key_path();
    let seller_key = Keypair::from_hex_file(&key_path)
        .with_context(|| format!("loading seller key {}", key_path.display()))?;
    info!(pubkey_hash = %hex::encode(seller_key.pubkey_hash()), "seller key loaded");

    let ledger = Arc::new(RpcLedger::new(config.ledger.endpoint.clone()));
    info!(endpoint = %config.ledger.endpoint, "ledger client configured");

    let manager = Arc::new(ChannelManager::new(
        db.clone(),
        ledger,
        seller_key,
        exchange_rate,
        Duration::from_secs(config.ledger.timeout_secs),
    ));

    let mut scheduler = SweepScheduler::new(manager, db, config.sweep.clone());
    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("ctrl-c received, shutting down");

    scheduler.stop().await;
    info!("daemon stopped");
    Ok(())
}
