//! Wires CLI input to `oscar_core::serve`. No protocol logic lives here
//! -- store open, listener construction, and graceful shutdown plumbing
//! only.

use std::sync::Arc;

use anyhow::{Context, Result};
use oscar_core::rate_limit::RateClassTable;
use oscar_core::{CookieBaker, ListenersCfg, NullDispatcher, ServerContext, SessionManager, Store};
use tokio_util::sync::CancellationToken;

pub struct ServerOptions {
    pub listeners: ListenersCfg,
    pub db_path: String,
    pub disable_auth: bool,
    pub cookie_secret: Option<String>,
}

pub async fn run(opts: ServerOptions) -> Result<()> {
    let store = Arc::new(
        Store::open(&opts.db_path)
            .await
            .with_context(|| format!("opening store at {}", opts.db_path))?,
    );
    let cookie_baker = match &opts.cookie_secret {
        Some(secret) => CookieBaker::new(secret.as_bytes()),
        None => {
            log::warn!("no --cookie-secret set; minting cookies from a random key for this process only");
            CookieBaker::random()
        }
    };

    let ctx = Arc::new(ServerContext {
        session_manager: Arc::new(SessionManager::new()),
        rate_table: Arc::new(RateClassTable::new()),
        cookie_baker: Arc::new(cookie_baker),
        dispatcher: Arc::new(NullDispatcher),
        store,
        disable_auth: opts.disable_auth,
    });

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("received shutdown signal, closing listeners");
            signal_shutdown.cancel();
        }
    });

    oscar_core::serve(&opts.listeners.bos, ctx, shutdown)
        .await
        .context("serving BOS listeners")
}
