#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

mod auth;
mod bridge;
mod cli;
mod config;
mod db;
mod discourse;
mod error;
mod parsers;
mod telegram;
mod utils;
mod web;

use auth::{AuthHandshake, KeyPair};
use bridge::{BotRole, BridgeCore};
use cli::Args;
use config::Config;
use db::{CorrelationStore, DatabaseManager, KvStore};
use discourse::DiscourseClient;
use telegram::TelegramClient;
use web::WebServer;
use web::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(Config::load(args.config.as_deref())?);
    utils::logging::init_tracing(&config.logging);
    if args.check_config {
        info!("configuration is valid");
        return Ok(());
    }
    Metrics::start();
    info!("discourse-telegram bridge starting up");

    let db_manager = DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;

    let kv = Arc::new(KvStore::new(db_manager.backend()));
    let store = CorrelationStore::new(kv.clone(), &config.store);
    let loaded = kv.load().await?;
    info!(loaded, db_type = ?db_manager.db_type(), "correlation store loaded");
    let flusher = kv
        .clone()
        .spawn_flusher(Duration::from_millis(config.store.flush_tick_ms));

    let key_bits = config.auth.key_bits;
    let keys = tokio::task::spawn_blocking(move || KeyPair::generate(key_bits)).await??;
    let auth = Arc::new(AuthHandshake::new(
        keys,
        store.clone(),
        config.forum_url(),
        config.auth.clone(),
    ));

    let post_bot = Arc::new(TelegramClient::new(
        &config.telegram.api_url,
        config.telegram.post_bot_token.clone(),
    )?);
    let sync_bot = Arc::new(TelegramClient::new(
        &config.telegram.api_url,
        config.telegram.sync_bot_token.clone(),
    )?);
    let forum = Arc::new(DiscourseClient::new(&config.discourse)?);

    let bridge = Arc::new(BridgeCore::new(
        config.clone(),
        post_bot.clone(),
        sync_bot.clone(),
        forum,
        store,
        auth,
    ));

    let web_server = WebServer::new(config.clone(), bridge.clone());
    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });
    let post_poller = tokio::spawn(bridge.clone().run_poller(post_bot, BotRole::Post));
    let sync_poller = tokio::spawn(bridge.run_poller(sync_bot, BotRole::Sync));

    tokio::select! {
        _ = web_handle => warn!("web server stopped"),
        _ = post_poller => warn!("post bot poller stopped"),
        _ = sync_poller => warn!("sync bot poller stopped"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for shutdown signal: {}", e);
            }
        }
    }

    info!("discourse-telegram bridge shutting down");
    flusher.abort();
    let flushed = kv.flush(true).await;
    info!(flushed, "pending store writes flushed");
    Ok(())
}
