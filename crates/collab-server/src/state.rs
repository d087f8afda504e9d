//! Shared application state.
//!
//! One instance per replica, behind an `Arc`, handed to every HTTP route
//! and socket task. Encapsulates all process-global pieces: the L1 cache,
//! the coordinator, the Pub/Sub listener, the write-behind worker and the
//! socket registries.

use std::sync::Arc;

use anyhow::Context;
use collab_config::Config;
use collab_engine::{Coordinator, StateCache, UpdateListener};
use collab_store::{PgStore, Store};
use collab_writer::WriteBehindWorker;
use collab_ws::{ConnectionManager, RoomRegistry, TokenValidator};
use redis::aio::ConnectionManager as RedisConnectionManager;
use tracing::info;

use crate::services::{ItemService, ListService, PermissionService};

pub struct AppState {
    pub config: Config,
    pub coordinator: Arc<Coordinator>,
    pub l1: Arc<StateCache>,
    pub writer: Arc<WriteBehindWorker>,
    pub listener: Arc<UpdateListener>,
    pub connections: Arc<ConnectionManager>,
    pub rooms: Arc<RoomRegistry>,
    pub validator: Arc<TokenValidator>,
    pub permissions: Arc<PermissionService>,
    pub items: Arc<ItemService>,
    pub lists: Arc<ListService>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = Arc::new(
            PgStore::connect(&config.database_url)
                .await
                .with_context(|| "failed to connect to the durable store")?,
        );
        info!("durable store connected");

        let redis_client = redis::Client::open(config.redis_url.as_str())
            .with_context(|| "invalid REDIS_URL")?;
        let redis_conn = RedisConnectionManager::new(redis_client.clone())
            .await
            .with_context(|| "failed to connect to Redis")?;
        info!("redis connected");

        let l1 = Arc::new(StateCache::new());
        let coordinator = Arc::new(
            Coordinator::new(redis_conn, l1.clone(), store.clone())
                .await
                .with_context(|| "failed to register mutation scripts")?,
        );

        let rooms = Arc::new(RoomRegistry::new());
        let listener = Arc::new(
            UpdateListener::start(redis_client, l1.clone(), rooms.clone())
                .await
                .with_context(|| "failed to start pub/sub listener")?,
        );

        let writer = Arc::new(WriteBehindWorker::start(
            store.clone(),
            config.writer_queue_size,
        ));

        let connections = Arc::new(ConnectionManager::new());
        let validator = Arc::new(TokenValidator::new(&config.jwt_secret));

        let permissions = Arc::new(PermissionService::new(store.clone()));
        let items = Arc::new(ItemService::new(
            coordinator.clone(),
            writer.clone(),
            rooms.clone(),
        ));
        let lists = Arc::new(ListService::new(
            store.clone(),
            coordinator.clone(),
            writer.clone(),
            rooms.clone(),
        ));

        Ok(Self {
            config,
            coordinator,
            l1,
            writer,
            listener,
            connections,
            rooms,
            validator,
            permissions,
            items,
            lists,
        })
    }

    /// Stop the background tasks; queued write-behind work is lost by
    /// contract.
    pub async fn shutdown(&self) {
        self.listener.stop().await;
        self.writer.stop().await;
    }
}
