use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::Client;
use redis::aio::MultiplexedConnection;
use rusqlite::Connection;
use thiserror::Error;
use tracing::{error, info};

use crate::config::{Config, MongoConfig, RedisConfig, RelationalConfig};
use crate::db;
use crate::store::MongoStore;

/// A backing store could not be reached at startup. Always fatal.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("document store unreachable: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("cache unreachable: {0}")]
    Cache(String),
    #[error("relational store unavailable: {0}")]
    Relational(String),
}

/// Connections acquired once at startup and held for the whole process.
pub struct Backends {
    client: Client,
    pub documents: MongoStore,
    cache: MultiplexedConnection,
    pub relational: Connection,
}

impl Backends {
    pub async fn connect(cfg: &Config) -> Result<Self, InitError> {
        let result = Self::connect_all(cfg).await;
        if let Err(e) = &result {
            error!("Failed to initialize connections: {}", e);
        }
        result
    }

    async fn connect_all(cfg: &Config) -> Result<Self, InitError> {
        let client = connect_mongo(&cfg.mongodb).await?;
        let cache = connect_cache(&cfg.redis).await?;
        let relational = connect_relational(&cfg.relational)?;
        info!(
            "Connected: mongodb {} / redis {} / {}",
            cfg.mongodb.database,
            cfg.redis.url(),
            cfg.relational.path
        );
        Ok(Self {
            documents: MongoStore::new(client.database(&cfg.mongodb.database)),
            client,
            cache,
            relational,
        })
    }

    /// Re-ping every store over the already open connections.
    pub async fn ping_all(&mut self) -> anyhow::Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        let _: String = redis::cmd("PING").query_async(&mut self.cache).await?;
        db::ping(&self.relational)?;
        Ok(())
    }
}

async fn connect_mongo(cfg: &MongoConfig) -> Result<Client, InitError> {
    let mut opts = ClientOptions::parse(&cfg.uri).await?;
    opts.server_selection_timeout = Some(Duration::from_millis(cfg.server_selection_timeout_ms));
    let client = Client::with_options(opts)?;
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await?;
    Ok(client)
}

async fn connect_cache(cfg: &RedisConfig) -> Result<MultiplexedConnection, InitError> {
    let client = redis::Client::open(cfg.url()).map_err(|e| InitError::Cache(e.to_string()))?;
    let timeout = Duration::from_millis(cfg.timeout_ms);

    let ping = async {
        let mut con = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok::<_, redis::RedisError>(con)
    };

    match tokio::time::timeout(timeout, ping).await {
        Ok(Ok(con)) => Ok(con),
        Ok(Err(e)) => Err(InitError::Cache(e.to_string())),
        Err(_) => Err(InitError::Cache(format!(
            "no PING reply within {}ms",
            cfg.timeout_ms
        ))),
    }
}

fn connect_relational(cfg: &RelationalConfig) -> Result<Connection, InitError> {
    let conn = db::connect(&cfg.path).map_err(|e| InitError::Relational(e.to_string()))?;
    db::init_schema(&conn).map_err(|e| InitError::Relational(e.to_string()))?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bad_mongo_uri_is_init_error() {
        let cfg = MongoConfig {
            uri: "not-a-mongo-uri".into(),
            ..Default::default()
        };
        let err = connect_mongo(&cfg).await.unwrap_err();
        assert!(matches!(err, InitError::Mongo(_)));
    }

    #[tokio::test]
    async fn unreachable_cache_is_init_error() {
        let cfg = RedisConfig {
            host: "127.0.0.1".into(),
            port: 1,
            timeout_ms: 500,
        };
        let err = connect_cache(&cfg).await.unwrap_err();
        assert!(matches!(err, InitError::Cache(_)));
        assert!(err.to_string().starts_with("cache unreachable"));
    }

    #[test]
    fn relational_opens_in_memory() {
        let conn = connect_relational(&RelationalConfig {
            path: ":memory:".into(),
        })
        .unwrap();
        db::ping(&conn).unwrap();
    }
}
