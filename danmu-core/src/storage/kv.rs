//! Key-value persistence tier.
//!
//! Either a regular Redis connection (`REDIS_URL`) or the Upstash REST API
//! (`UPSTASH_REDIS_REST_URL` + token), whichever the deployment configured.
//! Values are serialized JSON strings keyed by the cache-data names.

use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

use crate::config::Settings;
use crate::{Error, Result};

#[derive(Clone)]
pub enum KvStore {
    Redis(redis::aio::ConnectionManager),
    Upstash {
        client: reqwest::Client,
        url: String,
        token: String,
    },
}

impl KvStore {
    /// Build from configuration; `None` when no KV backend is configured.
    pub async fn connect(settings: &Settings) -> Result<Option<Self>> {
        if !settings.redis_url.is_empty() {
            let client = redis::Client::open(settings.redis_url.as_str())?;
            let conn = client.get_connection_manager().await?;
            return Ok(Some(Self::Redis(conn)));
        }

        if !settings.upstash_redis_rest_url.is_empty() && !settings.upstash_redis_rest_token.is_empty()
        {
            let store = Self::Upstash {
                client: reqwest::Client::new(),
                url: settings.upstash_redis_rest_url.trim_end_matches('/').to_string(),
                token: settings.upstash_redis_rest_token.clone(),
            };
            // Probe so the caller can fall through to memory-only on bad
            // credentials.
            store.get("__probe__").await?;
            return Ok(Some(store));
        }

        Ok(None)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let value: Option<String> = conn.get(key).await?;
                Ok(value)
            }
            Self::Upstash { client, url, token } => {
                let resp: Value = client
                    .post(url)
                    .bearer_auth(token)
                    .json(&serde_json::json!(["GET", key]))
                    .send()
                    .await?
                    .error_for_status()
                    .map_err(|e| Error::Upstream(format!("upstash GET failed: {e}")))?
                    .json()
                    .await?;
                Ok(resp
                    .get("result")
                    .and_then(Value::as_str)
                    .map(str::to_string))
            }
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Self::Redis(conn) => {
                let mut conn = conn.clone();
                let _: () = conn.set(key, value).await?;
            }
            Self::Upstash { client, url, token } => {
                client
                    .post(url)
                    .bearer_auth(token)
                    .json(&serde_json::json!(["SET", key, value]))
                    .send()
                    .await?
                    .error_for_status()
                    .map_err(|e| Error::Upstream(format!("upstash SET failed: {e}")))?;
            }
        }
        debug!(key, "Persisted cache key to KV");
        Ok(())
    }
}
