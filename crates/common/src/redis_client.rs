//! Thin Redis client wrapper shared by every service: key/value, lists,
//! sorted sets and pub/sub, all over a single `ConnectionManager`.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::Serialize;
use tracing::info;

use crate::error::Result;

pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("connecting to redis at {}", redis_url);

        let client = Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        info!("redis connection established");
        Ok(Self { manager })
    }

    /// A cloned handle shares the same underlying multiplexed connection.
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn ping(&mut self) -> Result<String> {
        let result: String = redis::cmd("PING").query_async(&mut self.manager).await?;
        Ok(result)
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.manager.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    /// `SET key value NX EX seconds` — true if the key was set (we won the race).
    pub async fn set_nx_ex(&mut self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut self.manager)
            .await?;
        Ok(result.is_some())
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let result: Option<String> = self.manager.get(key).await?;
        Ok(result)
    }

    pub async fn del(&mut self, key: &str) -> Result<()> {
        self.manager.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn expire(&mut self, key: &str, ttl_secs: i64) -> Result<()> {
        self.manager.expire::<_, ()>(key, ttl_secs).await?;
        Ok(())
    }

    pub async fn lpush<T: Serialize>(&mut self, list: &str, data: &T) -> Result<()> {
        let json = serde_json::to_string(data)?;
        self.manager.lpush::<_, _, ()>(list, json).await?;
        Ok(())
    }

    pub async fn llen(&mut self, list: &str) -> Result<usize> {
        let len: usize = self.manager.llen(list).await?;
        Ok(len)
    }

    /// Blocking right-pop across one or more lists, in priority order.
    pub async fn brpop(&mut self, lists: &[String], timeout_secs: f64) -> Result<Option<(String, String)>> {
        let result: Option<(String, String)> = self.manager.brpop(lists, timeout_secs).await?;
        Ok(result)
    }

    pub async fn zadd(&mut self, key: &str, member: &str, score: f64) -> Result<()> {
        self.manager.zadd::<_, _, _, ()>(key, member, score).await?;
        Ok(())
    }

    pub async fn zrem(&mut self, key: &str, member: &str) -> Result<()> {
        self.manager.zrem::<_, _, ()>(key, member).await?;
        Ok(())
    }

    pub async fn zrangebyscore(&mut self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let members: Vec<String> = self.manager.zrangebyscore(key, min, max).await?;
        Ok(members)
    }

    pub async fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>> {
        let score: Option<f64> = self.manager.zscore(key, member).await?;
        Ok(score)
    }

    pub async fn publish(&mut self, channel: &str, message: &str) -> Result<()> {
        self.manager.publish::<_, _, ()>(channel, message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_redis_connection() {
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            let result = RedisClient::new(&redis_url).await;
            assert!(result.is_ok(), "failed to connect: {:?}", result.err());

            let mut client = result.unwrap();
            let pong = client.ping().await;
            assert_eq!(pong.unwrap(), "PONG");
        } else {
            println!("skipping test: REDIS_URL not set");
        }
    }

    #[tokio::test]
    async fn test_redis_set_get() {
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            let mut client = RedisClient::new(&redis_url).await.unwrap();

            client.set("test:key", "test_value").await.unwrap();
            let value = client.get("test:key").await.unwrap();

            assert_eq!(value, Some("test_value".to_string()));
        }
    }

    #[tokio::test]
    async fn test_set_nx_ex_only_one_winner() {
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            let mut client = RedisClient::new(&redis_url).await.unwrap();
            client.del("test:lock").await.unwrap();

            let first = client.set_nx_ex("test:lock", "a", 5).await.unwrap();
            let second = client.set_nx_ex("test:lock", "b", 5).await.unwrap();

            assert!(first);
            assert!(!second);
        }
    }
}
