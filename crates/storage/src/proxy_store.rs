//! Proxy persistence. Read-mostly from the check worker, which resolves
//! `monitor.proxy_id` before each execution.

use sqlx::PgPool;
use uptime_common::error::Result;
use uptime_domain::Proxy;
use uuid::Uuid;

pub struct ProxyStore {
    pool: PgPool,
}

impl ProxyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Proxy>> {
        let proxy = sqlx::query_as::<_, Proxy>("SELECT * FROM proxies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(proxy)
    }
}
