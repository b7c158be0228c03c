// Copyright 2025 The Registry Cluster Operator Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Server-protocol seam for the cache tier. Readiness probing, role
//! inspection and manual failover go through [`RedisAdmin`] so the lifecycle
//! logic is testable without live servers.

use crate::reconcile::Error;
use crate::reconcile::cache::{SENTINEL_GROUP, SENTINEL_PORT, SERVER_PORT};
use async_trait::async_trait;

/// Resolved connection coordinates for the cache endpoint the consumer
/// components will use.
#[derive(Clone, Debug)]
pub struct RedisConnect {
    pub endpoint: String,
    pub port: String,
    pub password: Option<String>,
    pub group_name: Option<String>,
    pub schema: String,
}

impl RedisConnect {
    pub fn in_cluster_sentinel(endpoint: String, password: Option<String>) -> Self {
        Self {
            endpoint,
            port: SENTINEL_PORT.to_owned(),
            password,
            group_name: Some(SENTINEL_GROUP.to_owned()),
            schema: "sentinel".to_owned(),
        }
    }

    /// Connection URL handed to consumer components, in the form the
    /// application's config loader parses.
    pub fn url(&self) -> String {
        let auth = match &self.password {
            Some(password) => format!(":{password}@"),
            None => String::new(),
        };

        match (self.schema.as_str(), &self.group_name) {
            ("sentinel", Some(group)) => format!(
                "redis+sentinel://{auth}{}:{}/{group}",
                self.endpoint, self.port
            ),
            _ => format!("redis://{auth}{}:{}", self.endpoint, self.port),
        }
    }
}

/// Administrative operations against cache servers and sentinels.
#[async_trait]
pub trait RedisAdmin: Send + Sync {
    /// Liveness probe against the resolved endpoint.
    async fn ping(&self, connect: &RedisConnect) -> Result<(), Error>;

    /// Whether the server at `ip` currently holds the master role.
    async fn role_is_master(&self, ip: &str, password: Option<&str>) -> Result<bool, Error>;

    /// Ask the sentinel at `endpoint` to fail the monitored group over to a
    /// surviving replica.
    async fn force_failover(&self, endpoint: &str) -> Result<(), Error>;
}

/// Production implementation backed by real connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedisCli;

impl RedisCli {
    async fn connection(url: &str) -> Result<redis::aio::MultiplexedConnection, Error> {
        let client = redis::Client::open(url)?;
        Ok(client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl RedisAdmin for RedisCli {
    async fn ping(&self, connect: &RedisConnect) -> Result<(), Error> {
        // Probe the concrete endpoint; sentinel answers PING like a server.
        let auth = match &connect.password {
            Some(password) => format!(":{password}@"),
            None => String::new(),
        };
        let url = format!("redis://{auth}{}:{}", connect.endpoint, connect.port);

        let mut conn = Self::connection(&url).await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn role_is_master(&self, ip: &str, password: Option<&str>) -> Result<bool, Error> {
        let auth = match password {
            Some(password) => format!(":{password}@"),
            None => String::new(),
        };
        let url = format!("redis://{auth}{ip}:{SERVER_PORT}");

        let mut conn = Self::connection(&url).await?;
        let info: String = redis::cmd("INFO")
            .arg("replication")
            .query_async(&mut conn)
            .await?;
        Ok(info.contains("role:master"))
    }

    async fn force_failover(&self, endpoint: &str) -> Result<(), Error> {
        let url = format!("redis://{endpoint}:{SENTINEL_PORT}");

        let mut conn = Self::connection(&url).await?;
        redis::cmd("SENTINEL")
            .arg("failover")
            .arg(SENTINEL_GROUP)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_urls_carry_the_monitored_group() {
        let connect =
            RedisConnect::in_cluster_sentinel("10.0.0.7".to_owned(), Some("s3cr3t".to_owned()));
        assert_eq!(
            connect.url(),
            "redis+sentinel://:s3cr3t@10.0.0.7:26379/mymaster"
        );
    }

    #[test]
    fn plain_urls_omit_auth_when_no_password_is_set() {
        let connect = RedisConnect {
            endpoint: "cache.example.com".to_owned(),
            port: SERVER_PORT.to_owned(),
            password: None,
            group_name: None,
            schema: "redis".to_owned(),
        };
        assert_eq!(connect.url(), "redis://cache.example.com:6379");
    }
}
