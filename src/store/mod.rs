//! Consistent store client (§4.A): a thin, typed façade over a
//! strongly-consistent key-value store (etcd), exposing exactly the
//! operations the rest of the system needs -- `get`, `set`,
//! `set_if_absent`, `delete`, `compare_and_delete`, `list_children`,
//! `watch_prefix` -- each taking a deadline, and surfacing the three
//! [`StoreError`] sentinel kinds. No caller outside this module talks
//! to etcd directly.
//!
//! Grounded on `original_source/pkg/utils/etcd.go`, which wraps
//! `go.etcd.io/etcd/client`; `etcd_client` is the pure-Rust async
//! equivalent.

pub mod error;
pub mod keys;

/// In-memory [`Store`] for tests. Kept out of `#[cfg(test)]` so that
/// integration tests under `tests/`, which compile against this crate
/// as an ordinary dependency, can reach it too.
pub mod fake;

pub use error::StoreError;

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One entry returned by [`Store::list_children`].
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: String,
    pub value: Vec<u8>,
}

/// A single change observed on a watched prefix.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// The store façade every component depends on. A trait (rather than a
/// concrete `EtcdStore`) so tests can substitute an in-memory fake
/// without standing up a real etcd cluster.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str, deadline: Duration) -> Result<Vec<u8>, StoreError>;

    async fn set(&self, key: &str, value: Vec<u8>, deadline: Duration) -> Result<(), StoreError>;

    /// Create `key` with `value` only if it does not already exist.
    /// Fails with [`StoreError::Precondition`] if it does.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        deadline: Duration,
    ) -> Result<(), StoreError>;

    async fn delete(&self, key: &str, deadline: Duration) -> Result<(), StoreError>;

    /// Delete `key` only if its current value equals `expected`.
    /// Fails with [`StoreError::Precondition`] otherwise.
    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
        deadline: Duration,
    ) -> Result<(), StoreError>;

    /// Recursively delete every key under `prefix`.
    async fn delete_prefix(&self, prefix: &str, deadline: Duration) -> Result<(), StoreError>;

    async fn list_children(
        &self,
        prefix: &str,
        deadline: Duration,
    ) -> Result<Vec<Entry>, StoreError>;

    /// Watch a prefix for changes. Returns a stream of [`WatchEvent`].
    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<
        std::pin::Pin<Box<dyn futures::Stream<Item = WatchEvent> + Send>>,
        StoreError,
    >;
}

/// Default connection-retry policy from §4.A: 5 attempts, 5s apart.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default per-call deadline when a caller doesn't specify one.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(1);

/// etcd-backed implementation of [`Store`].
pub struct EtcdStore {
    client: etcd_client::Client,
}

impl EtcdStore {
    /// Connect to `endpoints`, retrying with the default fixed-interval
    /// policy before giving up (a "Fatal startup" condition per §7 --
    /// the caller is expected to exit non-zero if this errors).
    pub async fn connect(endpoints: &[String]) -> Result<Self, StoreError> {
        Self::connect_with_retry(
            endpoints,
            DEFAULT_CONNECT_ATTEMPTS,
            DEFAULT_CONNECT_INTERVAL,
        )
        .await
    }

    pub async fn connect_with_retry(
        endpoints: &[String],
        attempts: u32,
        interval: Duration,
    ) -> Result<Self, StoreError> {
        info!(?endpoints, "connecting to etcd cluster");
        let eps = endpoints.to_vec();
        let client = crate::util::retry::with_fixed_interval_retry(
            move || {
                let eps = eps.clone();
                async move {
                    etcd_client::Client::connect(eps, None)
                        .await
                        .map_err(|e| StoreError::Transport(e.to_string()))
                }
            },
            attempts,
            interval,
        )
        .await?;
        debug!("etcd connection established");
        Ok(Self { client })
    }

    async fn with_deadline<T>(
        deadline: Duration,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| StoreError::Transport("deadline exceeded".into()))?
    }
}

#[async_trait]
impl Store for EtcdStore {
    async fn get(&self, key: &str, deadline: Duration) -> Result<Vec<u8>, StoreError> {
        let mut client = self.client.kv_client();
        let key = key.to_string();
        Self::with_deadline(deadline, async move {
            let resp = client
                .get(key.clone(), None)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            resp.kvs()
                .first()
                .map(|kv| kv.value().to_vec())
                .ok_or_else(|| StoreError::NotFound(key))
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, deadline: Duration) -> Result<(), StoreError> {
        let mut client = self.client.kv_client();
        let key = key.to_string();
        Self::with_deadline(deadline, async move {
            client
                .put(key, value, None)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        deadline: Duration,
    ) -> Result<(), StoreError> {
        use etcd_client::{Compare, CompareOp, Txn, TxnOp};
        let mut client = self.client.kv_client();
        let key = key.to_string();
        Self::with_deadline(deadline, async move {
            let txn = Txn::new()
                .when(vec![Compare::create_revision(
                    key.clone(),
                    CompareOp::Equal,
                    0,
                )])
                .and_then(vec![TxnOp::put(key.clone(), value, None)]);
            let resp = client
                .txn(txn)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            if resp.succeeded() {
                Ok(())
            } else {
                Err(StoreError::Precondition(key))
            }
        })
        .await
    }

    async fn delete(&self, key: &str, deadline: Duration) -> Result<(), StoreError> {
        let mut client = self.client.kv_client();
        let key = key.to_string();
        Self::with_deadline(deadline, async move {
            client
                .delete(key, None)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
        deadline: Duration,
    ) -> Result<(), StoreError> {
        use etcd_client::{Compare, CompareOp, Txn, TxnOp};
        let mut client = self.client.kv_client();
        let key = key.to_string();
        let expected = expected.to_vec();
        Self::with_deadline(deadline, async move {
            let txn = Txn::new()
                .when(vec![Compare::value(
                    key.clone(),
                    CompareOp::Equal,
                    expected,
                )])
                .and_then(vec![TxnOp::delete(key.clone(), None)]);
            let resp = client
                .txn(txn)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            if resp.succeeded() {
                Ok(())
            } else {
                warn!(%key, "compare-and-delete precondition failed");
                Err(StoreError::Precondition(key))
            }
        })
        .await
    }

    async fn delete_prefix(&self, prefix: &str, deadline: Duration) -> Result<(), StoreError> {
        use etcd_client::DeleteOptions;
        let mut client = self.client.kv_client();
        let prefix = prefix.to_string();
        Self::with_deadline(deadline, async move {
            client
                .delete(prefix, Some(DeleteOptions::new().with_prefix()))
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list_children(
        &self,
        prefix: &str,
        deadline: Duration,
    ) -> Result<Vec<Entry>, StoreError> {
        use etcd_client::GetOptions;
        let mut client = self.client.kv_client();
        let prefix = prefix.to_string();
        Self::with_deadline(deadline, async move {
            let resp = client
                .get(prefix, Some(GetOptions::new().with_prefix()))
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(resp
                .kvs()
                .iter()
                .map(|kv| Entry {
                    key: kv.key_str().unwrap_or_default().to_string(),
                    value: kv.value().to_vec(),
                })
                .collect())
        })
        .await
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<
        std::pin::Pin<Box<dyn futures::Stream<Item = WatchEvent> + Send>>,
        StoreError,
    > {
        use etcd_client::{EventType, WatchOptions};
        use futures::StreamExt;

        let mut client = self.client.watch_client();
        let (_watcher, stream) = client
            .watch(prefix.to_string(), Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let mapped = stream.flat_map(|resp| {
            let events = resp
                .map(|r| r.events().to_vec())
                .unwrap_or_default();
            futures::stream::iter(events.into_iter().filter_map(|ev| {
                let kv = ev.kv()?;
                let key = kv.key_str().ok()?.to_string();
                match ev.event_type() {
                    EventType::Put => Some(WatchEvent::Put {
                        key,
                        value: kv.value().to_vec(),
                    }),
                    EventType::Delete => Some(WatchEvent::Delete { key }),
                }
            }))
        });
        Ok(Box::pin(mapped))
    }
}
