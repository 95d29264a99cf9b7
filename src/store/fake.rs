//! In-memory [`Store`] used by tests in this crate in place of a real
//! etcd cluster (grounded on the teacher's own use of `mockall`/`wiremock`
//! to substitute external services in tests).

use super::{Entry, Store, StoreError, WatchEvent};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

pub struct FakeStore {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    events: broadcast::Sender<WatchEvent>,
}

impl Default for FakeStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            data: Mutex::new(BTreeMap::new()),
            events,
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get(&self, key: &str, _deadline: Duration) -> Result<Vec<u8>, StoreError> {
        self.data
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, _deadline: Duration) -> Result<(), StoreError> {
        let _ = self
            .events
            .send(WatchEvent::Put {
                key: key.to_string(),
                value: value.clone(),
            });
        self.data.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        _deadline: Duration,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        if data.contains_key(key) {
            return Err(StoreError::Precondition(key.to_string()));
        }
        data.insert(key.to_string(), value.clone());
        drop(data);
        let _ = self.events.send(WatchEvent::Put {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    async fn delete(&self, key: &str, _deadline: Duration) -> Result<(), StoreError> {
        self.data.lock().unwrap().remove(key);
        let _ = self.events.send(WatchEvent::Delete {
            key: key.to_string(),
        });
        Ok(())
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &[u8],
        _deadline: Duration,
    ) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        match data.get(key) {
            Some(v) if v.as_slice() == expected => {
                data.remove(key);
                drop(data);
                let _ = self.events.send(WatchEvent::Delete {
                    key: key.to_string(),
                });
                Ok(())
            }
            _ => Err(StoreError::Precondition(key.to_string())),
        }
    }

    async fn delete_prefix(&self, prefix: &str, _deadline: Duration) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        let keys: Vec<String> = data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for k in keys {
            data.remove(&k);
        }
        Ok(())
    }

    async fn list_children(
        &self,
        prefix: &str,
        _deadline: Duration,
    ) -> Result<Vec<Entry>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| Entry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn watch_prefix(
        &self,
        prefix: &str,
    ) -> Result<
        std::pin::Pin<Box<dyn futures::Stream<Item = WatchEvent> + Send>>,
        StoreError,
    > {
        use futures::StreamExt;
        let prefix = prefix.to_string();
        let rx = self.events.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |ev| {
            let prefix = prefix.clone();
            async move {
                let ev = ev.ok()?;
                let key = match &ev {
                    WatchEvent::Put { key, .. } => key,
                    WatchEvent::Delete { key } => key,
                };
                key.starts_with(&prefix).then_some(ev)
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_rejects_existing() {
        let store = FakeStore::new();
        store
            .set_if_absent("/a", b"1".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        let err = store
            .set_if_absent("/a", b"2".to_vec(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn compare_and_delete_checks_value() {
        let store = FakeStore::new();
        store
            .set("/a", b"1".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        let err = store
            .compare_and_delete("/a", b"2", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_precondition());
        store
            .compare_and_delete("/a", b"1", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(store
            .get("/a", Duration::from_secs(1))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn list_children_filters_by_prefix() {
        let store = FakeStore::new();
        store
            .set("/gatekeeper/slotfs/1", b"a".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set("/domains/demo", b"b".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        let children = store
            .list_children("/gatekeeper/slotfs/", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].key, "/gatekeeper/slotfs/1");
    }
}
