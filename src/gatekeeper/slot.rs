//! Slot lookups and lifecycle transitions against the store (§4.D state
//! machine: `PENDING(established=false)` -> `ACTIVE(established=true)`
//! -> removed via compare-and-delete).

use std::time::Duration;

use crate::api::types::AgentSlot;
use crate::store::{keys, Store};

use super::error::GatekeeperError;

const STORE_DEADLINE: Duration = Duration::from_secs(1);

/// Fetch the slot at `port`, along with its raw serialized bytes (the
/// CAS precondition needed later to release it).
pub async fn get(store: &dyn Store, port: u16) -> Result<(AgentSlot, Vec<u8>), GatekeeperError> {
    let bytes = store.get(&keys::slot_key(port), STORE_DEADLINE).await?;
    let slot: AgentSlot = serde_json::from_slice(&bytes)
        .map_err(|e| GatekeeperError::Internal(format!("corrupt slot record: {e}")))?;
    Ok((slot, bytes))
}

/// Transition a slot to `established=true` with a plain `set` (the
/// write itself needs no CAS: only one gatekeeper ever owns a given
/// port's forward, guaranteed by the single-gatekeeper invariant and
/// by `withNewSlotFS`'s `set_if_absent` at creation time).
pub async fn mark_established(
    store: &dyn Store,
    mut slot: AgentSlot,
) -> Result<(AgentSlot, Vec<u8>), GatekeeperError> {
    slot.established = true;
    let bytes = serde_json::to_vec(&slot)
        .map_err(|e| GatekeeperError::Internal(format!("serialize slot: {e}")))?;
    store
        .set(&keys::slot_key(slot.port), bytes.clone(), STORE_DEADLINE)
        .await?;
    Ok((slot, bytes))
}

/// Release a slot with a compare-and-delete keyed on its last known
/// serialized value. Failure is logged by the caller and treated as
/// non-fatal (§4.D item 4).
pub async fn release(store: &dyn Store, port: u16, previous: &[u8]) -> Result<(), GatekeeperError> {
    store
        .compare_and_delete(&keys::slot_key(port), previous, STORE_DEADLINE)
        .await?;
    Ok(())
}

/// Linear scan of `/gatekeeper/slotfs/` for the slot whose `domain`
/// equals `sub` (§4.D item 5: "find the AgentSlot whose domain equals
/// the subdomain by linear scan of slotfs").
pub async fn find_by_domain(
    store: &dyn Store,
    sub: &str,
) -> Result<Option<AgentSlot>, GatekeeperError> {
    let entries = store
        .list_children(keys::SLOTFS_PREFIX, STORE_DEADLINE)
        .await?;
    for entry in entries {
        if let Ok(slot) = serde_json::from_slice::<AgentSlot>(&entry.value) {
            if slot.domain == sub {
                return Ok(Some(slot));
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn mark_established_round_trips() {
        let store = FakeStore::new();
        let slot = AgentSlot {
            domain: "demo".into(),
            port: 31240,
            agent_id: Uuid::new_v4(),
            established: false,
        };
        store
            .set(
                &keys::slot_key(slot.port),
                serde_json::to_vec(&slot).unwrap(),
                STORE_DEADLINE,
            )
            .await
            .unwrap();

        let (fetched, bytes) = get(&store, 31240).await.unwrap();
        assert!(!fetched.established);

        let (updated, new_bytes) = mark_established(&store, fetched).await.unwrap();
        assert!(updated.established);
        assert_ne!(bytes, new_bytes);

        release(&store, 31240, &new_bytes).await.unwrap();
        assert!(get(&store, 31240).await.is_err());
    }

    #[tokio::test]
    async fn find_by_domain_scans_linearly() {
        let store = FakeStore::new();
        let slot = AgentSlot {
            domain: "demo".into(),
            port: 31241,
            agent_id: Uuid::new_v4(),
            established: true,
        };
        store
            .set(
                &keys::slot_key(slot.port),
                serde_json::to_vec(&slot).unwrap(),
                STORE_DEADLINE,
            )
            .await
            .unwrap();

        let found = find_by_domain(&store, "demo").await.unwrap();
        assert_eq!(found.unwrap().port, 31241);
        assert!(find_by_domain(&store, "nope").await.unwrap().is_none());
    }
}
