//! The typed middleware chain (§4.C, §9 "Handler chains vs.
//! inheritance"). Each middleware is a method that takes `self` by
//! value and returns `ApiResult<Self>`, progressively populating the
//! fields the original design carried as a stringly-keyed context map.
//! Handlers compose these with `?`; no dynamic dispatch is involved.

use std::time::Duration;
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::types::{AgentSlot, GatekeeperMeta};
use crate::identity::AgentCredentials;
use crate::store::{keys, Store, StoreError};
use crate::util;

const STORE_DEADLINE: Duration = Duration::from_secs(1);

/// At most this many gap-scan retries before giving up with a 500 —
/// a concurrent writer stealing the same gap repeatedly would
/// otherwise retry forever.
const SLOT_ALLOC_RETRIES: u32 = 8;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub sub: String,
    pub credentials: Option<AgentCredentials>,
    pub gatekeeper: Option<GatekeeperMeta>,
    pub slot: Option<u16>,
}

impl RequestContext {
    /// `validateDomain`: the route parameter must be a bare subdomain
    /// leaf, `^[A-Za-z0-9]+$`.
    pub fn validate_domain(sub: &str) -> ApiResult<Self> {
        if !util::is_valid_subdomain(sub) {
            return Err(ApiError::InputInvalid(format!("invalid subdomain: {sub}")));
        }
        Ok(Self {
            sub: sub.to_string(),
            credentials: None,
            gatekeeper: None,
            slot: None,
        })
    }

    /// `validateDomainIsAvailable`: absence check of `/domains/{sub}`.
    pub async fn validate_domain_is_available(self, store: &dyn Store) -> ApiResult<Self> {
        match store.get(&keys::domain_key(&self.sub), STORE_DEADLINE).await {
            Ok(_) => Err(ApiError::NotAuthorized("domain already registered.".into())),
            Err(StoreError::NotFound(_)) => Ok(self),
            Err(e) => Err(e.into()),
        }
    }

    /// `withNewAgentCredentials`: mint a fresh identity and register
    /// its presence marker at `/agents/{uuid}`.
    pub async fn with_new_agent_credentials(mut self, store: &dyn Store) -> ApiResult<Self> {
        let (credentials, _key) = AgentCredentials::generate(&self.sub)?;
        store
            .set(
                &keys::agent_key(&credentials.id.to_string()),
                b"{}".to_vec(),
                STORE_DEADLINE,
            )
            .await?;
        self.credentials = Some(credentials);
        Ok(self)
    }

    /// `withDomainLease`: CAS-write `/domains/{sub}` with the private
    /// half stripped.
    pub async fn with_domain_lease(self, store: &dyn Store) -> ApiResult<Self> {
        let credentials = self
            .credentials
            .clone()
            .ok_or_else(|| ApiError::Internal("no credentials in context".into()))?;
        let record = credentials.into_domain_record();
        let body = record.to_json()?;
        store
            .set_if_absent(&keys::domain_key(&self.sub), body, STORE_DEADLINE)
            .await
            .map_err(|e| match e {
                StoreError::Precondition(_) => {
                    ApiError::NotAuthorized("domain already registered.".into())
                }
                other => other.into(),
            })?;
        Ok(self)
    }

    /// `validateAuthenticationRequest`: the query-string `identity`
    /// must equal the UUID stored at `/domains/{sub}`.
    pub async fn validate_authentication_request(
        mut self,
        store: &dyn Store,
        identity: Uuid,
    ) -> ApiResult<Self> {
        let bytes = store
            .get(&keys::domain_key(&self.sub), STORE_DEADLINE)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => {
                    ApiError::NotAuthorized("unknown domain or identity.".into())
                }
                other => other.into(),
            })?;
        let record = crate::identity::DomainRecord::from_json(&bytes)?;
        if record.id() != identity {
            return Err(ApiError::NotAuthorized("unknown domain or identity.".into()));
        }
        self.credentials = Some(record.credentials().clone());
        Ok(self)
    }

    /// `withGatekeeperMeta`: read and parse `/meta/gatekeeper`.
    pub async fn with_gatekeeper_meta(mut self, store: &dyn Store) -> ApiResult<Self> {
        let bytes = store.get(keys::GATEKEEPER_META_KEY, STORE_DEADLINE).await?;
        let meta: GatekeeperMeta =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::Internal(e.to_string()))?;
        self.gatekeeper = Some(meta);
        Ok(self)
    }

    /// `withNewSlotFS`: the hard allocator. Scans `/gatekeeper/slotfs/`
    /// numerically from `lowPort` for the first gap and reserves it
    /// with `set_if_absent`, retrying the scan on conflict rather than
    /// the unconditional `set` the original source used (§9 Open
    /// Question 1).
    pub async fn with_new_slot_fs(mut self, store: &dyn Store) -> ApiResult<Self> {
        let gk = self
            .gatekeeper
            .clone()
            .ok_or_else(|| ApiError::Internal("no gatekeeper meta in context".into()))?;
        let credentials = self
            .credentials
            .clone()
            .ok_or_else(|| ApiError::Internal("no credentials in context".into()))?;

        for _ in 0..SLOT_ALLOC_RETRIES {
            let entries = store
                .list_children(keys::SLOTFS_PREFIX, STORE_DEADLINE)
                .await?;
            let mut used: Vec<u16> = entries
                .iter()
                .filter_map(|e| keys::port_from_slot_key(&e.key))
                .collect();
            used.sort_unstable();

            let port = first_gap(gk.low_port, gk.high_port, &used)
                .ok_or_else(|| ApiError::Exhausted("all slots in use".into()))?;

            let slot = AgentSlot {
                domain: self.sub.clone(),
                port,
                agent_id: credentials.id,
                established: false,
            };
            let body = serde_json::to_vec(&slot)?;
            match store
                .set_if_absent(&keys::slot_key(port), body, STORE_DEADLINE)
                .await
            {
                Ok(()) => {
                    self.slot = Some(port);
                    return Ok(self);
                }
                Err(StoreError::Precondition(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ApiError::Exhausted("all slots in use".into()))
    }
}

/// Smallest port in `[low, high]` not present in the sorted `used` list.
fn first_gap(low: u16, high: u16, used: &[u16]) -> Option<u16> {
    let mut candidate = low;
    for &port in used {
        if port < candidate {
            continue;
        }
        if port > candidate {
            break;
        }
        if candidate == high {
            return None;
        }
        candidate += 1;
    }
    (candidate <= high).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fake::FakeStore;

    #[test]
    fn first_gap_finds_smallest_unused() {
        assert_eq!(first_gap(100, 110, &[]), Some(100));
        assert_eq!(first_gap(100, 110, &[100, 101, 103]), Some(102));
        assert_eq!(first_gap(100, 100, &[100]), None);
    }

    #[test]
    fn validate_domain_rejects_dots() {
        assert!(RequestContext::validate_domain("sub.domain").is_err());
        assert!(RequestContext::validate_domain("sub").is_ok());
    }

    #[tokio::test]
    async fn domain_lease_rejects_concurrent_duplicate() {
        let store = FakeStore::new();
        let ctx = RequestContext::validate_domain("demo")
            .unwrap()
            .with_new_agent_credentials(&store)
            .await
            .unwrap();
        ctx.clone().with_domain_lease(&store).await.unwrap();
        let err = ctx.with_domain_lease(&store).await.unwrap_err();
        assert!(matches!(err, ApiError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn slot_allocator_reuses_gap() {
        let store = FakeStore::new();
        let gk = GatekeeperMeta {
            ssh_addr: "0.0.0.0".into(),
            ssh_port: 2223,
            low_port: 31240,
            high_port: 31242,
        };
        store
            .set(
                keys::GATEKEEPER_META_KEY,
                serde_json::to_vec(&gk).unwrap(),
                STORE_DEADLINE,
            )
            .await
            .unwrap();
        store
            .set(
                &keys::slot_key(31240),
                serde_json::to_vec(&AgentSlot {
                    domain: "a".into(),
                    port: 31240,
                    agent_id: Uuid::new_v4(),
                    established: false,
                })
                .unwrap(),
                STORE_DEADLINE,
            )
            .await
            .unwrap();
        store
            .set(
                &keys::slot_key(31242),
                serde_json::to_vec(&AgentSlot {
                    domain: "b".into(),
                    port: 31242,
                    agent_id: Uuid::new_v4(),
                    established: false,
                })
                .unwrap(),
                STORE_DEADLINE,
            )
            .await
            .unwrap();

        let ctx = RequestContext::validate_domain("demo2")
            .unwrap()
            .with_new_agent_credentials(&store)
            .await
            .unwrap()
            .with_gatekeeper_meta(&store)
            .await
            .unwrap()
            .with_new_slot_fs(&store)
            .await
            .unwrap();
        assert_eq!(ctx.slot, Some(31241));
    }
}
