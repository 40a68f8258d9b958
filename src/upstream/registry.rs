//! Per-gateway registry of upstream clients.
//!
//! # Responsibilities
//! - Create each origin's client exactly once, on first use
//! - Group clients by TLS bucket so a certificate reload can find them
//!
//! # Design Decisions
//! - Owned by a gateway instance; nothing is process-global
//! - Keyed by origin identifier and canonical URI, so a reload that keeps
//!   an origin unchanged keeps its pooled connections

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::routing::Origin;
use crate::upstream::client::{ClientFactory, UpstreamClient};
use crate::upstream::UpstreamError;

/// Bucket used for origins without a configured TLS bucket.
pub const DEFAULT_TLS_BUCKET: &str = "default";

pub struct ClientRegistry {
    factory: Arc<dyn ClientFactory>,
    /// Origin identifier → TLS bucket name.
    tls_buckets: HashMap<String, String>,
    clients: DashMap<String, Arc<dyn UpstreamClient>>,
    buckets: DashMap<String, Vec<Arc<dyn UpstreamClient>>>,
}

impl ClientRegistry {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_tls_buckets(factory, HashMap::new())
    }

    pub fn with_tls_buckets(
        factory: Arc<dyn ClientFactory>,
        tls_buckets: HashMap<String, String>,
    ) -> Self {
        Self {
            factory,
            tls_buckets,
            clients: DashMap::new(),
            buckets: DashMap::new(),
        }
    }

    /// TLS bucket an origin's client is filed under.
    pub fn bucket_of(&self, origin: &Origin) -> &str {
        self.tls_buckets
            .get(origin.identifier())
            .map(String::as_str)
            .unwrap_or(DEFAULT_TLS_BUCKET)
    }

    /// The client bound to `origin`, creating and binding it on first use.
    pub fn client_for(&self, origin: &Origin) -> Result<Arc<dyn UpstreamClient>, UpstreamError> {
        if let Some(client) = origin.client() {
            return Ok(client.clone());
        }

        let key = format!("{}|{}", origin.identifier(), origin.uri());
        let client = {
            let entry = self.clients.entry(key).or_try_insert_with(|| {
                let client = self.factory.create(origin)?;
                self.buckets
                    .entry(self.bucket_of(origin).to_string())
                    .or_default()
                    .push(client.clone());
                Ok::<_, UpstreamError>(client)
            })?;
            entry.value().clone()
        };

        origin
            .bind_client(client.clone())
            .map_err(|e| UpstreamError::Client(e.to_string()))?;
        Ok(client)
    }

    /// Every client created so far for origins in TLS bucket `name`.
    pub fn clients_for_bucket(&self, name: &str) -> Vec<Arc<dyn UpstreamClient>> {
        self.buckets
            .get(name)
            .map(|clients| clients.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
