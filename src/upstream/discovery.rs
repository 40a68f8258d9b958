//! Logical-service resolution for `service://` origins.

use std::collections::HashMap;

use crate::upstream::UpstreamError;

/// Resolves a logical service name to a concrete `host:port`.
pub trait ServiceDiscovery: Send + Sync {
    fn resolve(&self, service: &str) -> Result<String, UpstreamError>;
}

/// Fixed service table, usually loaded from the `[services]` config section.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    services: HashMap<String, String>,
}

impl StaticDiscovery {
    pub fn new(services: HashMap<String, String>) -> Self {
        let services = services
            .into_iter()
            .map(|(name, authority)| (name.to_ascii_lowercase(), authority))
            .collect();
        Self { services }
    }
}

impl ServiceDiscovery for StaticDiscovery {
    fn resolve(&self, service: &str) -> Result<String, UpstreamError> {
        self.services
            .get(&service.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| UpstreamError::Discovery {
                service: service.to_string(),
                reason: "service not registered".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup_is_case_insensitive() {
        let discovery = StaticDiscovery::new(HashMap::from([(
            "Orders".to_string(),
            "10.0.0.5:7000".to_string(),
        )]));
        assert_eq!(discovery.resolve("orders").unwrap(), "10.0.0.5:7000");
        assert!(matches!(
            discovery.resolve("billing"),
            Err(UpstreamError::Discovery { .. })
        ));
    }
}
