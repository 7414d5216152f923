//! Policies shipped with the gateway.

use std::sync::Arc;

use crate::error::RegistryError;
use crate::policy::key_auth::KeyStore;
use crate::policy::{key_auth, log, proxy, rate_limit, PolicyRegistry};

/// Register every built-in policy, in a fixed order.
pub fn register_all(registry: &mut PolicyRegistry) -> Result<(), RegistryError> {
    registry.register_descriptor(log::descriptor()?)?;
    registry.register_descriptor(key_auth::descriptor(Arc::new(KeyStore::new()))?)?;
    registry.register_descriptor(rate_limit::descriptor()?)?;
    registry.register_descriptor(proxy::descriptor()?)?;
    Ok(())
}

/// A registry holding only the built-in policies.
pub fn registry() -> Result<PolicyRegistry, RegistryError> {
    let mut registry = PolicyRegistry::new();
    register_all(&mut registry)?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_register_once() {
        let mut registry = registry().unwrap();
        let names: Vec<&str> = registry.descriptors().map(|d| d.name()).collect();
        assert_eq!(names, vec!["log", "key-auth", "rate-limit", "proxy"]);

        let err = register_all(&mut registry).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePolicy(name) if name == "log"));
    }
}
