use log::*;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

/// The network identity of a controller, usually a host name or IPv4 address, optionally followed by `:port`.
///
/// No syntax checks are made here. An address that does not resolve surfaces as a network error when an exchange is
/// attempted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerAddress(String);

impl ControllerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ControllerAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ControllerAddress {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.trim()))
    }
}

impl From<&str> for ControllerAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Holds the address of the controller that commands are sent to.
///
/// The registry is cheap to clone; all clones share the same slot. Writers (discovery, the operator) and readers (the
/// background executor, once per exchange) may live on different threads. A reader always sees a complete value,
/// either the one before or the one after a concurrent [`set`](EndpointRegistry::set).
#[derive(Clone, Debug, Default)]
pub struct EndpointRegistry {
    current: Arc<RwLock<Option<ControllerAddress>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that already points at `address`.
    pub fn with_address(address: ControllerAddress) -> Self {
        Self { current: Arc::new(RwLock::new(Some(address))) }
    }

    /// Replace the current address, returning the previous one.
    pub fn set(&self, address: ControllerAddress) -> Option<ControllerAddress> {
        info!("Controller address set to {address}");
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(address)
    }

    /// Forget the current address. Subsequent exchanges fail before touching the network.
    pub fn clear(&self) -> Option<ControllerAddress> {
        debug!("Controller address cleared");
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        slot.take()
    }

    pub fn get(&self) -> Option<ControllerAddress> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_set(&self) -> bool {
        self.current.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn unset_registry_is_distinguishable() {
        let registry = EndpointRegistry::new();
        assert!(!registry.is_set());
        assert_eq!(registry.get(), None);
        let previous = registry.set("172.16.50.2".into());
        assert!(previous.is_none());
        assert_eq!(registry.get(), Some(ControllerAddress::new("172.16.50.2")));
        assert_eq!(registry.clear(), Some(ControllerAddress::new("172.16.50.2")));
        assert!(!registry.is_set());
    }

    #[test]
    fn clones_share_the_same_slot() {
        let registry = EndpointRegistry::new();
        let reader = registry.clone();
        registry.set("10.0.0.1".into());
        assert_eq!(reader.get().unwrap().as_str(), "10.0.0.1");
        assert_eq!(registry.set("10.0.0.2".into()).unwrap().as_str(), "10.0.0.1");
        assert_eq!(reader.get().unwrap().as_str(), "10.0.0.2");
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        let registry = EndpointRegistry::with_address("10.0.0.1".into());
        let candidates = ["10.0.0.1", "controller.local", "192.168.100.200:5683"];
        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    registry.set(candidates[i % candidates.len()].into());
                }
            })
        };
        let readers = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let seen = registry.get().expect("address to stay set");
                        assert!(candidates.contains(&seen.as_str()), "unexpected value {seen}");
                    }
                })
            })
            .collect::<Vec<_>>();
        writer.join().unwrap();
        readers.into_iter().for_each(|r| r.join().unwrap());
    }

    #[test]
    fn parse_trims_whitespace() {
        let address: ControllerAddress = "  172.16.50.74 \n".parse().unwrap();
        assert_eq!(address.to_string(), "172.16.50.74");
    }
}
