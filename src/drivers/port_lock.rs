// src/drivers/port_lock.rs
use std::collections::HashSet;
use std::sync::Mutex;

use log::debug;
use once_cell::sync::Lazy;

use crate::drivers::LinkError;

static HELD_PORTS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Process-wide exclusive claim on a port name. Released on drop.
///
/// Acquisition never blocks: a second claim on a held port fails with
/// [`LinkError::PortBusy`] immediately.
#[derive(Debug)]
pub struct PortLease {
    port: String,
}

impl PortLease {
    pub fn acquire(port: &str) -> Result<Self, LinkError> {
        let mut held = HELD_PORTS
            .lock()
            .map_err(|_| LinkError::io(port, "port registry poisoned"))?;
        if !held.insert(port.to_string()) {
            return Err(LinkError::PortBusy {
                port: port.to_string(),
            });
        }
        debug!("lease acquired on {port}");
        Ok(Self {
            port: port.to_string(),
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn is_held(port: &str) -> bool {
        HELD_PORTS
            .lock()
            .map(|held| held.contains(port))
            .unwrap_or(false)
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        if let Ok(mut held) = HELD_PORTS.lock() {
            held.remove(&self.port);
        }
        debug!("lease released on {}", self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_fails_fast_until_release() {
        let first = PortLease::acquire("LEASE-TEST-A").unwrap();
        assert!(PortLease::is_held("LEASE-TEST-A"));
        assert_eq!(
            PortLease::acquire("LEASE-TEST-A").unwrap_err(),
            LinkError::PortBusy {
                port: "LEASE-TEST-A".into()
            }
        );
        drop(first);
        assert!(!PortLease::is_held("LEASE-TEST-A"));
        assert!(PortLease::acquire("LEASE-TEST-A").is_ok());
    }

    #[test]
    fn different_ports_are_independent() {
        let _a = PortLease::acquire("LEASE-TEST-B").unwrap();
        let _b = PortLease::acquire("LEASE-TEST-C").unwrap();
    }
}
