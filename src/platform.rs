// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Platform capability seams
//!
//! Credential storage and connectivity are owned by the host application
//! (keychain, OS network status); the engine reaches them through these
//! traits. The in-process implementations back tests and prototypes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Read access to the stored API credential
///
/// The engine re-reads the credential on every send, so a key changed
/// mid-conversation is observed by the next send.
pub trait CredentialStore: Send + Sync {
    /// The stored credential, if any
    fn credential(&self) -> Option<String>;
}

/// Network reachability probe
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    /// Whether the network is currently reachable
    async fn is_online(&self) -> bool;
}

/// Credential store holding a value in process memory
#[derive(Default)]
pub struct StaticCredentials {
    credential: Mutex<Option<String>>,
}

impl StaticCredentials {
    /// Create a store with a credential
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: Mutex::new(Some(credential.into())),
        }
    }

    /// Create an empty store
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the stored credential
    pub fn set(&self, credential: Option<String>) {
        *self.credential.lock().unwrap() = credential;
    }
}

impl CredentialStore for StaticCredentials {
    fn credential(&self) -> Option<String> {
        self.credential.lock().unwrap().clone()
    }
}

/// Probe that can be toggled at runtime
///
/// Defaults to online; tests flip it to exercise the offline path.
pub struct SwitchableConnectivity {
    online: AtomicBool,
}

impl Default for SwitchableConnectivity {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }
}

impl SwitchableConnectivity {
    /// Create a probe in the online state
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the reported state
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for SwitchableConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials() {
        let store = StaticCredentials::new("sk-test-0123456789abcdef");
        assert_eq!(
            store.credential().as_deref(),
            Some("sk-test-0123456789abcdef")
        );

        store.set(None);
        assert!(store.credential().is_none());

        store.set(Some("sk-next-0123456789abcdef".to_string()));
        assert_eq!(
            store.credential().as_deref(),
            Some("sk-next-0123456789abcdef")
        );
    }

    #[test]
    fn test_empty_credentials() {
        let store = StaticCredentials::empty();
        assert!(store.credential().is_none());
    }

    #[test]
    fn test_switchable_connectivity() {
        let probe = SwitchableConnectivity::new();
        assert!(tokio_test::block_on(probe.is_online()));

        probe.set_online(false);
        assert!(!tokio_test::block_on(probe.is_online()));
    }
}
