// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers for deterministic and observable tests.

use std::collections::HashSet;
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::traits::NotificationTransport;

/// Reproducible random source for derangement tests.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Enable log output in tests, filtered through `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Error returned for recipients registered via [`TestNotifier::fail_for`].
#[derive(Debug, Error)]
#[error("delivery to {0} rejected")]
pub struct DeliveryRejected(pub String);

/// One recorded notification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SentNotification {
    pub address: String,
    pub subject: String,
    pub body: String,
}

/// Recording notification transport with per-address failure injection.
///
/// Cloned handles share the same state.
#[derive(Clone, Debug, Default)]
pub struct TestNotifier {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl TestNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to this address fail.
    pub async fn fail_for(&self, address: &str) {
        self.failing.lock().await.insert(address.to_string());
    }

    /// All successfully delivered notifications, in delivery order.
    pub async fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().await.clone()
    }
}

impl NotificationTransport for TestNotifier {
    type Error = DeliveryRejected;

    async fn send(&self, address: &str, subject: &str, body: &str) -> Result<(), Self::Error> {
        if self.failing.lock().await.contains(address) {
            return Err(DeliveryRejected(address.to_string()));
        }
        self.sent.lock().await.push(SentNotification {
            address: address.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
