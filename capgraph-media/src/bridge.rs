//! Sample callback bridge
//!
//! Sits between a sink node and whoever consumes its samples. The sink calls
//! [`SampleCallback::on_sample`] on a platform-owned thread; the bridge forwards
//! to the registered listener, or counts the sample as dropped when nobody is
//! listening. The bridge never touches the pipeline, so it survives pipeline
//! rebuilds unchanged.

use capgraph_core::platform::{RawSample, SampleCallback};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Listener invoked for every delivered sample
pub type SampleListener = dyn Fn(&RawSample<'_>) + Send + Sync;

/// Delivery counters of a bridge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Samples handed to the listener
    pub delivered: u64,
    /// Samples that arrived with no listener attached
    pub dropped: u64,
    /// Total payload bytes handed to the listener
    pub total_bytes: u64,
}

/// Forwards raw samples from a sink node to a registered listener
pub struct SampleBridge {
    name: &'static str,
    listener: RwLock<Option<Arc<SampleListener>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    total_bytes: AtomicU64,
}

impl SampleBridge {
    /// Create a bridge with no listener
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            listener: RwLock::new(None),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        })
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register the listener, replacing any previous one
    pub fn set_listener<F>(&self, listener: F)
    where
        F: Fn(&RawSample<'_>) + Send + Sync + 'static,
    {
        *self.listener.write() = Some(Arc::new(listener));
    }

    /// Detach the listener
    pub fn clear_listener(&self) {
        *self.listener.write() = None;
    }

    /// Whether a listener is registered
    pub fn has_listener(&self) -> bool {
        self.listener.read().is_some()
    }

    /// Delivery counters
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
        }
    }
}

impl SampleCallback for SampleBridge {
    fn on_sample(&self, sample: &RawSample<'_>) {
        // The listener runs outside the lock.
        let listener = self.listener.read().clone();
        match listener {
            Some(listener) => {
                listener(sample);
                self.delivered.fetch_add(1, Ordering::Relaxed);
                self.total_bytes
                    .fetch_add(sample.buffer.len() as u64, Ordering::Relaxed);
            }
            None => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("{} bridge dropped a sample with no listener", self.name);
            }
        }
    }
}

impl std::fmt::Debug for SampleBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBridge")
            .field("name", &self.name)
            .field("has_listener", &self.has_listener())
            .field("stats", &self.stats())
            .finish()
    }
}
