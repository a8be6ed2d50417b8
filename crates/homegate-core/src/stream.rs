// ── Device streams ──
//
// Consumer-side view of the device store. The store publishes shared
// snapshots over `watch`; consumers get owned device lists. A consumer
// slower than the writers may see intermediate snapshots coalesced, but
// always sees the latest one.

use std::sync::Arc;

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crate::model::Device;

pub(crate) type Snapshot = Arc<Vec<Arc<Device>>>;

/// A subscription to the device store.
pub struct DeviceStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl DeviceStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Devices as of creation or the last [`changed`](Self::changed).
    pub fn current(&self) -> Vec<Device> {
        owned(&self.current)
    }

    /// Wait for the next store mutation. `None` once the store is dropped.
    pub async fn changed(&mut self) -> Option<Vec<Device>> {
        self.receiver.changed().await.ok()?;
        self.current = self.receiver.borrow_and_update().clone();
        Some(owned(&self.current))
    }

    /// Every device, once now and again after each change.
    pub fn into_stream(self) -> impl Stream<Item = Vec<Device>> + Send + 'static {
        self.matching(|_| true)
    }

    /// Devices satisfying `predicate`, once now and again whenever that
    /// set changes. Store changes that leave it untouched yield nothing.
    pub fn matching<F>(self, predicate: F) -> impl Stream<Item = Vec<Device>> + Send + 'static
    where
        F: Fn(&Device) -> bool + Send + 'static,
    {
        let mut last: Option<Vec<Device>> = None;
        WatchStream::new(self.receiver).filter_map(move |snapshot| {
            let devices: Vec<Device> = snapshot
                .iter()
                .filter(|device| predicate(device))
                .map(|device| (**device).clone())
                .collect();
            if last.as_ref() == Some(&devices) {
                return None;
            }
            last = Some(devices.clone());
            Some(devices)
        })
    }
}

fn owned(snapshot: &Snapshot) -> Vec<Device> {
    snapshot.iter().map(|device| (**device).clone()).collect()
}
