use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Viewer lifecycle events, delivered from HTTP handler tasks to the
/// coordinator as discrete messages and consumed at the top of each tick.
/// This keeps the viewer count owned by the coordinator's thread of
/// control instead of a shared mutable flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    Attached(Uuid),
    Detached(Uuid),
}

/// Create a connected tracker/registry pair. The tracker side lives in the
/// HTTP server state; the registry side is owned by the coordinator.
pub fn channel() -> (ViewerTracker, ViewerRegistry) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ViewerTracker { tx }, ViewerRegistry { rx, count: 0 })
}

/// Handle used by stream handlers to announce viewer connections.
#[derive(Clone)]
pub struct ViewerTracker {
    tx: mpsc::UnboundedSender<ViewerEvent>,
}

impl ViewerTracker {
    /// Register a new viewer. The returned guard announces the detach when
    /// it drops, which happens when the client's stream ends.
    pub fn attach(&self) -> ViewerGuard {
        let id = Uuid::new_v4();
        info!("Viewer {} attached", id);
        let _ = self.tx.send(ViewerEvent::Attached(id));
        ViewerGuard {
            id,
            tx: self.tx.clone(),
        }
    }
}

/// RAII guard for one attached viewer.
pub struct ViewerGuard {
    id: Uuid,
    tx: mpsc::UnboundedSender<ViewerEvent>,
}

impl ViewerGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        info!("Viewer {} detached", self.id);
        let _ = self.tx.send(ViewerEvent::Detached(self.id));
    }
}

/// Coordinator-side viewer accounting.
pub struct ViewerRegistry {
    rx: mpsc::UnboundedReceiver<ViewerEvent>,
    count: usize,
}

impl ViewerRegistry {
    /// Apply all queued attach/detach events and return the current
    /// viewer count.
    pub fn drain(&mut self) -> usize {
        while let Ok(event) = self.rx.try_recv() {
            match event {
                ViewerEvent::Attached(id) => {
                    self.count += 1;
                    debug!("viewer {} counted, {} attached", id, self.count);
                }
                ViewerEvent::Detached(id) => {
                    self.count = self.count.saturating_sub(1);
                    debug!("viewer {} released, {} attached", id, self.count);
                }
            }
        }
        self.count
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_and_detach_are_counted() {
        let (tracker, mut registry) = channel();
        assert_eq!(registry.drain(), 0);

        let first = tracker.attach();
        let second = tracker.attach();
        assert_eq!(registry.drain(), 2);

        drop(first);
        assert_eq!(registry.drain(), 1);

        drop(second);
        assert_eq!(registry.drain(), 0);
    }

    #[test]
    fn test_events_queue_between_drains() {
        let (tracker, mut registry) = channel();

        // Attach and detach before the coordinator ever looks
        let guard = tracker.attach();
        drop(guard);

        assert_eq!(registry.drain(), 0);
    }

    #[test]
    fn test_count_survives_tracker_clone() {
        let (tracker, mut registry) = channel();
        let other = tracker.clone();

        let _a = tracker.attach();
        let _b = other.attach();
        assert_eq!(registry.drain(), 2);
    }
}
