use crate::capability::Capabilities;
use crate::event::ResponseEvent;
use crate::runtime::{Spawner, TokioSpawner};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default high-water mark for buffered response bytes
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;
/// Default capacity of the lifecycle event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Bridge configuration. Shared by all responses created from the same context.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Buffered byte count at which a push reports backpressure
    pub high_water_mark: usize,
    /// Capacity of the broadcast channel carrying [`ResponseEvent`]s
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Everything a response needs from its surroundings.
#[derive(Clone)]
pub struct ResponseContext {
    /// Host capabilities, probed once at startup
    pub capabilities: Capabilities,
    pub config: Arc<BridgeConfig>,
    /// Runs deferred notifications and the streaming bridge
    pub spawner: Arc<dyn Spawner>,
    /// Lifecycle event bus. Subscribe before creating responses to see their metadata events.
    pub event_tx: broadcast::Sender<ResponseEvent>,
}

impl ResponseContext {
    /// Creates a context on the tokio runtime with a fresh event channel.
    pub fn new(capabilities: Capabilities, config: Option<BridgeConfig>) -> Self {
        let config = config.unwrap_or_default();
        let (event_tx, _first_rx) = broadcast::channel::<ResponseEvent>(config.event_capacity);

        Self {
            capabilities,
            config: Arc::new(config),
            spawner: Arc::new(TokioSpawner),
            event_tx,
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ResponseEvent> {
        self.event_tx.subscribe()
    }
}

impl std::fmt::Debug for ResponseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseContext")
            .field("capabilities", &self.capabilities)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.high_water_mark, 16384);
        assert_eq!(cfg.event_capacity, 64);
    }

    #[test]
    fn context_uses_supplied_config() {
        let ctx = ResponseContext::new(
            Capabilities::default(),
            Some(BridgeConfig {
                high_water_mark: 4,
                event_capacity: 8,
            }),
        );
        assert_eq!(ctx.config.high_water_mark, 4);
        assert!(format!("{ctx:?}").contains("ResponseContext"));
    }
}
