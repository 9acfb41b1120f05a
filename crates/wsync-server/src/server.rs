//! Shared world state behind every session

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::session::WorldSession;
use std::sync::Arc;
use tokio::sync::watch;
use wsync_envelope::EventPayload;
use wsync_lifecycle::WorldSnapshot;
use wsync_repository::{
    CommandProcessor, CommandRequest, EventTimeline, InMemoryStore, ProcessedCommand, WorldEvent,
};

/// Authoritative world: store, command processor and event timeline
///
/// Sessions hold an `Arc<WorldServer>`; the latest timeline seq is
/// broadcast over a `watch` channel so idle sessions wake up to deliver
/// events produced by other sessions.
#[derive(Debug)]
pub struct WorldServer {
    config: ServerConfig,
    processor: CommandProcessor,
    timeline: Arc<EventTimeline>,
    latest: watch::Sender<u64>,
}

impl WorldServer {
    /// Server over an existing store
    #[must_use]
    pub fn from_store(config: ServerConfig, store: Arc<InMemoryStore>) -> Arc<Self> {
        let timeline = Arc::new(EventTimeline::new(config.max_events));
        let processor = CommandProcessor::new(store).with_timeline(Arc::clone(&timeline));
        let (latest, _) = watch::channel(0);
        tracing::info!(
            replay_limit = config.replay_limit,
            max_events = timeline.max_events(),
            "world server ready"
        );
        Arc::new(Self {
            config,
            processor,
            timeline,
            latest,
        })
    }

    /// Server seeded from a snapshot; references must resolve
    pub fn seeded(config: ServerConfig, snapshot: &WorldSnapshot) -> Result<Arc<Self>, ServerError> {
        let store =
            InMemoryStore::seeded(snapshot).map_err(|e| ServerError::Seed(e.to_string()))?;
        Ok(Self::from_store(config, Arc::new(store)))
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryStore> {
        self.processor.store()
    }

    #[must_use]
    pub fn timeline(&self) -> &Arc<EventTimeline> {
        &self.timeline
    }

    /// Receiver that changes whenever the timeline grows
    #[must_use]
    pub fn watch_latest(&self) -> watch::Receiver<u64> {
        self.latest.subscribe()
    }

    /// New session bound to this server
    #[must_use]
    pub fn session(self: &Arc<Self>) -> WorldSession {
        WorldSession::new(Arc::clone(self))
    }

    /// Run a command and wake every session when it produced events
    pub async fn submit(&self, request: CommandRequest) -> ProcessedCommand {
        let processed = self.processor.process(request).await;
        if !processed.published.is_empty() {
            self.notify();
        }
        processed
    }

    /// Publish events that did not come from a command
    pub fn publish(&self, events: &[WorldEvent]) -> Vec<EventPayload> {
        let published: Vec<EventPayload> =
            events.iter().map(|event| self.timeline.append(event)).collect();
        if !published.is_empty() {
            self.notify();
        }
        published
    }

    /// Consistent snapshot plus the timeline seq it covers
    ///
    /// The seq is read under the store read lock. An event committed but not
    /// yet on the timeline may be delivered after a snapshot that already
    /// reflects it; none is skipped.
    #[must_use]
    pub fn snapshot_with_seq(&self, scene_id: Option<String>) -> (WorldSnapshot, u64) {
        self.store()
            .read(|view| (view.to_snapshot(scene_id), self.timeline.latest_seq()))
    }

    fn notify(&self) {
        self.latest.send_replace(self.timeline.latest_seq());
    }
}
