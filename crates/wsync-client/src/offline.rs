//! Disconnected operation over an in-process world
//!
//! Commands run through the same processor the server uses, so results and
//! events match the networked path: one terminal result per command id,
//! then the command's events in seq order.

use crate::error::ClientError;
use crate::gateway::{CommandGateway, CommandResult};
use crate::machine::ClientEvent;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use wsync_envelope::{new_envelope_id, MessageType};
use wsync_lifecycle::WorldSnapshot;
use wsync_repository::{
    CommandOutcome, CommandProcessor, CommandRequest, EventTimeline, InMemoryStore,
    DEFAULT_RETAINED_EVENTS,
};

/// Command gateway with no server behind it
#[derive(Debug)]
pub struct OfflineSimulator {
    processor: CommandProcessor,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl OfflineSimulator {
    /// Simulator over a seeded world, plus its event stream
    pub fn seeded(
        snapshot: &WorldSnapshot,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>), ClientError> {
        let store = Arc::new(InMemoryStore::seeded(snapshot)?);
        Ok(Self::from_store(store))
    }

    /// Simulator over an existing store
    #[must_use]
    pub fn from_store(store: Arc<InMemoryStore>) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let timeline = Arc::new(EventTimeline::new(DEFAULT_RETAINED_EVENTS));
        let processor = CommandProcessor::new(store).with_timeline(timeline);
        let (events, rx) = mpsc::unbounded_channel();
        (Self { processor, events }, rx)
    }

    /// Current world state
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        self.processor.store().snapshot(None)
    }

    /// Seq of the newest simulated event
    #[must_use]
    pub fn latest_seq(&self) -> u64 {
        self.processor
            .timeline()
            .map_or(0, |timeline| timeline.latest_seq())
    }

    /// Run a command with an explicit idempotency key
    pub async fn send_keyed_command(
        &self,
        name: &str,
        data: Map<String, Value>,
        idempotency_key: impl Into<String>,
    ) -> Option<String> {
        self.run(name, data, Some(idempotency_key.into())).await
    }

    async fn run(
        &self,
        name: &str,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> Option<String> {
        let command_id = new_envelope_id(MessageType::Command);
        let mut request = CommandRequest::new(command_id.clone(), name, data);
        if let Some(key) = idempotency_key {
            request = request.with_idempotency_key(key);
        }
        let processed = self.processor.process(request).await;

        let result = match processed.outcome {
            CommandOutcome::Ack => CommandResult::ack(&command_id, Some(processed.command_name)),
            CommandOutcome::Rejected { code, message } => {
                CommandResult::error(&command_id, Some(processed.command_name), code, message)
            }
        };
        tracing::debug!(
            command_id = %command_id,
            command = name,
            ack = result.is_ack(),
            events = processed.published.len(),
            "offline command"
        );
        let _ = self.events.send(ClientEvent::CommandResult(result));
        for event in processed.published {
            let _ = self.events.send(ClientEvent::Event(event));
        }
        Some(command_id)
    }
}

#[async_trait]
impl CommandGateway for OfflineSimulator {
    async fn send_command(&self, name: &str, data: Map<String, Value>) -> Option<String> {
        self.run(name, data, None).await
    }
}
