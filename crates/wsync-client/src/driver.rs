//! Tokio driver for [`ConnectionMachine`]
//!
//! One task owns the machine and the live transport. Callers talk to it
//! through [`ClientHandle`]; everything the machine emits is forwarded on an
//! unbounded event channel.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::gateway::CommandGateway;
use crate::machine::{Action, ClientEvent, ConnectionMachine, ConnectionStatus};
use crate::transport::{Connector, Transport};
use crate::world_view::ResumeCursor;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wsync_envelope::encode;
use wsync_lifecycle::WorldSnapshot;

const REQUEST_BUFFER: usize = 64;

/// Point-in-time view of the client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientState {
    /// Connection status
    pub status: ConnectionStatus,
    /// Reconnects since the last successful connect
    pub reconnect_attempt: u32,
    /// Resume position
    pub cursor: ResumeCursor,
    /// Kept from a lost connection
    pub stale: bool,
    /// Durable snapshot, if one arrived
    pub snapshot: Option<WorldSnapshot>,
    /// Commands waiting for a response
    pub pending_commands: usize,
    /// Optimistic changes not yet confirmed
    pub pending_operations: usize,
}

enum Request {
    Start,
    Stop(oneshot::Sender<()>),
    SendCommand {
        name: String,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
        reply: oneshot::Sender<Option<String>>,
    },
    State(oneshot::Sender<ClientState>),
    EffectiveAssignee {
        task_id: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// Handle to a running client task
#[derive(Debug, Clone)]
pub struct ClientHandle {
    requests: mpsc::Sender<Request>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("Start"),
            Self::Stop(_) => f.write_str("Stop"),
            Self::SendCommand { name, .. } => write!(f, "SendCommand({name})"),
            Self::State(_) => f.write_str("State"),
            Self::EffectiveAssignee { task_id, .. } => write!(f, "EffectiveAssignee({task_id})"),
        }
    }
}

impl ClientHandle {
    /// Begin connecting
    pub async fn start(&self) -> Result<(), ClientError> {
        self.requests
            .send(Request::Start)
            .await
            .map_err(|_| ClientError::Stopped)
    }

    /// Stop reconnecting and close the transport; waits for the driver
    pub async fn stop(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Stop(tx))
            .await
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Send a command with an idempotency key
    pub async fn send_keyed_command(
        &self,
        name: &str,
        data: Map<String, Value>,
        idempotency_key: impl Into<String>,
    ) -> Option<String> {
        self.request_command(name, data, Some(idempotency_key.into()))
            .await
    }

    /// Current state, read from the client task
    pub async fn state(&self) -> Result<ClientState, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::State(tx))
            .await
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Assignee with pending optimistic changes applied
    pub async fn effective_assignee(&self, task_id: &str) -> Result<Option<String>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::EffectiveAssignee {
                task_id: task_id.to_string(),
                reply: tx,
            })
            .await
            .map_err(|_| ClientError::Stopped)?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    async fn request_command(
        &self,
        name: &str,
        data: Map<String, Value>,
        idempotency_key: Option<String>,
    ) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        let request = Request::SendCommand {
            name: name.to_string(),
            data,
            idempotency_key,
            reply: tx,
        };
        self.requests.send(request).await.ok()?;
        rx.await.ok().flatten()
    }
}

#[async_trait]
impl CommandGateway for ClientHandle {
    async fn send_command(&self, name: &str, data: Map<String, Value>) -> Option<String> {
        self.request_command(name, data, None).await
    }
}

/// Spawn the client task; it stays idle until [`ClientHandle::start`]
pub fn spawn_client(
    config: ClientConfig,
    connector: Arc<dyn Connector>,
) -> (
    ClientHandle,
    mpsc::UnboundedReceiver<ClientEvent>,
    JoinHandle<()>,
) {
    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_BUFFER);
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let driver = Driver {
        machine: ConnectionMachine::new(config),
        connector,
        transport: None,
        timer: None,
        timer_tx,
        events: events_tx,
    };
    let task = tokio::spawn(driver.run(requests_rx, timer_rx));
    (
        ClientHandle {
            requests: requests_tx,
        },
        events_rx,
        task,
    )
}

struct Driver {
    machine: ConnectionMachine,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    timer: Option<JoinHandle<()>>,
    timer_tx: mpsc::UnboundedSender<u64>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Driver {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut timers: mpsc::UnboundedReceiver<u64>,
    ) {
        loop {
            let deadline = self.machine.next_heartbeat_deadline();
            tokio::select! {
                request = requests.recv() => {
                    let Some(request) = request else {
                        let actions = self.machine.stop();
                        self.execute(actions).await;
                        break;
                    };
                    self.on_request(request).await;
                }
                frame = next_frame(&mut self.transport) => match frame {
                    Some(Ok(text)) => {
                        let actions = self.machine.on_frame(&text, Instant::now());
                        self.execute(actions).await;
                    }
                    Some(Err(err)) => {
                        let actions = self.machine.on_transport_error(err.to_string());
                        self.execute(actions).await;
                    }
                    None => {
                        self.transport = None;
                        let actions = self.machine.on_transport_closed();
                        self.execute(actions).await;
                    }
                },
                Some(generation) = timers.recv() => {
                    let actions = self.machine.on_reconnect_timer(generation);
                    self.execute(actions).await;
                }
                () = heartbeat_due(deadline) => {
                    let actions = self.machine.on_heartbeat(Instant::now());
                    self.execute(actions).await;
                }
            }
        }
        self.cancel_timer();
        tracing::debug!("client driver exited");
    }

    async fn on_request(&mut self, request: Request) {
        match request {
            Request::Start => {
                let actions = self.machine.start();
                self.execute(actions).await;
            }
            Request::Stop(done) => {
                let actions = self.machine.stop();
                self.execute(actions).await;
                let _ = done.send(());
            }
            Request::SendCommand {
                name,
                data,
                idempotency_key,
                reply,
            } => {
                let (command_id, actions) = self.machine.send_command(&name, data, idempotency_key);
                self.execute(actions).await;
                let _ = reply.send(command_id);
            }
            Request::State(reply) => {
                let _ = reply.send(self.state());
            }
            Request::EffectiveAssignee { task_id, reply } => {
                let _ = reply.send(self.machine.effective_assignee(&task_id));
            }
        }
    }

    fn state(&self) -> ClientState {
        ClientState {
            status: self.machine.status(),
            reconnect_attempt: self.machine.reconnect_attempt(),
            cursor: self.machine.cursor().clone(),
            stale: self.machine.world().is_stale(),
            snapshot: self.machine.world().snapshot().cloned(),
            pending_commands: self.machine.correlator().pending_count(),
            pending_operations: self.machine.pending().len(),
        }
    }

    /// Run actions in order, feeding transport outcomes back into the machine
    async fn execute(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                Action::OpenTransport => match self.connector.connect(&self.machine.config().url).await {
                    Ok(transport) => {
                        self.transport = Some(transport);
                        queue.extend(self.machine.on_transport_open());
                    }
                    Err(err) => {
                        queue.extend(self.machine.on_transport_error(err.to_string()));
                        queue.extend(self.machine.on_transport_closed());
                    }
                },
                Action::CloseTransport => {
                    if let Some(mut transport) = self.transport.take() {
                        transport.close().await;
                    }
                }
                Action::Send(envelope) => {
                    let frame = match encode(&envelope) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::error!(envelope_id = %envelope.id, error = %err, "dropping unencodable envelope");
                            continue;
                        }
                    };
                    let Some(transport) = self.transport.as_mut() else {
                        tracing::debug!(envelope_id = %envelope.id, "no transport, frame dropped");
                        continue;
                    };
                    if let Err(err) = transport.send(frame).await {
                        self.transport = None;
                        queue.extend(self.machine.on_transport_error(err.to_string()));
                        queue.extend(self.machine.on_transport_closed());
                    }
                }
                Action::ScheduleReconnect { generation, delay } => {
                    self.cancel_timer();
                    let timer_tx = self.timer_tx.clone();
                    self.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = timer_tx.send(generation);
                    }));
                }
                Action::CancelReconnect => self.cancel_timer(),
                Action::Emit(event) => {
                    let _ = self.events.send(event);
                }
            }
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

async fn next_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String, ClientError>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn heartbeat_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
