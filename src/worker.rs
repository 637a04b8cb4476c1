//! Decode worker: an isolated task that owns one decoder session
//!
//! The caller talks to the worker only through a [`WorkerHandle`]. Every call is a
//! command on a bounded channel answered through its own reply channel, so replies
//! arrive in command order and a caller that awaits each acknowledgment before
//! sending more data gets backpressure for free.
//!
//! ```text
//! WorkerHandle ──commands──▶ worker task ──owns──▶ DecoderSession
//!      ▲                          │
//!      └──────── events ◀─────────┘  (metadata, frames)
//! ```
//!
//! Header parsing and frame decoding run on the blocking pool with the session moved
//! in and back out; nothing about the session is shared with the caller.
//!
//! Handles reach the event channel through a slot the worker empties when its task
//! exits for any reason, so event streams end with the worker.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::DecoderConfig;
use crate::events::EventChannel;
use crate::session::DecoderSession;
use crate::stream::EventStream;
use crate::types::{DecodedFrame, Packet, SessionStatus, StreamMetadata};
use crate::{DecoderError, Result};

enum Command {
    Initialize {
        source_name: String,
        block_size: u32,
        max_decoded_dimension: u32,
        reply: oneshot::Sender<Result<()>>,
    },
    Submit {
        packet: Packet,
        reply: oneshot::Sender<Result<usize>>,
    },
    OpenVideo {
        reply: oneshot::Sender<Result<bool>>,
    },
    Decode {
        reply: oneshot::Sender<Result<bool>>,
    },
    CloseVideo {
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::Submit { .. } => "submit",
            Command::OpenVideo { .. } => "open_video",
            Command::Decode { .. } => "decode",
            Command::CloseVideo { .. } => "close_video",
            Command::Status { .. } => "status",
        }
    }
}

/// Event channel as seen by handles; `None` once the worker task has exited.
type EventSlot = Arc<RwLock<Option<EventChannel>>>;

/// Empties the event slot when the worker task ends, including by panic or abort.
struct CloseEventsOnExit(EventSlot);

impl Drop for CloseEventsOnExit {
    fn drop(&mut self) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Spawns decode workers.
pub struct Worker;

impl Worker {
    /// Spawn a worker task on the current tokio runtime.
    pub fn spawn(config: &DecoderConfig) -> WorkerHandle {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        let events = EventChannel::new(config.event_capacity.max(1));
        let cancel = CancellationToken::new();
        let session = DecoderSession::new(config.max_buffered_bytes);
        let slot: EventSlot = Arc::new(RwLock::new(Some(events.clone())));

        let task = tokio::spawn(Self::run(session, receiver, events, slot.clone(), cancel.clone()));

        WorkerHandle { commands: Some(commands), events: slot, cancel, task: Some(task) }
    }

    async fn run(
        mut session: DecoderSession,
        mut commands: mpsc::Receiver<Command>,
        events: EventChannel,
        slot: EventSlot,
        cancel: CancellationToken,
    ) {
        let _close_events = CloseEventsOnExit(slot);
        info!("Decode worker started");

        loop {
            let command = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Decode worker cancelled");
                    break;
                }
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => {
                        debug!("All worker handles dropped");
                        break;
                    }
                },
            };

            trace!("Worker command: {}", command.name());
            match Self::handle(session, command, &events).await {
                Some(next) => session = next,
                None => {
                    error!("Decode step panicked, worker stopping");
                    return;
                }
            }
        }

        let status = session.status();
        info!(
            "Decode worker stopped in state {} after {} frames",
            status.state, status.decoded_frame_count
        );
    }

    /// Execute one command. Returns `None` if the session was lost to a panic.
    async fn handle(
        mut session: DecoderSession,
        command: Command,
        events: &EventChannel,
    ) -> Option<DecoderSession> {
        match command {
            Command::Initialize { source_name, block_size, max_decoded_dimension, reply } => {
                let result = session.initialize(&source_name, block_size, max_decoded_dimension);
                respond(reply, result);
            }
            Command::Submit { packet, reply } => {
                respond(reply, session.submit(packet));
            }
            Command::OpenVideo { reply } => {
                let (next, result) = offload(session, DecoderSession::open_video).await?;
                session = next;
                let result = result.map(|metadata| match metadata {
                    Some(metadata) => {
                        events.emit_metadata(metadata);
                        true
                    }
                    None => false,
                });
                respond(reply, result);
            }
            Command::Decode { reply } => {
                let (next, result) = offload(session, DecoderSession::decode).await?;
                session = next;
                let result = result.map(|frame| match frame {
                    Some(frame) => {
                        events.emit_frame(frame);
                        true
                    }
                    None => false,
                });
                respond(reply, result);
            }
            Command::CloseVideo { reply } => {
                respond(reply, session.close_video());
            }
            Command::Status { reply } => {
                respond(reply, session.status());
            }
        }
        Some(session)
    }
}

/// Run a CPU-bound session step on the blocking pool.
async fn offload<T, F>(mut session: DecoderSession, step: F) -> Option<(DecoderSession, T)>
where
    F: FnOnce(&mut DecoderSession) -> T + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let result = step(&mut session);
        (session, result)
    })
    .await;

    match joined {
        Ok(output) => Some(output),
        Err(e) => {
            error!("Blocking decode step failed: {}", e);
            None
        }
    }
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Caller dropped before reply");
    }
}

/// Caller-side handle to a decode worker.
///
/// Dropping the handle cancels the worker; [`WorkerHandle::terminate`] additionally
/// waits for it to stop.
pub struct WorkerHandle {
    commands: Option<mpsc::Sender<Command>>,
    events: EventSlot,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let commands = self.commands.as_ref().ok_or(DecoderError::WorkerTerminated)?;
        let (reply, response) = oneshot::channel();
        commands.send(command(reply)).await.map_err(|_| DecoderError::WorkerTerminated)?;
        response.await.map_err(|_| DecoderError::WorkerTerminated)
    }

    /// Prepare the worker's session. Valid once, before any packet.
    pub async fn initialize(
        &self,
        source_name: impl Into<String>,
        block_size: u32,
        max_decoded_dimension: u32,
    ) -> Result<()> {
        let source_name = source_name.into();
        self.request(|reply| Command::Initialize {
            source_name,
            block_size,
            max_decoded_dimension,
            reply,
        })
        .await?
    }

    /// Move a packet into the worker. Resolves with the acknowledged length once the
    /// bytes are appended to the session's buffer.
    pub async fn submit(&self, packet: Packet) -> Result<usize> {
        self.request(|reply| Command::Submit { packet, reply }).await?
    }

    /// Submit `length` bytes of `buffer` starting at `offset`.
    pub async fn submit_bytes(&self, buffer: Vec<u8>, offset: usize, length: usize) -> Result<usize> {
        self.submit(Packet::new(buffer, offset, length)?).await
    }

    /// Parse the stream header from buffered packets.
    ///
    /// On `true` the metadata event has already been emitted.
    pub async fn open_video(&self) -> Result<bool> {
        self.request(|reply| Command::OpenVideo { reply }).await?
    }

    /// Decode one frame.
    ///
    /// On `true` the frame event has already been emitted; `false` means no complete
    /// frame is buffered.
    pub async fn decode(&self) -> Result<bool> {
        self.request(|reply| Command::Decode { reply }).await?
    }

    pub async fn close_video(&self) -> Result<()> {
        self.request(|reply| Command::CloseVideo { reply }).await?
    }

    pub async fn status(&self) -> Result<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Subscribe to stream metadata events.
    ///
    /// The stream is already closed if the worker has exited.
    pub fn on_metadata_available(&self) -> EventStream<StreamMetadata> {
        match self.events.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(events) => events.subscribe_metadata(),
            None => EventStream::closed("metadata"),
        }
    }

    /// Subscribe to decoded frame events.
    pub fn on_frame_available(&self) -> EventStream<DecodedFrame> {
        match self.events.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(events) => events.subscribe_frames(),
            None => EventStream::closed("frame"),
        }
    }

    /// True after [`terminate`](Self::terminate), or once the worker task has
    /// exited on its own.
    pub fn is_terminated(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the worker and release its session. Safe in any state and idempotent.
    ///
    /// Every event stream ends once this returns.
    pub async fn terminate(&mut self) {
        self.cancel.cancel();
        self.commands = None;
        self.events.write().unwrap_or_else(PoisonError::into_inner).take();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Decode worker ended abnormally: {}", e);
            }
            info!("Decode worker terminated");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
