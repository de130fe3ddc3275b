//! Async window driver.
//!
//! Each window runs as one tokio task that owns its [`WindowEngine`] and its
//! transport endpoint. Inbound sibling messages, producer commands and the
//! engine's next deadline are multiplexed in a single `select!` loop, so all
//! mutations of a window are serialized. Consumers observe the window through
//! a `watch` channel of [`DisplaySnapshot`]s.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::config::Config;
use crate::engine::{DisplaySnapshot, WindowEngine};
use crate::error::{Error, Result};
use crate::protocol::SyncMessage;
use crate::record::TranslationRecord;
use crate::transport::{BroadcastHub, SyncTransport};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug)]
enum WindowCommand {
    AddTranslation(TranslationRecord),
    ResetTranslations,
    SetActive(bool),
    SetAutoTranslate(bool),
    Flush(oneshot::Sender<()>),
    Close,
}

/// Producer/consumer handle to a running window.
///
/// Dropping the handle closes the window.
#[derive(Debug)]
pub struct WindowHandle {
    id: u64,
    commands: mpsc::Sender<WindowCommand>,
    snapshots: watch::Receiver<DisplaySnapshot>,
    task: JoinHandle<()>,
}

impl WindowHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn add_translation(&self, record: TranslationRecord) -> Result<()> {
        self.send(WindowCommand::AddTranslation(record)).await
    }

    pub async fn reset_translations(&self) -> Result<()> {
        self.send(WindowCommand::ResetTranslations).await
    }

    pub async fn set_active(&self, active: bool) -> Result<()> {
        self.send(WindowCommand::SetActive(active)).await
    }

    pub async fn set_auto_translate_enabled(&self, enabled: bool) -> Result<()> {
        self.send(WindowCommand::SetAutoTranslate(enabled)).await
    }

    /// Wait until every earlier command is applied and its snapshot published.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(WindowCommand::Flush(ack_tx)).await?;
        ack_rx
            .await
            .map_err(|_| Error::Runtime(format!("window {} closed during flush", self.id)))
    }

    /// A fresh receiver of display snapshots, starting at the current one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DisplaySnapshot> {
        self.snapshots.clone()
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DisplaySnapshot {
        self.snapshots.borrow().clone()
    }

    /// Cancel timers, close the endpoint and wait for the task to exit.
    pub async fn close(self) -> Result<()> {
        // Already gone is fine; the join below reports panics.
        let _ = self.commands.send(WindowCommand::Close).await;
        self.task
            .await
            .map_err(|err| Error::Runtime(format!("window task failed: {err}")))
    }

    async fn send(&self, command: WindowCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::Runtime(format!("window {} is closed", self.id)))
    }
}

/// Spawn a window task over `transport`. Must be called within a tokio runtime.
pub fn spawn_window<T>(window_id: u64, engine: WindowEngine, transport: T) -> WindowHandle
where
    T: SyncTransport + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (snapshot_tx, snapshot_rx) = watch::channel(engine.snapshot());
    let span = crate::window_span!("window", window_id = window_id);
    let task = tokio::spawn(
        run_window(engine, transport, command_rx, snapshot_tx).instrument(span),
    );

    WindowHandle {
        id: window_id,
        commands: command_tx,
        snapshots: snapshot_rx,
        task,
    }
}

/// Open an endpoint on the configured channel and spawn a window over it.
pub fn open_window(hub: &BroadcastHub, config: &Config) -> Result<WindowHandle> {
    let endpoint = hub.open(&config.channel.name, config.channel.capacity)?;
    let engine = WindowEngine::new(config.pacing);
    Ok(spawn_window(endpoint.id(), engine, endpoint))
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}

fn publish_all<T: SyncTransport>(transport: &T, messages: Vec<SyncMessage>) {
    for message in messages {
        if let Err(err) = transport.publish(&message) {
            warn!(kind = message.kind(), error = %err, "publish failed");
        }
    }
}

fn publish_snapshot(snapshots: &watch::Sender<DisplaySnapshot>, engine: &WindowEngine) {
    snapshots.send_if_modified(|current| {
        if current.revision == engine.revision() {
            false
        } else {
            *current = engine.snapshot();
            true
        }
    });
}

async fn run_window<T: SyncTransport>(
    mut engine: WindowEngine,
    mut transport: T,
    mut commands: mpsc::Receiver<WindowCommand>,
    snapshots: watch::Sender<DisplaySnapshot>,
) {
    info!("window opened");
    publish_all(&transport, engine.open());
    let mut inbound_open = true;

    loop {
        let deadline = engine.next_deadline();

        tokio::select! {
            inbound = transport.recv(), if inbound_open => match inbound {
                Some(message) => {
                    let replies = engine.handle_message(message, now());
                    publish_all(&transport, replies);
                }
                None => {
                    debug!("inbound channel closed");
                    inbound_open = false;
                }
            },
            command = commands.recv() => {
                let Some(command) = command else { break };
                let t = now();
                let out = match command {
                    WindowCommand::AddTranslation(record) => engine.add_translation(record, t),
                    WindowCommand::ResetTranslations => engine.reset_translations(t),
                    WindowCommand::SetActive(active) => {
                        engine.set_active(active, t);
                        Vec::new()
                    }
                    WindowCommand::SetAutoTranslate(enabled) => {
                        engine.set_auto_translate_enabled(enabled);
                        Vec::new()
                    }
                    WindowCommand::Flush(ack) => {
                        publish_snapshot(&snapshots, &engine);
                        let _ = ack.send(());
                        Vec::new()
                    }
                    WindowCommand::Close => break,
                };
                publish_all(&transport, out);
            }
            () = sleep_until_deadline(deadline), if deadline.is_some() => {
                let out = engine.advance(now());
                publish_all(&transport, out);
            }
        }

        publish_snapshot(&snapshots, &engine);
    }

    transport.close();
    info!(rendered = engine.rendered().len(), "window closed");
}
