//! The process-wide keyboard hook
//!
//! `HotkeyHook` owns the key event source and fans its events out to subscribers.
//! It is acquired once at startup and released with `unload`, which also runs on drop.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{HotkeyError, KeyEvent};

/// Capacity of the raw and per-subscriber event channels
const EVENT_BUFFER: usize = 64;

/// Something that produces system-wide key presses
pub trait KeyEventSource: Send {
    /// Begin delivering key presses into `tx` until `stop` is called.
    /// Dropping every clone of `tx` signals that the source is exhausted.
    fn start(&mut self, tx: mpsc::Sender<KeyEvent>) -> Result<(), HotkeyError>;

    /// Stop delivering events and release any devices
    fn stop(&mut self);
}

pub type SubscriptionId = Uuid;

type Subscribers = Arc<Mutex<Vec<(SubscriptionId, mpsc::Sender<KeyEvent>)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HookState {
    Idle,
    Running,
    Unloaded,
}

pub struct HotkeyHook {
    source: Box<dyn KeyEventSource>,
    subscribers: Subscribers,
    cancel_token: CancellationToken,
    state: HookState,
}

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<(SubscriptionId, mpsc::Sender<KeyEvent>)>> {
    subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HotkeyHook {
    pub fn new(source: impl KeyEventSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            cancel_token: CancellationToken::new(),
            state: HookState::Idle,
        }
    }

    /// Register a new subscriber. Events arrive on the receiver in the order they were pressed.
    pub fn subscribe(&self) -> (SubscriptionId, mpsc::Receiver<KeyEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let id = Uuid::new_v4();
        lock(&self.subscribers).push((id, tx));
        log::debug!("Hotkey subscriber {} registered", id);
        (id, rx)
    }

    /// Drop every subscriber
    pub fn unsubscribe_all(&self) {
        let removed = {
            let mut subscribers = lock(&self.subscribers);
            let n = subscribers.len();
            subscribers.clear();
            n
        };
        if removed > 0 {
            log::debug!("Removed {} hotkey subscriber(s)", removed);
        }
    }

    fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Attach to the key event source and start forwarding events.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), HotkeyError> {
        match self.state {
            HookState::Running => return Err(HotkeyError::AlreadyStarted),
            HookState::Unloaded => return Err(HotkeyError::Unloaded),
            HookState::Idle => {}
        }

        let (raw_tx, raw_rx) = mpsc::channel(EVENT_BUFFER);
        self.source.start(raw_tx)?;

        let subscribers = self.subscribers.clone();
        let cancel = self.cancel_token.clone();
        tokio::spawn(async move {
            Self::forward(raw_rx, subscribers, cancel).await;
        });

        self.state = HookState::Running;
        log::info!(
            "Keyboard hook started ({} subscriber(s))",
            self.subscriber_count()
        );
        Ok(())
    }

    async fn forward(
        mut raw_rx: mpsc::Receiver<KeyEvent>,
        subscribers: Subscribers,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                received = raw_rx.recv() => {
                    let Some(event) = received else {
                        log::info!("Key event source closed");
                        lock(&subscribers).clear();
                        break;
                    };

                    // Snapshot so the lock is not held across await points
                    let targets: Vec<_> = lock(&subscribers).clone();
                    for (id, tx) in targets {
                        if tx.send(event).await.is_err() {
                            log::debug!("Hotkey subscriber {} went away", id);
                            lock(&subscribers).retain(|(sub_id, _)| *sub_id != id);
                        }
                    }
                }
            }
        }
    }

    /// Remove all subscribers and release the event source. Idempotent.
    pub fn unload(&mut self) {
        if self.state == HookState::Unloaded {
            return;
        }
        self.unsubscribe_all();
        self.source.stop();
        self.cancel_token.cancel();
        self.state = HookState::Unloaded;
        log::info!("Keyboard hook unloaded");
    }
}

impl Drop for HotkeyHook {
    fn drop(&mut self) {
        self.unload();
    }
}
