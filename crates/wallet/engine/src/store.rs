//! State store runtime owning the single [`AppState`].
//!
//! The store is a task that receives [`StoreMsg`]s on an unbounded channel and applies
//! each dispatched [`Event`] with [`reduce`], one at a time, in arrival order. The
//! outcome is answered on the `oneshot` channel carried by the message, and every
//! accepted event publishes the next snapshot on a `watch` channel.
//!
//! ```text
//!  Callers (any task)                Store task
//! ┌───────────────────────┐         ┌───────────────────────────────┐
//! │ StoreHandle           │         │ AppState                      │
//! │                       │         │                               │
//! │ mpsc::UnboundedSender ┼─────────│──> mpsc::UnboundedReceiver    │
//! │ oneshot::Receiver <───┼─────────┤─── oneshot::Sender            │
//! │ watch::Receiver <─────┼─────────┤─── watch::Sender              │
//! └───────────────────────┘         └───────────────────────────────┘
//! ```
//!
//! A rejected event leaves the state untouched and publishes nothing.

pub mod msg;

use std::sync::Arc;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};

use crate::{
    error::WalletEngineErrorKind,
    state::{AppState, Event, reduce},
};

use self::msg::{Dispatch, DispatchDissolved, StoreMsg};

/// Cloneable access to a running store.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    sender: mpsc::UnboundedSender<StoreMsg>,
    snapshots: watch::Receiver<Arc<AppState>>,
}

/// Spawns the store task starting from `initial`.
#[tracing::instrument(skip_all)]
pub fn spawn_new(initial: AppState) -> (StoreHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (publisher, snapshots) = watch::channel(Arc::new(initial));

    let handle = tokio::spawn(run_store(receiver, publisher));

    (StoreHandle { sender, snapshots }, handle)
}

impl StoreHandle {
    /// Returns the current snapshot.
    pub fn state(&self) -> Arc<AppState> {
        self.snapshots.borrow().clone()
    }

    /// Returns a receiver notified with every accepted change.
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.snapshots.clone()
    }

    /// Applies `event`, returning the resulting snapshot.
    pub async fn dispatch(&self, event: Event) -> Result<Arc<AppState>, WalletEngineErrorKind> {
        let (msg, receiver) = {
            let (sender, receiver) = oneshot::channel();
            let msg = Dispatch::builder().event(event).sender(sender).build();

            (StoreMsg::Dispatch(msg), receiver)
        };

        self.sender
            .send(msg)
            .map_err(|_| WalletEngineErrorKind::mpsc_sender("failed to send dispatch"))?;

        receiver.await.map_err(WalletEngineErrorKind::from)?.map_err(WalletEngineErrorKind::from)
    }

    /// Asks the store task to stop after the messages already queued.
    pub fn shutdown(&self) -> Result<(), WalletEngineErrorKind> {
        self.sender
            .send(StoreMsg::Shutdown)
            .map_err(|_| WalletEngineErrorKind::mpsc_sender("failed to send shutdown msg"))
    }
}

#[tracing::instrument(skip_all)]
async fn run_store(
    mut receiver: mpsc::UnboundedReceiver<StoreMsg>,
    publisher: watch::Sender<Arc<AppState>>,
) {
    let mut state = publisher.borrow().clone();

    while let Some(msg) = receiver.recv().await {
        match msg {
            StoreMsg::Shutdown => {
                tracing::info!("received shutdown msg, stopping state store");
                break;
            },
            StoreMsg::Dispatch(msg) => {
                let DispatchDissolved { event, sender } = msg.dissolve();

                let outcome = reduce(&state, event)
                    .map(Arc::new)
                    .inspect(|next| {
                        state = next.clone();
                        publisher.send_replace(next.clone());
                    })
                    .inspect_err(|e| tracing::debug!("rejected event: {e}"));

                let _ = sender
                    .send(outcome)
                    .inspect_err(|_| tracing::warn!("dispatch caller went away before the reply"));
            },
        }
    }

    tracing::info!("shutting down state store");
}
