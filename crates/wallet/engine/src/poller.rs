use core::time::Duration;
use std::sync::Arc;

use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    task::JoinHandle,
};

use crate::{
    Backend, WalletEngineError,
    error::WalletEngineErrorKind,
    state::Event,
    store::StoreHandle,
};

/// Handle to the background task re-enumerating devices on a fixed interval.
///
/// The stop signal is observed before and during every fetch and sleep, and again
/// before a fetched list is applied, so once [`DevicePoller::stop`] returns or the
/// handle is dropped no further device update is applied. Dropping the handle does
/// not wait for the task.
#[derive(Debug)]
pub struct DevicePoller {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DevicePoller {
    pub(crate) fn spawn<B>(backend: Arc<B>, store: StoreHandle, interval: Duration) -> Self
    where
        B: Backend,
    {
        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(run_poller(backend, store, interval, stopped));

        Self { stop: Some(stop), handle: Some(handle) }
    }

    /// Stops polling and waits for the task to finish.
    pub async fn stop(mut self) -> Result<(), WalletEngineError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| WalletEngineErrorKind::other(format!("device poller misbehavior: {e}")))
                .map_err(From::from),
            None => Ok(()),
        }
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[tracing::instrument(skip_all, fields(?interval))]
async fn run_poller<B>(
    backend: Arc<B>,
    store: StoreHandle,
    interval: Duration,
    mut stopped: oneshot::Receiver<()>,
) where
    B: Backend,
{
    loop {
        let fetched = tokio::select! {
            biased;
            _ = &mut stopped => break,
            fetched = backend.get_devices() => fetched,
        };

        let event = match fetched {
            Ok(devices) => Event::DevicesLoaded(devices),
            Err(e) => {
                tracing::warn!("failed to poll devices: {e}");
                Event::DevicesFailed(e.to_string())
            },
        };

        if !matches!(stopped.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        if let Err(e) = store.dispatch(event).await {
            tracing::error!("device poller lost the state store: {e}");
            break;
        }

        tokio::select! {
            biased;
            _ = &mut stopped => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }

    tracing::info!("device poller stopped");
}
