use std::sync::Arc;

use bon::Builder;
use dissolve_derive::Dissolve;
use tokio::sync::oneshot;

use crate::state::{AppState, Event, TransitionError};

pub enum StoreMsg {
    Dispatch(Dispatch),
    Shutdown,
}

#[derive(Debug, Builder, Dissolve)]
pub struct Dispatch {
    event: Event,
    sender: oneshot::Sender<Result<Arc<AppState>, TransitionError>>,
}
