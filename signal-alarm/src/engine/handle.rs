//! Commands into the engine and the handle that sends them.
//!
//! Each command carries a oneshot reply so callers can await the engine's
//! state after the change has been applied.

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::AlarmEvent;
use crate::api_client::types::AlarmView;
use crate::error::{Error, Result};
use crate::signal::{AntidelaySeconds, Signal};

/// Commands from the UI layer to the engine.
pub enum EngineCommand {
    /// The user pressed "ring off".
    Dismiss { reply: oneshot::Sender<AlarmView> },

    /// Change the lead time applied to every signal.
    SetAntidelay {
        antidelay: AntidelaySeconds,
        reply: oneshot::Sender<AlarmView>,
    },

    /// Replace the governing signal list.
    SetSignals {
        signals: Vec<Signal>,
        reply: oneshot::Sender<AlarmView>,
    },
}

/// Cloneable handle to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    pub(super) cmd_tx: mpsc::Sender<EngineCommand>,
    pub(super) view_rx: watch::Receiver<AlarmView>,
    pub(super) events_tx: broadcast::Sender<AlarmEvent>,
}

impl EngineHandle {
    /// Latest published alarm state.
    pub fn view(&self) -> AlarmView {
        self.view_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.events_tx.subscribe()
    }

    pub async fn dismiss(&self) -> Result<AlarmView> {
        self.request(|reply| EngineCommand::Dismiss { reply }).await
    }

    pub async fn set_antidelay(&self, antidelay: AntidelaySeconds) -> Result<AlarmView> {
        self.request(|reply| EngineCommand::SetAntidelay { antidelay, reply })
            .await
    }

    pub async fn set_signals(&self, signals: Vec<Signal>) -> Result<AlarmView> {
        self.request(|reply| EngineCommand::SetSignals { signals, reply })
            .await
    }

    async fn request(
        &self,
        command: impl FnOnce(oneshot::Sender<AlarmView>) -> EngineCommand,
    ) -> Result<AlarmView> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(command(tx))
            .await
            .map_err(|_| Error::EngineStopped)?;
        rx.await.map_err(|_| Error::EngineStopped)
    }
}
