//! Consumer lifecycle shared by the broker clients.
//!
//! `Idle -> Connected -> Running -> Connected -> ... -> Destroyed`. Stopping
//! cancels the loop and awaits it, so the in-flight batch is always handled.

use std::future::Future;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{TransportError, TransportResult};

#[derive(Debug)]
enum ConsumerState {
    Idle,
    Connected,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Destroyed,
}

#[derive(Debug)]
pub(crate) struct Lifecycle {
    group_id: String,
    state: Mutex<ConsumerState>,
}

impl Lifecycle {
    pub(crate) fn new(group_id: String) -> Self {
        Self {
            group_id,
            state: Mutex::new(ConsumerState::Idle),
        }
    }

    pub(crate) fn group_id(&self) -> &str {
        &self.group_id
    }

    pub(crate) async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, ConsumerState::Running { .. })
    }

    pub(crate) async fn ensure_usable(&self) -> TransportResult<()> {
        match *self.state.lock().await {
            ConsumerState::Destroyed => Err(TransportError::Destroyed),
            _ => Ok(()),
        }
    }

    pub(crate) async fn connect(&self) -> TransportResult<()> {
        let mut state = self.state.lock().await;
        match *state {
            ConsumerState::Destroyed => Err(TransportError::Destroyed),
            ConsumerState::Idle => {
                *state = ConsumerState::Connected;
                Ok(())
            },
            _ => Ok(()),
        }
    }

    /// Spawn the loop built by `run` with a fresh cancellation token.
    pub(crate) async fn start<F, Fut>(&self, topics: &[String], run: F) -> TransportResult<()>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.state.lock().await;
        match *state {
            ConsumerState::Connected => {},
            ConsumerState::Running { .. } => return Err(TransportError::AlreadyStarted),
            ConsumerState::Destroyed => return Err(TransportError::Destroyed),
            ConsumerState::Idle => return Err(TransportError::NotConnected),
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(cancel.clone()));

        info!(group_id = %self.group_id, topics = ?topics, "Consumer started");
        *state = ConsumerState::Running { cancel, task };
        Ok(())
    }

    pub(crate) async fn stop(&self) -> TransportResult<()> {
        let mut state = self.state.lock().await;
        Self::stop_running(&mut state).await?;
        info!(group_id = %self.group_id, "Consumer stopped");
        Ok(())
    }

    pub(crate) async fn disconnect(&self) -> TransportResult<()> {
        let mut state = self.state.lock().await;
        Self::stop_running(&mut state).await?;
        if matches!(*state, ConsumerState::Connected) {
            *state = ConsumerState::Idle;
        }
        Ok(())
    }

    pub(crate) async fn destroy(&self) -> TransportResult<()> {
        let mut state = self.state.lock().await;
        Self::stop_running(&mut state).await?;
        *state = ConsumerState::Destroyed;
        Ok(())
    }

    async fn stop_running(state: &mut ConsumerState) -> TransportResult<()> {
        if !matches!(state, ConsumerState::Running { .. }) {
            return Ok(());
        }
        if let ConsumerState::Running { cancel, task } =
            std::mem::replace(state, ConsumerState::Connected)
        {
            cancel.cancel();
            task.await.map_err(|e| TransportError::Task(e.to_string()))?;
        }
        Ok(())
    }
}
