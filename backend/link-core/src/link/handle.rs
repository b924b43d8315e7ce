//! Handle to the running link service thread.

use crate::error::link::LinkError;
use crate::link::service::ServiceCommand;

use models::{LinkEvent, LinkSession};

use std::thread::JoinHandle;

use log::{debug, warn};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

/// Owner-side end of the service actor.
///
/// Dropping the handle asks the service to shut down but does not wait for
/// the thread; [`ServiceHandle::join`] does both.
pub(crate) struct ServiceHandle {
    commands: mpsc::UnboundedSender<ServiceCommand>,
    session: watch::Receiver<LinkSession>,
    events: broadcast::Sender<LinkEvent>,
    thread: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<ServiceCommand>,
        session: watch::Receiver<LinkSession>,
        events: broadcast::Sender<LinkEvent>,
        thread: JoinHandle<()>,
    ) -> Self {
        Self {
            commands,
            session,
            events,
            thread: Some(thread),
        }
    }

    #[track_caller]
    pub(crate) fn send(&self, command: ServiceCommand) -> Result<(), LinkError> {
        self.commands
            .send(command)
            .map_err(|_| LinkError::service_unavailable("link service thread has exited"))
    }

    /// Send a command carrying a reply slot and wait for the answer.
    pub(crate) async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ServiceCommand,
    ) -> Result<T, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx))?;
        reply_rx
            .await
            .map_err(|_| LinkError::service_unavailable("link service dropped the request"))
    }

    pub(crate) fn session(&self) -> LinkSession {
        *self.session.borrow()
    }

    /// Watch receiver for waiting on session transitions.
    pub(crate) fn session_watch(&self) -> watch::Receiver<LinkSession> {
        self.session.clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Shut the service down and wait for its thread to exit.
    ///
    /// Blocks the calling thread until the service has stopped; call it from
    /// a blocking context.
    pub(crate) fn join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        let _ = self.commands.send(ServiceCommand::Shutdown);

        if thread.join().is_err() {
            warn!("Link service thread panicked");
        } else {
            debug!("Link service thread joined");
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.commands.send(ServiceCommand::Shutdown);
        }
    }
}
