use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

use crate::error::RequestError;
use crate::server::handler::RequestHandler;
use crate::server::task::SessionTask;

/// Lifecycle of the server, guarded by the tracker mutex
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Registry of live connections keyed by a monotonic id.
///
/// The admission check and the insertion happen under the same mutex
/// acquisition, so the live count can never exceed the configured maximum.
pub(crate) struct SessionTracker {
    lifecycle: Lifecycle,
    id: u64,
    sessions: BTreeMap<u64, tokio::sync::mpsc::Sender<()>>,
    accept_shutdown: Option<tokio::sync::mpsc::Sender<()>>,
    count: tokio::sync::watch::Sender<usize>,
}

pub(crate) type SessionTrackerWrapper = Arc<Mutex<SessionTracker>>;

impl SessionTracker {
    fn new(count: tokio::sync::watch::Sender<usize>) -> SessionTracker {
        Self {
            lifecycle: Lifecycle::Idle,
            id: 0,
            sessions: BTreeMap::new(),
            accept_shutdown: None,
            count,
        }
    }

    pub(crate) fn wrapped(count: tokio::sync::watch::Sender<usize>) -> SessionTrackerWrapper {
        Arc::new(Mutex::new(Self::new(count)))
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub(crate) fn set_accept_shutdown(&mut self, tx: tokio::sync::mpsc::Sender<()>) {
        self.accept_shutdown = Some(tx);
    }

    pub(crate) fn take_accept_shutdown(&mut self) -> Option<tokio::sync::mpsc::Sender<()>> {
        self.accept_shutdown.take()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn senders(&self) -> Vec<tokio::sync::mpsc::Sender<()>> {
        self.sessions.values().cloned().collect()
    }

    fn get_next_id(&mut self) -> u64 {
        let ret = self.id;
        self.id += 1;
        ret
    }

    pub(crate) fn add(&mut self, sender: tokio::sync::mpsc::Sender<()>) -> u64 {
        let id = self.get_next_id();
        self.sessions.insert(id, sender);
        self.publish_count();
        id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.sessions.remove(&id);
        self.publish_count();
    }

    fn publish_count(&self) {
        let _ = self.count.send(self.sessions.len());
    }
}

/// Accept loop: admits connections up to the configured maximum and spawns
/// one [`SessionTask`] per admitted socket
pub(crate) struct ServerTask<T: RequestHandler> {
    listener: TcpListener,
    handler: Arc<T>,
    tracker: SessionTrackerWrapper,
    max_sessions: Option<usize>,
    read_timeout: Option<Duration>,
    shutdown: tokio::sync::mpsc::Receiver<()>,
}

impl<T> ServerTask<T>
where
    T: RequestHandler,
{
    pub(crate) fn new(
        listener: TcpListener,
        handler: Arc<T>,
        tracker: SessionTrackerWrapper,
        max_sessions: Option<usize>,
        read_timeout: Option<Duration>,
        shutdown: tokio::sync::mpsc::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            handler,
            tracker,
            max_sessions,
            read_timeout,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("server shutdown");
                    return;
                }
                result = self.listener.accept() => {
                    match result {
                        Err(err) => {
                            if self.stopping() {
                                tracing::info!("server shutdown");
                            } else {
                                tracing::error!("error accepting connection: {}", err);
                            }
                            return;
                        }
                        Ok((socket, addr)) => {
                            if !self.handle(socket, addr) {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    fn stopping(&self) -> bool {
        self.tracker.lock().unwrap().lifecycle() != Lifecycle::Running
    }

    // returns false when the accept loop should exit
    fn handle(&mut self, socket: TcpStream, addr: SocketAddr) -> bool {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        let id = {
            let mut tracker = self.tracker.lock().unwrap();

            if tracker.lifecycle() != Lifecycle::Running {
                // the socket closes as it drops, without a reply
                return false;
            }

            if let Some(max) = self.max_sessions {
                if tracker.len() >= max {
                    drop(tracker);
                    // rejection is by close: no frame has been read, so
                    // there is no transaction to reply to
                    tracing::warn!(
                        "max clients ({}) reached, rejecting connection from: {}",
                        max,
                        addr
                    );
                    return true;
                }
            }

            tracker.add(tx)
        };

        tracing::info!("accepted connection {} from: {}", id, addr);

        let handler = self.handler.clone();
        let tracker = self.tracker.clone();
        let read_timeout = self.read_timeout;
        let span = tracing::Span::current();

        tokio::spawn(async move {
            let mut session = SessionTask::new(socket, handler, rx, read_timeout);
            let err = session
                .run()
                .instrument(tracing::info_span!(parent: &span, "session", "id" = id, "remote" = ?addr))
                .await;

            match err {
                RequestError::Shutdown => {
                    tracing::debug!("session {} closed by server shutdown", id)
                }
                RequestError::Io(kind) if kind == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("session {} closed by peer", id)
                }
                RequestError::ReadTimeout => {
                    tracing::warn!("session {} timed out waiting for a request", id)
                }
                err => tracing::warn!("session {} error: {}", id, err),
            }

            tracker.lock().unwrap().remove(id);
            tracing::info!("session {} closed", id);
        });

        true
    }
}
