use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::Instrument;

use crate::error::{ConfigError, StartError};
use crate::tcp::server::{Lifecycle, ServerTask, SessionTracker, SessionTrackerWrapper};

pub(crate) mod handler;
pub(crate) mod request;
pub(crate) mod response;
pub(crate) mod task;

pub use handler::*;

/// smallest read deadline that can be configured
const MIN_READ_TIMEOUT: Duration = Duration::from_secs(60);
/// how long [`Server::stop`] waits for workers to drain before giving up
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Validates server options and produces a [`Server`]
pub struct ServerBuilder<T: RequestHandler> {
    handler: Arc<T>,
    max_clients: Option<usize>,
    read_timeout: Option<Duration>,
}

impl<T: RequestHandler> ServerBuilder<T> {
    /// Create a builder with no client limit and no read deadline
    pub fn new(handler: Arc<T>) -> Self {
        Self {
            handler,
            max_clients: None,
            read_timeout: None,
        }
    }

    /// Cap the number of concurrently connected clients. Must be at least one.
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = Some(max);
        self
    }

    /// Disconnect a client when no request arrives within `timeout`.
    /// Must be at least 60 seconds.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Validate the options and create the server
    pub fn build(self) -> Result<Server<T>, ConfigError> {
        if self.max_clients == Some(0) {
            return Err(ConfigError::MaxClientsZero);
        }

        if let Some(timeout) = self.read_timeout {
            if timeout < MIN_READ_TIMEOUT {
                return Err(ConfigError::ReadTimeoutTooShort(timeout));
            }
        }

        let (count_tx, count_rx) = tokio::sync::watch::channel(0);

        Ok(Server {
            handler: self.handler,
            max_clients: self.max_clients,
            read_timeout: self.read_timeout,
            tracker: SessionTracker::wrapped(count_tx),
            count_rx,
        })
    }
}

/// A Modbus TCP server: accepts connections, frames requests, and dispatches
/// them to the [`RequestHandler`] supplied at construction.
///
/// The server is created with [`ServerBuilder`], started at most once with
/// [`Server::start`], and stopped with [`Server::stop`].
pub struct Server<T: RequestHandler> {
    handler: Arc<T>,
    max_clients: Option<usize>,
    read_timeout: Option<Duration>,
    tracker: SessionTrackerWrapper,
    count_rx: tokio::sync::watch::Receiver<usize>,
}

impl<T: RequestHandler> Server<T> {
    /// Shorthand for [`ServerBuilder::new`]
    pub fn builder(handler: Arc<T>) -> ServerBuilder<T> {
        ServerBuilder::new(handler)
    }

    /// Start accepting connections on `listener`.
    ///
    /// Spawns the accept loop onto the current runtime, so this method must
    /// be called from within a Tokio runtime context. It may be called at
    /// most once for the lifetime of the server.
    pub fn start(&self, listener: TcpListener) -> Result<(), StartError> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);

        {
            let mut tracker = self.tracker.lock().unwrap();
            match tracker.lifecycle() {
                Lifecycle::Running => return Err(StartError::AlreadyStarted),
                Lifecycle::Stopped => return Err(StartError::Stopped),
                Lifecycle::Idle => {}
            }
            tracker.set_lifecycle(Lifecycle::Running);
            tracker.set_accept_shutdown(tx);
        }

        let addr = listener.local_addr().ok();
        let task = ServerTask::new(
            listener,
            self.handler.clone(),
            self.tracker.clone(),
            self.max_clients,
            self.read_timeout,
            rx,
        );

        tokio::spawn(
            task.run()
                .instrument(tracing::info_span!("modbus-server", "listen" = ?addr)),
        );

        Ok(())
    }

    /// Stop the server: stop accepting connections, sever every client, and
    /// wait for the workers to drain.
    ///
    /// Idempotent and infallible. The wait is bounded; if a worker fails to
    /// drain within the deadline the residual count is logged and the method
    /// returns anyway.
    pub async fn stop(&self) {
        let sessions = {
            let mut tracker = self.tracker.lock().unwrap();
            if tracker.lifecycle() != Lifecycle::Running {
                tracker.set_lifecycle(Lifecycle::Stopped);
                return;
            }
            tracker.set_lifecycle(Lifecycle::Stopped);
            // dropping the sender unblocks the accept loop
            tracker.take_accept_shutdown();
            tracker.senders()
        };

        // wake every worker; each one removes itself from the tracker as it
        // exits and drops its socket
        for tx in sessions {
            let _ = tx.try_send(());
        }

        let mut count = self.count_rx.clone();
        match tokio::time::timeout(DRAIN_TIMEOUT, count.wait_for(|n| *n == 0)).await {
            Ok(_) => tracing::info!("server stopped"),
            Err(_) => tracing::warn!(
                "server stopped with {} session(s) still draining",
                self.num_connections()
            ),
        };
    }

    /// Number of currently connected clients
    pub fn num_connections(&self) -> usize {
        *self.count_rx.borrow()
    }
}
