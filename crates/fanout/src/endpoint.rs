//! EndpointHandle - one destination's session behind an isolated queue and worker task
//!
//! The worker owns the `BrokerSession` exclusively: it opens it at start,
//! re-opens it lazily after a fault and issues sends one at a time in
//! submission order. Callers only ever talk to it through the queue, so a
//! stalled destination holds up nothing but its own backlog.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, instrument, warn};

use contracts::{
    Ack, BrokerSession, ContractError, DeliveryResult, DestinationConfig, DestinationId,
    FailureReason, SessionState, TransportKind,
};

use crate::metrics::EndpointMetrics;

/// Position of a destination in its `DestinationSet`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointIndex(usize);

impl EndpointIndex {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

/// Immutable description of one destination
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationEndpoint {
    pub id: DestinationId,
    pub address: String,
    pub topic: String,
    pub partition: Option<i32>,
    pub transport: TransportKind,
}

impl DestinationEndpoint {
    pub fn from_config(config: &DestinationConfig) -> Self {
        Self {
            id: config.id(),
            address: config.address.clone(),
            topic: config.topic.clone(),
            partition: config.partition,
            transport: config.transport,
        }
    }
}

/// Worker limits shared by every endpoint of a set
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Bound for each session open (initial and lazy re-open)
    pub connect_timeout: Duration,
    /// Sends allowed to wait in one endpoint's queue
    pub queue_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            queue_capacity: 1024,
        }
    }
}

/// Result of the worker's initial open
pub type OpenSignal = oneshot::Receiver<Result<(), ContractError>>;

struct SendRequest {
    payload: Bytes,
    deadline: Instant,
    reply: oneshot::Sender<DeliveryResult>,
}

/// Handle to a running endpoint worker
pub struct EndpointHandle {
    index: EndpointIndex,
    endpoint: Arc<DestinationEndpoint>,
    tx: mpsc::Sender<SendRequest>,
    state: watch::Receiver<SessionState>,
    metrics: Arc<EndpointMetrics>,
    cancel: oneshot::Sender<()>,
    worker_handle: JoinHandle<Result<(), ContractError>>,
}

impl EndpointHandle {
    /// Spawn the worker; it starts by opening `session`
    ///
    /// The returned signal resolves once the initial open finished (or timed out).
    pub fn spawn<S: BrokerSession + Send + 'static>(
        index: EndpointIndex,
        endpoint: DestinationEndpoint,
        session: S,
        settings: WorkerSettings,
    ) -> (Self, OpenSignal) {
        let endpoint = Arc::new(endpoint);
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (state_tx, state) = watch::channel(SessionState::Closed);
        let (cancel, cancel_rx) = oneshot::channel();
        let (opened_tx, opened_rx) = oneshot::channel();
        let metrics = Arc::new(EndpointMetrics::new());

        let worker = EndpointWorker {
            endpoint: Arc::clone(&endpoint),
            session,
            state: state_tx,
            metrics: Arc::clone(&metrics),
            connect_timeout: settings.connect_timeout,
        };
        let worker_handle = tokio::spawn(worker.run(rx, cancel_rx, opened_tx));

        let handle = Self {
            index,
            endpoint,
            tx,
            state,
            metrics,
            cancel,
            worker_handle,
        };
        (handle, opened_rx)
    }

    pub fn index(&self) -> EndpointIndex {
        self.index
    }

    pub fn id(&self) -> &DestinationId {
        &self.endpoint.id
    }

    pub fn endpoint(&self) -> &DestinationEndpoint {
        &self.endpoint
    }

    pub fn session_state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn metrics(&self) -> &Arc<EndpointMetrics> {
        &self.metrics
    }

    /// Queue one payload and wait for its result, never past `deadline`
    ///
    /// The returned future owns everything it needs, so callers can spawn it.
    pub fn submit(
        &self,
        payload: Bytes,
        deadline: Instant,
    ) -> impl std::future::Future<Output = DeliveryResult> + Send + 'static {
        let tx = self.tx.clone();
        let metrics = Arc::clone(&self.metrics);

        async move {
            let (reply, reply_rx) = oneshot::channel();
            let request = SendRequest {
                payload,
                deadline,
                reply,
            };

            let attempt = async {
                tx.send(request)
                    .await
                    .map_err(|_| FailureReason::WorkerUnavailable)?;
                metrics.set_queue_len(tx.max_capacity() - tx.capacity());
                reply_rx.await.map_err(|_| FailureReason::WorkerUnavailable)
            };

            match timeout_at(deadline, attempt).await {
                Ok(Ok(result)) => result,
                Ok(Err(reason)) => DeliveryResult::Failed { reason },
                Err(_) => DeliveryResult::Failed {
                    reason: FailureReason::Timeout,
                },
            }
        }
    }

    /// Stop accepting sends, drain the queue, then close the session
    ///
    /// Sends still running after `grace` are cancelled and answered with
    /// `Cancelled`. The session is closed either way; its close error, if
    /// any, is returned.
    #[instrument(name = "endpoint_close", skip(self), fields(destination = %self.endpoint.id))]
    pub async fn close(self, grace: Duration) -> Result<(), ContractError> {
        let Self {
            endpoint,
            tx,
            cancel,
            mut worker_handle,
            ..
        } = self;

        drop(tx);
        let joined = match timeout(grace, &mut worker_handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(destination = %endpoint.id, "Grace period elapsed, cancelling in-flight sends");
                let _ = cancel.send(());
                worker_handle.await
            }
        };

        match joined {
            Ok(result) => result,
            Err(e) => {
                error!(destination = %endpoint.id, error = ?e, "Endpoint worker panicked");
                Err(ContractError::Other(format!(
                    "worker for '{}' failed: {e}",
                    endpoint.id
                )))
            }
        }
    }
}

struct EndpointWorker<S> {
    endpoint: Arc<DestinationEndpoint>,
    session: S,
    state: watch::Sender<SessionState>,
    metrics: Arc<EndpointMetrics>,
    connect_timeout: Duration,
}

impl<S: BrokerSession> EndpointWorker<S> {
    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
    }

    async fn open_session(&mut self) -> Result<(), ContractError> {
        let result = match timeout(self.connect_timeout, self.session.open()).await {
            Ok(result) => result,
            Err(_) => Err(ContractError::session_connection(
                self.endpoint.id.as_str(),
                format!("connect timed out after {:?}", self.connect_timeout),
            )),
        };
        self.set_state(if result.is_ok() {
            SessionState::Open
        } else {
            SessionState::Faulted
        });
        result
    }

    /// Re-open a faulted session before sending
    async fn ensure_open(&mut self) -> Result<(), FailureReason> {
        if self.current_state() == SessionState::Open {
            return Ok(());
        }

        // Release whatever the faulted session still holds
        if let Err(e) = self.session.close().await {
            debug!(destination = %self.endpoint.id, error = %e, "Close before reopen failed");
        }

        match self.open_session().await {
            Ok(()) => {
                self.metrics.inc_reconnect_count();
                debug!(destination = %self.endpoint.id, "Session re-opened");
                Ok(())
            }
            Err(e) => Err(FailureReason::Connection(e.to_string())),
        }
    }

    async fn send_once(&mut self, payload: Bytes) -> Result<Ack, FailureReason> {
        self.ensure_open().await?;
        let endpoint = Arc::clone(&self.endpoint);
        self.session
            .send(payload, &endpoint.topic, endpoint.partition)
            .await
            .map_err(|e| {
                if e.is_connection_level() {
                    FailureReason::Connection(e.to_string())
                } else {
                    FailureReason::Send(e.to_string())
                }
            })
    }

    async fn deliver(&mut self, payload: Bytes, deadline: Instant) -> DeliveryResult {
        if Instant::now() >= deadline {
            return DeliveryResult::Failed {
                reason: FailureReason::Timeout,
            };
        }

        let result = match timeout_at(deadline, self.send_once(payload)).await {
            Ok(Ok(ack)) => return DeliveryResult::Delivered(ack),
            Ok(Err(reason)) => DeliveryResult::Failed { reason },
            Err(_) => DeliveryResult::Failed {
                reason: FailureReason::Timeout,
            },
        };

        // Any failed or abandoned send leaves the connection in an unknown state
        self.set_state(SessionState::Faulted);
        result
    }

    #[instrument(
        name = "endpoint_worker_loop",
        skip_all,
        fields(destination = %self.endpoint.id)
    )]
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<SendRequest>,
        mut cancel: oneshot::Receiver<()>,
        opened: oneshot::Sender<Result<(), ContractError>>,
    ) -> Result<(), ContractError> {
        let open_result = self.open_session().await;
        if let Err(e) = &open_result {
            warn!(destination = %self.endpoint.id, error = %e, "Initial open failed");
        }
        let _ = opened.send(open_result);

        loop {
            let request = tokio::select! {
                biased;
                _ = &mut cancel => break,
                request = rx.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };
            self.metrics.set_queue_len(rx.len());

            let SendRequest {
                payload,
                deadline,
                reply,
            } = request;
            let result = tokio::select! {
                biased;
                _ = &mut cancel => {
                    let _ = reply.send(DeliveryResult::Failed {
                        reason: FailureReason::Cancelled,
                    });
                    break;
                }
                result = self.deliver(payload, deadline) => result,
            };

            if let DeliveryResult::Failed { reason } = &result {
                debug!(destination = %self.endpoint.id, %reason, "Send failed");
            }
            // The caller may have given up already
            let _ = reply.send(result);
        }

        // Anything still queued after cancellation never gets sent
        rx.close();
        while let Ok(request) = rx.try_recv() {
            let _ = request.reply.send(DeliveryResult::Failed {
                reason: FailureReason::Cancelled,
            });
        }
        self.metrics.set_queue_len(0);

        let result = match timeout(self.connect_timeout, self.session.close()).await {
            Ok(result) => result,
            Err(_) => Err(ContractError::session_connection(
                self.endpoint.id.as_str(),
                "close timed out",
            )),
        };
        self.set_state(SessionState::Closed);
        debug!(destination = %self.endpoint.id, "Endpoint worker stopped");
        result
    }
}
