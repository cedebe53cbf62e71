//! DestinationSet - the fixed collection of destination endpoints
//!
//! Built once from configuration, opened together, closed together. The set
//! never changes after `open`; endpoint order is configuration order.

use std::collections::HashSet;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use contracts::{
    BrokerSession, DestinationConfig, DestinationId, OpenPolicy, SinkBlueprint, TransportKind,
};

use crate::endpoint::{
    DestinationEndpoint, EndpointHandle, EndpointIndex, OpenSignal, WorkerSettings,
};
use crate::error::FanoutError;
use crate::sessions::{LogSession, TcpSession};

type Starter = Box<dyn FnOnce(EndpointIndex, WorkerSettings) -> (EndpointHandle, OpenSignal) + Send>;

/// Builder for a DestinationSet
pub struct DestinationSetBuilder {
    settings: WorkerSettings,
    open_policy: OpenPolicy,
    pending: Vec<(DestinationEndpoint, Starter)>,
}

impl DestinationSetBuilder {
    pub fn new(settings: WorkerSettings, open_policy: OpenPolicy) -> Self {
        Self {
            settings,
            open_policy,
            pending: Vec::new(),
        }
    }

    /// Builder with every destination of a validated blueprint
    pub fn from_blueprint(blueprint: &SinkBlueprint) -> Self {
        let settings = WorkerSettings {
            connect_timeout: blueprint.sink.connect_timeout(),
            queue_capacity: blueprint.sink.queue_capacity,
        };
        blueprint
            .resolved_destinations()
            .iter()
            .fold(Self::new(settings, blueprint.sink.open_policy), |builder, dest| {
                builder.destination(dest)
            })
    }

    /// Add a destination using the session its transport calls for
    pub fn destination(self, config: &DestinationConfig) -> Self {
        match config.transport {
            TransportKind::Tcp => {
                let session = TcpSession::new(&config.address);
                self.session(config, session)
            }
            TransportKind::Log => {
                let session = LogSession::new(&config.address);
                self.session(config, session)
            }
        }
    }

    /// Add a destination backed by a caller-supplied session
    pub fn session<S: BrokerSession + Send + 'static>(
        mut self,
        config: &DestinationConfig,
        session: S,
    ) -> Self {
        let endpoint = DestinationEndpoint::from_config(config);
        let spawned = endpoint.clone();
        let starter: Starter = Box::new(move |index, settings| {
            EndpointHandle::spawn(index, spawned, session, settings)
        });
        self.pending.push((endpoint, starter));
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Spawn every endpoint and wait for their initial opens
    ///
    /// Opens run concurrently. Endpoints that fail to open stay in the set
    /// and are reported by [`DestinationSet::unreachable`]. With
    /// `OpenPolicy::RequireReachable`, zero reachable endpoints is an error.
    #[instrument(
        name = "destination_set_open",
        skip(self),
        fields(destinations = self.pending.len(), policy = ?self.open_policy)
    )]
    pub async fn open(self) -> Result<DestinationSet, FanoutError> {
        if self.pending.is_empty() {
            return Err(FanoutError::config("at least one destination is required"));
        }

        let mut seen = HashSet::new();
        for (endpoint, _) in &self.pending {
            if !seen.insert(endpoint.id.clone()) {
                return Err(FanoutError::config(format!(
                    "duplicate destination '{}'",
                    endpoint.id
                )));
            }
        }

        let (handles, signals): (Vec<_>, Vec<_>) = self
            .pending
            .into_iter()
            .enumerate()
            .map(|(i, (_, start))| start(EndpointIndex::new(i), self.settings))
            .unzip();

        // Workers open in parallel; collecting in order only waits for the slowest
        let mut unreachable = Vec::new();
        for (handle, signal) in handles.iter().zip(signals) {
            let failure = match signal.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("endpoint worker exited during open".to_string()),
            };
            match failure {
                None => info!(destination = %handle.id(), "Destination opened"),
                Some(message) => {
                    warn!(destination = %handle.id(), error = %message, "Destination unreachable at start");
                    unreachable.push(FanoutError::Connection {
                        destination: handle.id().clone(),
                        message,
                    });
                }
            }
        }

        let set = DestinationSet {
            handles,
            unreachable,
        };

        if set.unreachable.len() == set.len() {
            match self.open_policy {
                OpenPolicy::RequireReachable => {
                    let attempted = set.len();
                    error!(attempted, "No destination reachable, aborting start");
                    set.close(Duration::ZERO).await;
                    return Err(FanoutError::NoReachableDestinations { attempted });
                }
                OpenPolicy::BestEffort => {
                    warn!("No destination reachable, starting anyway");
                }
            }
        }

        info!(
            open = set.len() - set.unreachable.len(),
            unreachable = set.unreachable.len(),
            "Destination set ready"
        );
        Ok(set)
    }
}

/// Summary of `DestinationSet::close`
#[derive(Debug, Default)]
pub struct CloseReport {
    /// Destinations whose session closed cleanly
    pub closed: Vec<DestinationId>,
    /// Destinations whose close failed, with the error
    pub failed: Vec<(DestinationId, String)>,
}

impl CloseReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The opened collection of destination endpoints
pub struct DestinationSet {
    handles: Vec<EndpointHandle>,
    unreachable: Vec<FanoutError>,
}

impl DestinationSet {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Endpoints in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &EndpointHandle> {
        self.handles.iter()
    }

    pub fn get(&self, index: EndpointIndex) -> Option<&EndpointHandle> {
        self.handles.get(index.get())
    }

    pub fn find(&self, id: &str) -> Option<&EndpointHandle> {
        self.handles.iter().find(|h| h.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &DestinationId> {
        self.handles.iter().map(EndpointHandle::id)
    }

    /// Open failures from start (`FanoutError::Connection` per endpoint)
    pub fn unreachable(&self) -> &[FanoutError] {
        &self.unreachable
    }

    /// Indices of endpoints that failed their initial open
    pub fn unreachable_indices(&self) -> Vec<EndpointIndex> {
        self.unreachable
            .iter()
            .filter_map(|e| match e {
                FanoutError::Connection { destination, .. } => self.find(destination.as_str()),
                _ => None,
            })
            .map(EndpointHandle::index)
            .collect()
    }

    /// Close every endpoint concurrently
    ///
    /// Each endpoint gets `grace` to finish in-flight sends. A failure to
    /// close one destination never stops the others from closing.
    #[instrument(name = "destination_set_close", skip(self), fields(destinations = self.handles.len()))]
    pub async fn close(self, grace: Duration) -> CloseReport {
        let mut closing = JoinSet::new();
        for handle in self.handles {
            let id = handle.id().clone();
            closing.spawn(async move { (id, handle.close(grace).await) });
        }

        let mut report = CloseReport::default();
        while let Some(joined) = closing.join_next().await {
            match joined {
                Ok((id, Ok(()))) => report.closed.push(id),
                Ok((id, Err(e))) => {
                    warn!(destination = %id, error = %e, "Destination close failed");
                    report.failed.push((id, e.to_string()));
                }
                Err(e) => error!(error = ?e, "Close task panicked"),
            }
        }

        info!(
            closed = report.closed.len(),
            failed = report.failed.len(),
            "Destination set closed"
        );
        report
    }
}
