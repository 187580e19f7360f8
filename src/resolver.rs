//! External address resolution
//!
//! A LoadBalancer Service gets its ingress address some time after creation.
//! The resolver polls the Service a bounded number of times and publishes the
//! application and management endpoints on the WildflyAppServer status once.
//!
//! ```text
//! Waiting{0} --poll: no ingress--> Waiting{1} --> ... --> Exhausted
//!     |                                |
//!     +--poll: ingress--> Found -------+--> commit (only if still empty)
//!     |
//!     +--cancel--> Cancelled
//! ```
//!
//! At most one resolver runs per resource; [`ResolverRegistry`] enforces it
//! and lets a resource delete cancel the running one.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Service;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::KubeClient;
use crate::status::should_publish_addresses;
use crate::Result;

/// Polling bounds for one resolver run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Maximum number of polls
    pub attempts: u32,
    /// Time between polls
    pub interval: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval: Duration::from_secs(10),
        }
    }
}

/// State of a resolver run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolverState {
    /// Polling; `attempt` polls have come back without an address
    Waiting {
        /// Polls made so far
        attempt: u32,
    },
    /// An ingress address was observed
    Found(BTreeMap<String, String>),
    /// Every poll came back without an address
    Exhausted,
    /// The run was cancelled before an address was found
    Cancelled,
}

impl ResolverState {
    /// Feed the outcome of one poll into the state machine
    pub fn advance(self, observed: Option<String>, max_attempts: u32) -> Self {
        match self {
            Self::Waiting { attempt } => match observed {
                Some(host) => Self::Found(external_addresses(&host)),
                None if attempt + 1 >= max_attempts => Self::Exhausted,
                None => Self::Waiting {
                    attempt: attempt + 1,
                },
            },
            terminal => terminal,
        }
    }

    /// Returns true once the run has stopped polling
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting { .. })
    }
}

/// First ingress address of a LoadBalancer Service, hostname preferred over IP
pub fn extract_address(service: &Service) -> Option<String> {
    let ingress = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;

    ingress
        .hostname
        .as_ref()
        .filter(|h| !h.is_empty())
        .or_else(|| ingress.ip.as_ref().filter(|ip| !ip.is_empty()))
        .cloned()
}

/// Role addresses published for an ingress host
pub fn external_addresses(host: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            crate::APPLICATION_ROLE.to_string(),
            format!("{host}:{}", crate::APPLICATION_HTTP_PORT),
        ),
        (
            crate::MANAGEMENT_ROLE.to_string(),
            format!("{host}:{}", crate::MANAGEMENT_HTTP_PORT),
        ),
    ])
}

/// Poll the Service `namespace/name` until it has an ingress address
///
/// Exhaustion is not an error: it is logged and reported as
/// [`ResolverState::Exhausted`]. Addresses are only written if the resource
/// still has none when the address is found.
pub async fn resolve_external_addresses(
    kube: Arc<dyn KubeClient>,
    namespace: String,
    name: String,
    settings: ResolverSettings,
    cancel: CancellationToken,
) -> Result<ResolverState> {
    let mut interval = tokio::time::interval(settings.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = if settings.attempts == 0 {
        ResolverState::Exhausted
    } else {
        ResolverState::Waiting { attempt: 0 }
    };

    while !state.is_terminal() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state = ResolverState::Cancelled;
            }
            _ = interval.tick() => {
                let observed = match kube.get_service(&namespace, &name).await {
                    Ok(service) => service.as_ref().and_then(extract_address),
                    Err(e) => {
                        warn!(service = %name, error = %e, "failed to read service");
                        None
                    }
                };
                state = state.advance(observed, settings.attempts);
                if let ResolverState::Waiting { attempt } = state {
                    debug!(service = %name, attempt, "no ingress address yet");
                }
            }
        }
    }

    match &state {
        ResolverState::Found(addresses) => {
            commit_addresses(kube.as_ref(), &namespace, &name, addresses).await?;
        }
        ResolverState::Exhausted => {
            warn!(
                service = %name,
                attempts = settings.attempts,
                "no ingress address observed, giving up"
            );
        }
        ResolverState::Cancelled => {
            debug!(service = %name, "address resolution cancelled");
        }
        ResolverState::Waiting { .. } => {}
    }
    Ok(state)
}

/// Publish addresses unless the resource already carries some
async fn commit_addresses(
    kube: &dyn KubeClient,
    namespace: &str,
    name: &str,
    addresses: &BTreeMap<String, String>,
) -> Result<()> {
    let Some(server) = kube.get_app_server(namespace, name).await? else {
        debug!(server = %name, "resource gone before addresses were published");
        return Ok(());
    };
    if !should_publish_addresses(server.recorded_addresses(), addresses) {
        debug!(server = %name, "external addresses already published");
        return Ok(());
    }
    kube.patch_external_addresses(namespace, name, addresses)
        .await?;
    info!(server = %name, ?addresses, "published external addresses");
    Ok(())
}

struct RunningResolver {
    id: u64,
    cancel: CancellationToken,
}

/// Registry of running resolvers keyed by `namespace/name`
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    running: Arc<DashMap<String, RunningResolver>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("running", &self.running.len())
            .finish()
    }
}

impl ResolverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a resolver for `key` unless one is already running
    ///
    /// `start` receives the cancellation token of the new run. The entry is
    /// removed when the run ends. Returns `None` if a resolver was already
    /// running.
    pub fn spawn_if_absent<F, Fut>(&self, key: &str, start: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<ResolverState>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = match self.running.entry(key.to_string()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                slot.insert(RunningResolver {
                    id,
                    cancel: cancel.clone(),
                });
                cancel
            }
        };

        let run = start(cancel);
        let running = Arc::clone(&self.running);
        let key = key.to_string();
        Some(tokio::spawn(async move {
            match run.await {
                Ok(state) => debug!(resolver = %key, ?state, "resolver finished"),
                Err(e) => warn!(resolver = %key, error = %e, "resolver failed"),
            }
            running.remove_if(&key, |_, entry| entry.id == id);
        }))
    }

    /// Cancel the resolver for `key`; returns true if one was running
    pub fn cancel(&self, key: &str) -> bool {
        match self.running.remove(key) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns true if a resolver is running for `key`
    pub fn is_running(&self, key: &str) -> bool {
        self.running.contains_key(key)
    }

    /// Number of running resolvers
    pub fn len(&self) -> usize {
        self.running.len()
    }

    /// Returns true if no resolver is running
    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }
}
