//! WildflyAppServer controller implementation
//!
//! This module implements the reconciliation logic for WildflyAppServer
//! resources. Each pass observes the live children, compares them with the
//! desired state built from the resource, and issues only the writes needed
//! to converge:
//!
//! 1. Generated configuration (ConfigMap + pinned config source), if needed
//! 2. Deployment creation and replica drift
//! 3. Member pod names on the status
//! 4. LoadBalancer Service creation
//! 5. External address discovery
//!
//! Children are never deleted here; owner references let Kubernetes garbage
//! collect them with the resource.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use kube::runtime::controller::Action;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::client::{CreateOutcome, KubeClient, KubeClientImpl};
use crate::config::{AddressDiscovery, OperatorConfig};
use crate::crd::WildflyAppServer;
use crate::resolver::{resolve_external_addresses, ResolverRegistry};
use crate::status;
use crate::template::ConfigRenderer;
use crate::workload;
use crate::Error;

/// Delay before a failed reconcile is retried
const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Controller context for WildflyAppServer reconciliation
///
/// The context is shared across all reconciliation calls and holds
/// resources that are expensive to create (like Kubernetes clients and the
/// loaded configuration template).
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(config)
///     .renderer(renderer)
///     .build();
/// ```
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Renderer for generated standalone configurations
    pub renderer: Arc<ConfigRenderer>,
    /// Operator configuration
    pub config: OperatorConfig,
    /// Running address resolvers
    pub resolvers: ResolverRegistry,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with a custom mock client
    ///
    /// This method is primarily for unit tests where a real Kubernetes
    /// client is not available. For production code, use [`Context::builder`].
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>, config: OperatorConfig) -> Self {
        Self {
            kube,
            renderer: Arc::new(ConfigRenderer::default()),
            config,
            resolvers: ResolverRegistry::new(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    renderer: Option<Arc<ConfigRenderer>>,
    config: OperatorConfig,
    resolvers: Option<ResolverRegistry>,
}

impl ContextBuilder {
    /// Create a new builder with the given Kubernetes client
    fn new(client: Client) -> Self {
        Self {
            client,
            renderer: None,
            config: OperatorConfig::default(),
            resolvers: None,
        }
    }

    /// Set the operator configuration
    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the configuration renderer
    pub fn renderer(mut self, renderer: ConfigRenderer) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Share a resolver registry with other tasks (e.g. the deletion watcher)
    pub fn resolvers(mut self, resolvers: ResolverRegistry) -> Self {
        self.resolvers = Some(resolvers);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: Arc::new(KubeClientImpl::new(self.client)),
            renderer: self.renderer.unwrap_or_default(),
            config: self.config,
            resolvers: self.resolvers.unwrap_or_default(),
        }
    }
}

/// Reconcile a WildflyAppServer resource
///
/// Every write is conditional on observed drift, so reconciling a converged
/// resource issues no writes at all. Creates that race with another actor
/// (409) count as success.
///
/// # Returns
///
/// Returns an `Action` requeueing after the configured resync interval, or an
/// error if any store operation failed.
#[instrument(skip(server, ctx), fields(server = %server.name_any()))]
pub async fn reconcile(server: Arc<WildflyAppServer>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = server.name_any();
    let namespace = server.namespace().ok_or_else(|| {
        Error::missing_field(format!("WildflyAppServer/{name}"), "metadata.namespace")
    })?;

    if server.is_deleting() {
        if ctx.resolvers.cancel(&server.registry_key()) {
            info!("cancelled address resolution for deleted resource");
        }
        return Ok(Action::await_change());
    }

    debug!("reconciling application server");

    let server = ensure_generated_config(server, &ctx, &namespace).await?;

    ensure_deployment(&server, &ctx, &namespace).await?;
    ensure_member_status(&server, &ctx, &namespace).await?;

    let service = workload::build_service(&server);
    if ctx.kube.create_service(&service).await? == CreateOutcome::Created {
        info!(service = %name, "created service");
    }

    if !server.has_external_addresses() {
        trigger_address_discovery(&server, &ctx, &namespace);
    }

    Ok(Action::requeue(ctx.config.resync_interval))
}

/// Error policy for the WildflyAppServer controller
///
/// Failed reconciles are logged and retried after a fixed delay.
pub fn error_policy(server: Arc<WildflyAppServer>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        server = %server.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}

/// Render, create and pin the generated configuration if the resource needs one
///
/// Returns the resource with the pinned source applied so the rest of the
/// pass mounts the new ConfigMap.
async fn ensure_generated_config(
    server: Arc<WildflyAppServer>,
    ctx: &Context,
    namespace: &str,
) -> Result<Arc<WildflyAppServer>, Error> {
    let Some(generated) = workload::build_config_map(&server, &ctx.renderer)? else {
        return Ok(server);
    };

    let name = server.name_any();
    match ctx.kube.create_config_map(&generated.config_map).await? {
        CreateOutcome::Created => info!(config_map = %name, "created configuration"),
        CreateOutcome::AlreadyExists => {
            debug!(config_map = %name, "configuration already exists")
        }
    }

    ctx.kube
        .pin_config_source(namespace, &name, &generated.source)
        .await?;
    info!(
        config_map = %generated.source.config_map_name,
        key = %generated.source.key,
        "pinned configuration source"
    );

    let mut pinned = (*server).clone();
    pinned.spec.pin_config_source(&generated.source);
    Ok(Arc::new(pinned))
}

/// Create the Deployment and correct replica drift
async fn ensure_deployment(
    server: &WildflyAppServer,
    ctx: &Context,
    namespace: &str,
) -> Result<(), Error> {
    let name = server.name_any();
    let deployment = workload::build_deployment(server);
    if ctx.kube.create_deployment(&deployment).await? == CreateOutcome::Created {
        info!(deployment = %name, replicas = server.spec.node_count, "created deployment");
    }

    let live = ctx.kube.get_deployment_replicas(namespace, &name).await?;
    let desired = server.spec.node_count;
    if live != desired {
        info!(deployment = %name, from = live, to = desired, "scaling deployment");
        ctx.kube.scale_deployment(namespace, &name, desired).await?;
    }
    Ok(())
}

/// Record the member pod names if they changed
async fn ensure_member_status(
    server: &WildflyAppServer,
    ctx: &Context,
    namespace: &str,
) -> Result<(), Error> {
    let selector = workload::label_selector(&workload::labels(server));
    let observed = ctx.kube.list_pod_names(namespace, &selector).await?;

    if status::members_changed(server.recorded_nodes(), &observed) {
        info!(members = ?observed, "member list changed");
        ctx.kube
            .patch_member_status(namespace, &server.name_any(), &observed)
            .await?;
    }
    Ok(())
}

fn trigger_address_discovery(server: &WildflyAppServer, ctx: &Context, namespace: &str) {
    match ctx.config.address_discovery {
        AddressDiscovery::Poll => {
            let kube = Arc::clone(&ctx.kube);
            let namespace = namespace.to_string();
            let name = server.name_any();
            let settings = ctx.config.resolver;
            let spawned = ctx.resolvers.spawn_if_absent(&server.registry_key(), |cancel| {
                resolve_external_addresses(kube, namespace, name, settings, cancel)
            });
            if spawned.is_some() {
                debug!("started address resolution");
            }
        }
        AddressDiscovery::Watch => {
            debug!("waiting for service ingress");
        }
    }
}

/// Cancel in-flight address resolution when a resource is deleted
///
/// Returns true if the event cancelled a running resolver.
pub fn handle_app_server_event(
    event: &Event<WildflyAppServer>,
    resolvers: &ResolverRegistry,
) -> bool {
    match event {
        Event::Delete(server) => {
            let cancelled = resolvers.cancel(&server.registry_key());
            if cancelled {
                info!(
                    server = %server.name_any(),
                    "resource deleted, cancelled address resolution"
                );
            }
            cancelled
        }
        Event::Apply(_) | Event::InitApply(_) | Event::Init | Event::InitDone => false,
    }
}

/// Run the deletion watcher until the event stream ends
///
/// Watch errors back off before the stream is polled again.
pub async fn watch_deletions<S>(events: S, resolvers: ResolverRegistry)
where
    S: Stream<Item = Result<Event<WildflyAppServer>, watcher::Error>>,
{
    let mut events = std::pin::pin!(events.default_backoff());
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                handle_app_server_event(&event, &resolvers);
            }
            Err(e) => {
                warn!(error = %e, "application server watcher error, will retry");
            }
        }
    }
}
