//! Service controller for watch-mode address discovery
//!
//! Instead of polling, the operator can react to status updates of the
//! LoadBalancer Services it created. Each Service event is traced back to its
//! owning WildflyAppServer, and the ingress address is published once.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument};

use super::app_server::Context;
use crate::crd::WildflyAppServer;
use crate::resolver::{external_addresses, extract_address};
use crate::status::should_publish_addresses;
use crate::Error;

/// Name of the WildflyAppServer controlling `service`, if any
pub fn owning_app_server(service: &Service) -> Option<String> {
    let kind = WildflyAppServer::kind(&());
    let api_version = WildflyAppServer::api_version(&());
    service
        .owner_references()
        .iter()
        .find(|owner| owner.kind == kind && owner.api_version == api_version)
        .map(|owner| owner.name.clone())
}

/// Reconcile a Service owned by a WildflyAppServer
///
/// Publishes the ingress address of the Service on the owner's status if the
/// owner has no addresses yet. Services without such an owner are ignored.
#[instrument(skip(service, ctx), fields(service = %service.name_any()))]
pub async fn reconcile_service(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, Error> {
    let Some(owner) = owning_app_server(&service) else {
        debug!("service has no WildflyAppServer owner");
        return Ok(Action::await_change());
    };
    let namespace = service.namespace().ok_or_else(|| {
        Error::missing_field(format!("Service/{}", service.name_any()), "metadata.namespace")
    })?;

    let Some(server) = ctx.kube.get_app_server(&namespace, &owner).await? else {
        debug!(server = %owner, "owner no longer exists");
        return Ok(Action::await_change());
    };
    let Some(host) = extract_address(&service) else {
        debug!("load balancer has no ingress address yet");
        return Ok(Action::await_change());
    };

    let addresses = external_addresses(&host);
    if !should_publish_addresses(server.recorded_addresses(), &addresses) {
        return Ok(Action::await_change());
    }
    ctx.kube
        .patch_external_addresses(&namespace, &owner, &addresses)
        .await?;
    info!(server = %owner, ?addresses, "published external addresses");
    Ok(Action::await_change())
}

/// Error policy for the Service controller
pub fn service_error_policy(service: Arc<Service>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        service = %service.name_any(),
        "service reconciliation failed"
    );
    Action::requeue(Duration::from_secs(5))
}
