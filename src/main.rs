//! WildFly Operator - runs and scales clustered WildFly application servers

use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Patch, PatchParams};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};

use wildfly_operator::config::{AddressDiscovery, ControllerArgs, OperatorConfig};
use wildfly_operator::controller::{
    error_policy, reconcile, reconcile_service, service_error_policy, watch_deletions, Context,
};
use wildfly_operator::crd::WildflyAppServer;
use wildfly_operator::resolver::ResolverRegistry;
use wildfly_operator::telemetry::init_telemetry;
use wildfly_operator::template::ConfigRenderer;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
const WATCH_TIMEOUT_SECS: u32 = 25;

/// WildFly Operator - keeps WildflyAppServer resources converged
#[derive(Parser, Debug)]
#[command(name = "wildfly-operator", version, about, long_about = None)]
struct Cli {
    /// Print the WildflyAppServer CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches WildflyAppServer resources and keeps their Deployment,
    /// Service and generated configuration converged.
    Controller(ControllerArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&WildflyAppServer::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => ControllerArgs::from_env().map_err(|e| anyhow::anyhow!("{}", e))?,
    };

    init_telemetry(args.log_format).map_err(|e| anyhow::anyhow!("{}", e))?;
    log_version();

    run_controller(args).await
}

/// Log the build and runtime versions on startup
fn log_version() {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "WildFly operator starting"
    );
}

/// Ensure the WildflyAppServer CRD is installed
///
/// The operator installs its own CRD on startup using server-side apply.
/// This ensures the CRD version always matches the operator version.
async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(wildfly_operator::FIELD_MANAGER).force();

    tracing::info!("Installing WildflyAppServer CRD...");
    crds.patch(
        "wildflyappservers.wildfly.banzaicloud.com",
        &params,
        &Patch::Apply(&WildflyAppServer::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install WildflyAppServer CRD: {}", e))?;

    tracing::info!("WildflyAppServer CRD installed/updated");
    Ok(())
}

fn scoped_api<K>(client: &Client, config: &OperatorConfig) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match &config.namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Run the WildflyAppServer controller and its companions until shutdown
async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let skip_crd_install = args.skip_crd_install;
    let config = args
        .into_config()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    let renderer = ConfigRenderer::load(config.config_template.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration template: {}", e))?;

    tracing::info!(
        namespace = config.namespace.as_deref().unwrap_or("<all>"),
        address_discovery = %config.address_discovery,
        "WildFly controller starting..."
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crds_installed(&client).await?;
    }

    let resolvers = ResolverRegistry::new();
    let ctx = Arc::new(
        Context::builder(client.clone())
            .config(config.clone())
            .renderer(renderer)
            .resolvers(resolvers.clone())
            .build(),
    );

    let servers: Api<WildflyAppServer> = scoped_api(&client, &config);
    let deployments: Api<Deployment> = scoped_api(&client, &config);
    let services: Api<Service> = scoped_api(&client, &config);
    let watcher_config = WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    tracing::info!("- WildflyAppServer controller");
    let app_server_controller = Controller::new(servers.clone(), watcher_config.clone())
        .owns(deployments, watcher_config.clone())
        .owns(services.clone(), watcher_config.clone())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(log_reconcile_result("WildflyAppServer"));

    tracing::info!("- deletion watcher");
    let deletions = watch_deletions(
        watcher::watcher(servers, watcher_config.clone()),
        resolvers,
    );

    match config.address_discovery {
        AddressDiscovery::Watch => {
            tracing::info!("- Service controller");
            let service_controller = Controller::new(
                services,
                watcher_config.labels(wildfly_operator::APP_NAME_LABEL),
            )
            .shutdown_on_signal()
            .run(reconcile_service, service_error_policy, ctx)
            .for_each(log_reconcile_result("Service"));

            tokio::select! {
                _ = app_server_controller => {}
                _ = service_controller => {}
                _ = deletions => {}
            }
        }
        AddressDiscovery::Poll => {
            tokio::select! {
                _ = app_server_controller => {}
                _ = deletions => {}
            }
        }
    }

    tracing::info!("WildFly controller shutting down");
    Ok(())
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
