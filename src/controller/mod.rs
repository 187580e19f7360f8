//! Controller implementations for the WildflyAppServer CRD
//!
//! This module contains the reconciliation logic for WildflyAppServer
//! resources and, in watch discovery mode, for the Services they own.
//! Controllers follow the Kubernetes controller pattern with observe-diff-act
//! loops.

mod app_server;
mod client;
mod service;

pub use app_server::{
    error_policy, handle_app_server_event, reconcile, watch_deletions, Context, ContextBuilder,
};
#[cfg(test)]
pub use client::MockKubeClient;
pub use client::{CreateOutcome, KubeClient, KubeClientImpl};
pub use service::{owning_app_server, reconcile_service, service_error_policy};
