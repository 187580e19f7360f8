//! Standalone configuration rendering
//!
//! Renders the WildFly standalone configuration for resources that declare
//! datasources but no ConfigMap of their own. Templates use minijinja syntax
//! and see the following variables:
//!
//! - `name` - name of the WildflyAppServer
//! - `datasources` - list of `{name, host_name, database_name, jndi_name, user, password}`
//! - `application_port`, `management_port`, `jgroups_tcp_port`, `jgroups_tcp_fd_port`
//!
//! Undefined variables are errors, so a template typo fails the reconcile
//! instead of producing a half-rendered document.

use std::path::Path;

use minijinja::{context, Environment, UndefinedBehavior};
use serde::Serialize;

use crate::crd::NamedDataSource;
use crate::{Error, Result};

/// Template shipped with the operator, used when no template file is configured
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/standalone.xml.j2");

/// Datasource as seen by the template
#[derive(Debug, Serialize)]
struct DataSourceContext<'a> {
    name: &'a str,
    host_name: &'a str,
    database_name: &'a str,
    jndi_name: &'a str,
    user: Option<&'a str>,
    password: Option<&'a str>,
}

impl<'a> From<&'a NamedDataSource> for DataSourceContext<'a> {
    fn from(ds: &'a NamedDataSource) -> Self {
        Self {
            name: &ds.name,
            host_name: &ds.spec.host_name,
            database_name: &ds.spec.database_name,
            jndi_name: &ds.spec.jndi_name,
            user: ds.spec.user.as_deref(),
            password: ds.spec.password.as_deref(),
        }
    }
}

/// Renders standalone configuration documents from a loaded template
pub struct ConfigRenderer {
    env: Environment<'static>,
    source: String,
}

impl std::fmt::Debug for ConfigRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRenderer")
            .field("template_len", &self.source.len())
            .finish()
    }
}

impl Default for ConfigRenderer {
    fn default() -> Self {
        Self::from_source(DEFAULT_TEMPLATE)
    }
}

impl ConfigRenderer {
    /// Create a renderer from template source text
    pub fn from_source(source: impl Into<String>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self {
            env,
            source: source.into(),
        }
    }

    /// Load the template from a file, or fall back to the embedded one
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!(
                        "failed to read config template {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(Self::from_source(source))
            }
            None => Ok(Self::default()),
        }
    }

    /// Render the standalone configuration for `name` with the given datasources
    pub fn render(&self, name: &str, datasources: &[NamedDataSource]) -> Result<String> {
        let datasources: Vec<DataSourceContext<'_>> =
            datasources.iter().map(DataSourceContext::from).collect();

        let ctx = context! {
            name => name,
            datasources => datasources,
            application_port => crate::APPLICATION_HTTP_PORT,
            management_port => crate::MANAGEMENT_HTTP_PORT,
            jgroups_tcp_port => crate::JGROUPS_TCP_PORT,
            jgroups_tcp_fd_port => crate::JGROUPS_TCP_FD_PORT,
        };

        let rendered = self
            .env
            .render_str(&self.source, ctx)
            .map_err(|e| Error::template(e.to_string()))?;

        if rendered.trim().is_empty() {
            return Err(Error::template(format!(
                "configuration for {name} rendered to an empty document"
            )));
        }

        Ok(rendered)
    }
}
