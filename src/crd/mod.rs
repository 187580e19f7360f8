//! Custom Resource Definitions for the WildFly operator

mod app_server;
mod types;

pub use app_server::{WildflyAppServer, WildflyAppServerSpec, WildflyAppServerStatus};
pub use types::{ConfigSource, DataSourceConfig, DataSourceSpec, NamedDataSource};
