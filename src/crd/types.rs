//! Shared types for the WildflyAppServer CRD

use std::collections::BTreeMap;

use schemars::gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use serde::{Deserialize, Serialize};

/// Connection settings for one datasource rendered into the standalone configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceSpec {
    /// Database host name
    pub host_name: String,

    /// Database name on that host
    pub database_name: String,

    /// JNDI name the datasource is bound to
    pub jndi_name: String,

    /// Database user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Database password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A datasource entry in list form, carrying its logical name inline
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamedDataSource {
    /// Logical datasource name
    pub name: String,

    /// Connection settings
    #[serde(flatten)]
    pub spec: DataSourceSpec,
}

/// Datasource configuration in either of the accepted schemas
///
/// Older resources carry a map keyed by logical name, newer ones an ordered
/// list. Both are accepted on the wire and normalized with
/// [`DataSourceConfig::normalized`] before anything else looks at them.
///
/// A structural CRD schema cannot express "map or list", so the field is
/// published with [`data_source_config_schema`] and validated here instead.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum DataSourceConfig {
    /// Map form: logical name -> settings
    Named(BTreeMap<String, DataSourceSpec>),
    /// List form: ordered records with inline names
    Listed(Vec<NamedDataSource>),
}

impl DataSourceConfig {
    /// Normalize both schemas into an ordered list of named datasources
    ///
    /// The map form is ordered by logical name; the list form keeps its order.
    pub fn normalized(&self) -> Vec<NamedDataSource> {
        match self {
            Self::Named(map) => map
                .iter()
                .map(|(name, spec)| NamedDataSource {
                    name: name.clone(),
                    spec: spec.clone(),
                })
                .collect(),
            Self::Listed(list) => list.clone(),
        }
    }

    /// Returns true if no datasource is declared
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Named(map) => map.is_empty(),
            Self::Listed(list) => list.is_empty(),
        }
    }
}

/// CRD schema for the datasource field: an untyped node the API server keeps as is
pub(crate) fn data_source_config_schema(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    schema
        .extensions
        .insert("nullable".to_string(), serde_json::Value::Bool(true));
    Schema::Object(schema)
}

/// Reference to a configuration file held in a ConfigMap
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigSource {
    /// ConfigMap name
    pub config_map_name: String,
    /// Key of the standalone configuration inside the ConfigMap
    pub key: String,
}
