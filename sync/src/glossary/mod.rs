use serde::Deserialize;

use crate::error::ClientError;

pub mod openmetadata;

pub use openmetadata::OpenMetadataClient;

/// Result of looking something up in a remote service.
///
/// `NotFound` is a normal state, not a failure: it means nobody has
/// documented the term yet.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Error(ClientError),
}

impl<T> Lookup<T> {
    pub fn from_result(result: Result<T, ClientError>) -> Self {
        match result {
            Ok(value) => Lookup::Found(value),
            Err(e) if e.is_not_found() => Lookup::NotFound,
            Err(e) => Lookup::Error(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GlossaryTerm {
    #[serde(rename = "fullyQualifiedName", default)]
    pub qualified_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl GlossaryTerm {
    /// The description, if the term carries a non-blank one.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref().filter(|d| !d.trim().is_empty())
    }
}

/// `<dictionary>.<table>`
pub fn table_term_name(dictionary: &str, table: &str) -> String {
    format!("{dictionary}.{table}")
}

/// `<dictionary>.<table>.<column>`
pub fn column_term_name(dictionary: &str, table: &str, column: &str) -> String {
    format!("{dictionary}.{table}.{column}")
}

#[async_trait::async_trait]
pub trait GlossaryApi: Send + Sync {
    async fn get_term(&self, qualified_name: &str) -> Lookup<GlossaryTerm>;
}
