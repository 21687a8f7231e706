use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{CatalogApi, NewDataset};
use crate::error::SyncError;

/// Where and to whom new datasets are registered.
#[derive(Debug, Clone)]
pub struct DatasetTemplate {
    pub database_id: i64,
    pub schema: String,
    pub owner_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Created { table: String },
    Failed { table: String, message: String },
}

/// Creates catalog datasets for reporting tables.
///
/// Not idempotent: callers pass only tables confirmed absent from the catalog
/// moments before.
pub struct Registrar {
    catalog: Arc<dyn CatalogApi>,
    template: DatasetTemplate,
}

impl Registrar {
    pub fn new(catalog: Arc<dyn CatalogApi>, template: DatasetTemplate) -> Self {
        Self { catalog, template }
    }

    fn request_for(&self, table: &str) -> NewDataset {
        NewDataset {
            database: self.template.database_id,
            schema: self.template.schema.clone(),
            table_name: table.to_string(),
            is_managed_externally: true,
            owners: vec![self.template.owner_id],
        }
    }

    /// Only a login failure is returned as an error.
    pub async fn register(&self, table: &str) -> Result<RegistrationOutcome, SyncError> {
        match self.catalog.create_dataset(&self.request_for(table)).await {
            Ok(()) => {
                tracing::info!(table = %table, "Created dataset");
                Ok(RegistrationOutcome::Created {
                    table: table.to_string(),
                })
            }
            Err(e) if e.is_login_failure() => Err(e.into()),
            Err(e) => {
                tracing::error!(table = %table, error = %e, "Failed to add dataset");
                Ok(RegistrationOutcome::Failed {
                    table: table.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}
