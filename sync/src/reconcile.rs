//! Schema drift between the reporting database and the catalog.
//!
//! The reporting database is the source of truth: tables that exist only in
//! the catalog are never reported. Both inventories are read in separate round
//! trips with no snapshot isolation, so a schema change landing between the
//! two reads shows up on the next run rather than this one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use crate::catalog::CatalogApi;
use crate::error::SyncError;
use crate::inventory::ReportingInventory;

/// Column differences for one table present on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnDrift {
    /// In the reporting database, missing from the catalog.
    pub new_columns: BTreeSet<String>,
    /// In the catalog, gone from the reporting database.
    pub deleted_columns: BTreeSet<String>,
}

impl ColumnDrift {
    pub fn is_empty(&self) -> bool {
        self.new_columns.is_empty() && self.deleted_columns.is_empty()
    }
}

/// Everything one reconciliation run found. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub new_tables: BTreeSet<String>,
    pub per_table: BTreeMap<String, ColumnDrift>,
}

impl ReconciliationResult {
    pub fn has_drift(&self) -> bool {
        !self.new_tables.is_empty() || self.per_table.values().any(|d| !d.is_empty())
    }
}

/// Tables in `reporting` but not in `catalog`, minus `exclusions`.
pub fn compute_new_tables(
    reporting: &BTreeSet<String>,
    catalog: &BTreeSet<String>,
    exclusions: &BTreeSet<String>,
) -> BTreeSet<String> {
    reporting
        .iter()
        .filter(|t| !catalog.contains(*t) && !exclusions.contains(*t))
        .cloned()
        .collect()
}

pub fn compute_column_drift(
    table: &str,
    reporting: &BTreeSet<String>,
    catalog: &BTreeSet<String>,
) -> ColumnDrift {
    let drift = ColumnDrift {
        new_columns: reporting.difference(catalog).cloned().collect(),
        deleted_columns: catalog.difference(reporting).cloned().collect(),
    };
    if !drift.is_empty() {
        tracing::debug!(
            table = %table,
            new = drift.new_columns.len(),
            deleted = drift.deleted_columns.len(),
            "Column drift"
        );
    }
    drift
}

/// Reads both inventories and computes drift.
pub struct Reconciler {
    reporting: Arc<dyn ReportingInventory>,
    catalog: Arc<dyn CatalogApi>,
    schema: String,
    exclusions: BTreeSet<String>,
}

impl Reconciler {
    pub fn new(
        reporting: Arc<dyn ReportingInventory>,
        catalog: Arc<dyn CatalogApi>,
        schema: impl Into<String>,
        exclusions: BTreeSet<String>,
    ) -> Self {
        Self {
            reporting,
            catalog,
            schema: schema.into(),
            exclusions,
        }
    }

    /// Reporting tables with no catalog dataset yet.
    pub async fn new_tables(&self) -> Result<BTreeSet<String>, SyncError> {
        let reporting = self.reporting.list_table_names(&self.schema).await?;
        let catalog = self.catalog.list_dataset_names().await?;
        let new_tables = compute_new_tables(&reporting, &catalog, &self.exclusions);
        tracing::info!(count = new_tables.len(), "Found new datasets");
        Ok(new_tables)
    }

    /// Full run: new tables plus column drift for every table on both sides.
    ///
    /// Failing to read the reporting database or to list the catalog aborts
    /// the run. A catalog dataset whose columns cannot be read is left out of
    /// the column comparison, and so is any table already reported as new.
    pub async fn reconcile(&self) -> Result<ReconciliationResult, SyncError> {
        let reporting_tables = self.reporting.list_table_names(&self.schema).await?;
        let catalog_names = self.catalog.list_dataset_names().await?;
        let new_tables = compute_new_tables(&reporting_tables, &catalog_names, &self.exclusions);

        let catalog_columns = self.catalog_columns().await?;

        let shared: Vec<String> = reporting_tables
            .iter()
            .filter(|t| catalog_columns.contains_key(*t) && !new_tables.contains(*t))
            .cloned()
            .collect();
        let reporting_columns = self.reporting.column_inventory(&self.schema, &shared).await?;

        let mut per_table = BTreeMap::new();
        for table in shared {
            let Some(catalog_cols) = catalog_columns.get(&table) else {
                continue;
            };
            let reporting_cols = reporting_columns.get(&table).cloned().unwrap_or_default();
            let drift = compute_column_drift(&table, &reporting_cols, catalog_cols);
            per_table.insert(table, drift);
        }

        tracing::info!(
            new_tables = new_tables.len(),
            compared_tables = per_table.len(),
            "Reconciliation complete"
        );
        Ok(ReconciliationResult {
            new_tables,
            per_table,
        })
    }

    async fn catalog_columns(&self) -> Result<BTreeMap<String, BTreeSet<String>>, SyncError> {
        let ids = self.catalog.list_dataset_ids().await?;
        let mut columns = BTreeMap::new();

        for id in ids {
            if !id.is_valid() {
                tracing::debug!(dataset_id = %id, "Skipping invalid dataset id");
                continue;
            }
            match self.catalog.get_dataset(id).await {
                Ok(dataset) => {
                    let names = dataset.column_names();
                    columns.insert(dataset.table_name, names);
                }
                Err(e) if e.is_login_failure() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(dataset_id = %id, error = %e, "Could not read dataset columns; skipping");
                }
            }
        }
        Ok(columns)
    }
}
