use std::collections::{BTreeMap, BTreeSet};

use crate::error::InventoryError;

pub mod postgres;

pub use postgres::PostgresInventory;

/// Table name → column names.
pub type ColumnInventory = BTreeMap<String, BTreeSet<String>>;

/// Read access to the reporting database's schema.
#[async_trait::async_trait]
pub trait ReportingInventory: Send + Sync {
    async fn list_table_names(&self, schema: &str) -> Result<BTreeSet<String>, InventoryError>;

    async fn list_column_names(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<BTreeSet<String>, InventoryError>;

    /// Column names for each of `tables`. Every requested table gets an entry.
    async fn column_inventory(
        &self,
        schema: &str,
        tables: &[String],
    ) -> Result<ColumnInventory, InventoryError> {
        let mut inventory = ColumnInventory::new();
        for table in tables {
            let columns = self.list_column_names(schema, table).await?;
            inventory.insert(table.clone(), columns);
        }
        Ok(inventory)
    }
}
