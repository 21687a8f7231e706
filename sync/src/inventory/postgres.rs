use std::collections::BTreeSet;

use tokio_postgres::NoTls;

use super::{ColumnInventory, ReportingInventory};
use crate::config::ReportingConfig;
use crate::error::InventoryError;

pub struct PostgresInventory {
    cfg: ReportingConfig,
}

impl PostgresInventory {
    pub fn new(cfg: ReportingConfig) -> Self {
        Self { cfg }
    }

    fn conn_str(&self) -> String {
        let ssl_mode = match self.cfg.ssl_mode.as_str() {
            "disable" => "disable",
            _ => "prefer",
        };

        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=30",
            self.cfg.host,
            self.cfg.port,
            self.cfg.database,
            self.cfg.username,
            self.cfg.password,
            ssl_mode,
        )
    }

    /// One connection per public call; nothing is held between calls.
    async fn connect(&self) -> Result<tokio_postgres::Client, InventoryError> {
        let (client, connection) = tokio_postgres::connect(&self.conn_str(), NoTls)
            .await
            .map_err(|e| InventoryError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Reporting database connection error: {e}");
            }
        });

        // Set statement timeout to avoid hanging on slow catalogs
        client
            .execute("SET statement_timeout = '60s'", &[])
            .await
            .map_err(|e| InventoryError::Query(e.to_string()))?;

        Ok(client)
    }
}

#[async_trait::async_trait]
impl ReportingInventory for PostgresInventory {
    async fn list_table_names(&self, schema: &str) -> Result<BTreeSet<String>, InventoryError> {
        let client = self.connect().await?;

        let rows = client
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'",
                &[&schema],
            )
            .await
            .map_err(|e| InventoryError::Query(e.to_string()))?;

        let tables: BTreeSet<String> = rows.into_iter().map(|row| row.get(0)).collect();
        tracing::info!(schema = %schema, count = tables.len(), "Fetched tables from reporting database");
        Ok(tables)
    }

    async fn list_column_names(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<BTreeSet<String>, InventoryError> {
        let client = self.connect().await?;

        let rows = client
            .query(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2",
                &[&schema, &table],
            )
            .await
            .map_err(|e| InventoryError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn column_inventory(
        &self,
        schema: &str,
        tables: &[String],
    ) -> Result<ColumnInventory, InventoryError> {
        let mut inventory: ColumnInventory = tables
            .iter()
            .map(|t| (t.clone(), BTreeSet::new()))
            .collect();
        if tables.is_empty() {
            return Ok(inventory);
        }

        let client = self.connect().await?;

        // Batch 200 tables per query to keep the array parameter small
        for chunk in tables.chunks(200) {
            let names: Vec<&str> = chunk.iter().map(String::as_str).collect();
            let rows = client
                .query(
                    "SELECT table_name, column_name FROM information_schema.columns \
                     WHERE table_schema = $1 AND table_name = ANY($2)",
                    &[&schema, &names],
                )
                .await
                .map_err(|e| InventoryError::Query(e.to_string()))?;

            for row in rows {
                let table: String = row.get(0);
                let column: String = row.get(1);
                if let Some(columns) = inventory.get_mut(&table) {
                    columns.insert(column);
                }
            }
        }

        Ok(inventory)
    }
}
