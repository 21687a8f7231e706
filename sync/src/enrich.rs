//! Copies glossary descriptions onto catalog datasets and their columns.

use std::sync::Arc;

use serde::Serialize;

use crate::catalog::{CatalogApi, DatasetId, DatasetUpdate};
use crate::error::SyncError;
use crate::glossary::{self, GlossaryApi, Lookup};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    InvalidId,
    /// No table-level description; columns are never described without one.
    NoTableTerm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentOutcome {
    Enriched {
        dataset_id: DatasetId,
        table: String,
        columns_updated: usize,
        columns_without_term: usize,
    },
    Skipped {
        dataset_id: DatasetId,
        table: Option<String>,
        reason: SkipReason,
    },
    Failed {
        dataset_id: DatasetId,
        message: String,
    },
}

pub struct Enricher {
    catalog: Arc<dyn CatalogApi>,
    glossary: Arc<dyn GlossaryApi>,
    dictionary: String,
}

impl Enricher {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        glossary: Arc<dyn GlossaryApi>,
        dictionary: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            glossary,
            dictionary: dictionary.into(),
        }
    }

    /// Enrich one dataset. Only a catalog login failure is returned as an
    /// error; anything else ends this dataset and is reported in the outcome.
    pub async fn enrich(&self, id: DatasetId) -> Result<EnrichmentOutcome, SyncError> {
        if !id.is_valid() {
            return Ok(EnrichmentOutcome::Skipped {
                dataset_id: id,
                table: None,
                reason: SkipReason::InvalidId,
            });
        }

        let dataset = match self.catalog.get_dataset(id).await {
            Ok(dataset) => dataset,
            Err(e) if e.is_login_failure() => return Err(e.into()),
            Err(e) => {
                tracing::error!(dataset_id = %id, error = %e, "Failed to read dataset");
                return Ok(failed(id, e));
            }
        };
        let table = dataset.table_name.clone();

        let table_term = glossary::table_term_name(&self.dictionary, &table);
        let table_description = match self.glossary.get_term(&table_term).await {
            Lookup::Found(term) => term.description().map(str::to_string),
            Lookup::NotFound => None,
            Lookup::Error(e) => {
                tracing::error!(dataset_id = %id, term = %table_term, error = %e, "Glossary lookup failed");
                return Ok(failed(id, e));
            }
        };
        let Some(table_description) = table_description else {
            tracing::warn!(dataset_id = %id, term = %table_term, "Glossary term not found");
            return Ok(EnrichmentOutcome::Skipped {
                dataset_id: id,
                table: Some(table),
                reason: SkipReason::NoTableTerm,
            });
        };

        let mut columns = Vec::with_capacity(dataset.columns.len());
        let mut without_term = 0;
        for column in &dataset.columns {
            let term = glossary::column_term_name(&self.dictionary, &table, &column.column_name);
            match self.glossary.get_term(&term).await {
                Lookup::Found(found) => match found.description() {
                    Some(description) => {
                        columns.push(column.with_description(description));
                        tracing::info!(table = %table, column = %column.column_name, "Updated column");
                    }
                    None => {
                        tracing::warn!(term = %term, "Glossary term has no description");
                        without_term += 1;
                    }
                },
                Lookup::NotFound => {
                    tracing::warn!(term = %term, "Glossary term not found");
                    without_term += 1;
                }
                Lookup::Error(e) => {
                    tracing::error!(dataset_id = %id, term = %term, error = %e, "Glossary lookup failed");
                    return Ok(failed(id, e));
                }
            }
        }

        let update = DatasetUpdate {
            description: table_description,
            columns,
            override_columns: true,
        };
        let columns_updated = update.columns.len();

        match self.catalog.update_dataset(id, &update).await {
            Ok(()) => {
                tracing::info!(dataset_id = %id, table = %table, columns_updated, "Dataset descriptions updated");
                Ok(EnrichmentOutcome::Enriched {
                    dataset_id: id,
                    table,
                    columns_updated,
                    columns_without_term: without_term,
                })
            }
            Err(e) if e.is_login_failure() => Err(e.into()),
            Err(e) => {
                tracing::error!(dataset_id = %id, error = %e, "Failed to update dataset");
                Ok(failed(id, e))
            }
        }
    }
}

fn failed(id: DatasetId, e: impl std::fmt::Display) -> EnrichmentOutcome {
    EnrichmentOutcome::Failed {
        dataset_id: id,
        message: e.to_string(),
    }
}
