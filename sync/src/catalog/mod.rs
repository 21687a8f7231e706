use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClientError;

pub mod superset;
pub mod token;

pub use superset::SupersetClient;
pub use token::{CachedTokenProvider, SupersetLogin, TokenProvider};

/// System-managed column fields the catalog rejects on write-back.
pub const VOLATILE_COLUMN_FIELDS: [&str; 4] =
    ["changed_on", "created_on", "type_generic", "python_date_format"];

// ---------- identifiers ----------

/// Catalog-assigned dataset identity. Only positive ids refer to real datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub i64);

impl DatasetId {
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------- dataset payloads ----------

/// A catalog column record.
///
/// Identity fields are typed; every other field the catalog returned is kept
/// in `extra` so a write-back does not drop it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub column_name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ColumnDefinition {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            data_type: None,
            description: None,
            extra: Map::new(),
        }
    }

    /// Copy of this column fit for an update: description replaced, volatile
    /// fields removed.
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        let mut column = self.clone();
        column.description = Some(description.into());
        column.strip_volatile_fields();
        column
    }

    pub fn strip_volatile_fields(&mut self) {
        for key in VOLATILE_COLUMN_FIELDS {
            self.extra.remove(key);
        }
    }
}

/// The parts of a dataset the reconciler and enricher work on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatasetDefinition {
    pub table_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,
}

impl DatasetDefinition {
    pub fn column_names(&self) -> BTreeSet<String> {
        self.columns.iter().map(|c| c.column_name.clone()).collect()
    }
}

/// Body of a create-dataset request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDataset {
    pub database: i64,
    pub schema: String,
    pub table_name: String,
    pub is_managed_externally: bool,
    pub owners: Vec<i64>,
}

/// Body of an update-dataset request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetUpdate {
    pub description: String,
    pub columns: Vec<ColumnDefinition>,
    /// Replace the stored column definitions instead of appending to them.
    #[serde(skip)]
    pub override_columns: bool,
}

// ---------- trait ----------

#[async_trait::async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_dataset_ids(&self) -> Result<BTreeSet<DatasetId>, ClientError>;

    async fn list_dataset_names(&self) -> Result<BTreeSet<String>, ClientError>;

    async fn get_dataset(&self, id: DatasetId) -> Result<DatasetDefinition, ClientError>;

    async fn create_dataset(&self, dataset: &NewDataset) -> Result<(), ClientError>;

    async fn update_dataset(&self, id: DatasetId, update: &DatasetUpdate)
    -> Result<(), ClientError>;

    async fn refresh_dataset(&self, id: DatasetId) -> Result<(), ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dataset_id_validity() {
        assert!(DatasetId(7).is_valid());
        assert!(!DatasetId(0).is_valid());
        assert!(!DatasetId(-3).is_valid());
    }

    #[test]
    fn test_column_keeps_unknown_fields() {
        let column: ColumnDefinition = serde_json::from_value(json!({
            "column_name": "age",
            "type": "INT",
            "id": 12,
            "verbose_name": null,
            "changed_on": "2024-01-01T00:00:00",
        }))
        .unwrap();

        assert_eq!(column.data_type.as_deref(), Some("INT"));
        assert_eq!(column.extra.get("id"), Some(&json!(12)));
        assert!(column.extra.contains_key("verbose_name"));
    }

    #[test]
    fn test_with_description_strips_volatile_fields() {
        let column: ColumnDefinition = serde_json::from_value(json!({
            "column_name": "age",
            "type": "INT",
            "id": 12,
            "changed_on": "2024-01-01T00:00:00",
            "created_on": "2023-01-01T00:00:00",
            "type_generic": 0,
            "python_date_format": null,
        }))
        .unwrap();

        let merged = serde_json::to_value(column.with_description("Age in years")).unwrap();
        let obj = merged.as_object().unwrap();

        for key in VOLATILE_COLUMN_FIELDS {
            assert!(!obj.contains_key(key), "{key} must be stripped");
        }
        assert_eq!(obj["description"], "Age in years");
        assert_eq!(obj["column_name"], "age");
        assert_eq!(obj["type"], "INT");
        assert_eq!(obj["id"], 12);
    }

    #[test]
    fn test_update_body_omits_override_flag() {
        let update = DatasetUpdate {
            description: "Orders".into(),
            columns: vec![ColumnDefinition::new("id")],
            override_columns: true,
        };
        let body = serde_json::to_value(&update).unwrap();
        assert_eq!(body, json!({ "description": "Orders", "columns": [{ "column_name": "id" }] }));
    }
}
