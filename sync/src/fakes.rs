//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::catalog::{
    CatalogApi, ColumnDefinition, DatasetDefinition, DatasetId, DatasetUpdate, NewDataset,
};
use crate::error::{ClientError, InventoryError};
use crate::glossary::{GlossaryApi, GlossaryTerm, Lookup};
use crate::inventory::ReportingInventory;
use crate::mailer::{MailError, Mailer, OutgoingMail};

fn rejected(what: &str) -> ClientError {
    ClientError::Status {
        status: 422,
        message: format!("{what} rejected"),
    }
}

// ---------- reporting inventory ----------

#[derive(Default)]
pub struct FakeInventory {
    tables: BTreeMap<String, BTreeSet<String>>,
    unreachable: bool,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: &str, columns: &[&str]) -> Self {
        self.tables.insert(
            table.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    fn check(&self) -> Result<(), InventoryError> {
        if self.unreachable {
            Err(InventoryError::Connect("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ReportingInventory for FakeInventory {
    async fn list_table_names(&self, _schema: &str) -> Result<BTreeSet<String>, InventoryError> {
        self.check()?;
        Ok(self.tables.keys().cloned().collect())
    }

    async fn list_column_names(
        &self,
        _schema: &str,
        table: &str,
    ) -> Result<BTreeSet<String>, InventoryError> {
        self.check()?;
        Ok(self.tables.get(table).cloned().unwrap_or_default())
    }
}

// ---------- catalog ----------

#[derive(Default)]
pub struct FakeCatalog {
    ids: BTreeSet<DatasetId>,
    names: BTreeSet<String>,
    datasets: HashMap<DatasetId, DatasetDefinition>,
    login_fails: bool,
    failing_get: HashSet<DatasetId>,
    failing_update: HashSet<DatasetId>,
    failing_refresh: HashSet<DatasetId>,
    failing_create: HashSet<String>,
    refresh_delay: Option<Duration>,
    created: Mutex<Vec<NewDataset>>,
    updates: Mutex<Vec<(DatasetId, DatasetUpdate)>>,
    refreshed: Mutex<Vec<DatasetId>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(self, id: i64, table: &str, columns: &[&str]) -> Self {
        let definition = DatasetDefinition {
            table_name: table.to_string(),
            description: None,
            columns: columns.iter().map(|c| ColumnDefinition::new(*c)).collect(),
        };
        self.with_definition(id, definition)
    }

    pub fn with_definition(mut self, id: i64, definition: DatasetDefinition) -> Self {
        self.ids.insert(DatasetId(id));
        self.names.insert(definition.table_name.clone());
        self.datasets.insert(DatasetId(id), definition);
        self
    }

    pub fn with_name(mut self, table: &str) -> Self {
        self.names.insert(table.to_string());
        self
    }

    /// Hide `table` from the name listing while keeping it readable by id.
    pub fn without_name(mut self, table: &str) -> Self {
        self.names.remove(table);
        self
    }

    pub fn login_fails(mut self) -> Self {
        self.login_fails = true;
        self
    }

    pub fn failing_get(mut self, id: DatasetId) -> Self {
        self.failing_get.insert(id);
        self
    }

    pub fn failing_update(mut self, id: DatasetId) -> Self {
        self.failing_update.insert(id);
        self
    }

    pub fn failing_refresh(mut self, id: DatasetId) -> Self {
        self.failing_refresh.insert(id);
        self
    }

    pub fn failing_create(mut self, table: &str) -> Self {
        self.failing_create.insert(table.to_string());
        self
    }

    pub fn slow_refresh(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    pub fn created(&self) -> Vec<NewDataset> {
        self.created.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(DatasetId, DatasetUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn refreshed(&self) -> Vec<DatasetId> {
        self.refreshed.lock().unwrap().clone()
    }

    fn login(&self) -> Result<(), ClientError> {
        if self.login_fails {
            Err(ClientError::Login("status 401: bad credentials".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl CatalogApi for FakeCatalog {
    async fn list_dataset_ids(&self) -> Result<BTreeSet<DatasetId>, ClientError> {
        self.login()?;
        Ok(self.ids.clone())
    }

    async fn list_dataset_names(&self) -> Result<BTreeSet<String>, ClientError> {
        self.login()?;
        Ok(self.names.clone())
    }

    async fn get_dataset(&self, id: DatasetId) -> Result<DatasetDefinition, ClientError> {
        self.login()?;
        if self.failing_get.contains(&id) {
            return Err(rejected("get"));
        }
        self.datasets
            .get(&id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("dataset {id}")))
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> Result<(), ClientError> {
        self.login()?;
        if self.failing_create.contains(&dataset.table_name) {
            return Err(rejected("create"));
        }
        self.created.lock().unwrap().push(dataset.clone());
        Ok(())
    }

    async fn update_dataset(
        &self,
        id: DatasetId,
        update: &DatasetUpdate,
    ) -> Result<(), ClientError> {
        self.login()?;
        if self.failing_update.contains(&id) {
            return Err(rejected("update"));
        }
        self.updates.lock().unwrap().push((id, update.clone()));
        Ok(())
    }

    async fn refresh_dataset(&self, id: DatasetId) -> Result<(), ClientError> {
        self.login()?;
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_refresh.contains(&id) {
            return Err(rejected("refresh"));
        }
        self.refreshed.lock().unwrap().push(id);
        Ok(())
    }
}

// ---------- glossary ----------

#[derive(Default)]
pub struct FakeGlossary {
    terms: HashMap<String, String>,
    failing: HashSet<String>,
}

impl FakeGlossary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_term(mut self, name: &str, description: &str) -> Self {
        self.terms.insert(name.to_string(), description.to_string());
        self
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

#[async_trait::async_trait]
impl GlossaryApi for FakeGlossary {
    async fn get_term(&self, qualified_name: &str) -> Lookup<GlossaryTerm> {
        if self.failing.contains(qualified_name) {
            return Lookup::Error(ClientError::Status {
                status: 500,
                message: "glossary down".into(),
            });
        }
        match self.terms.get(qualified_name) {
            Some(description) => Lookup::Found(GlossaryTerm {
                qualified_name: Some(qualified_name.to_string()),
                description: Some(description.clone()),
            }),
            None => Lookup::NotFound,
        }
    }
}

// ---------- mailer ----------

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fails: bool,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fails: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if self.fails {
            return Err(MailError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
