//! The four batch operations exposed to triggers.
//!
//! Operations run one item at a time. The service holds no locks; keeping a
//! single run per operation active is the caller's job (see `api::RunRegistry`).

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::catalog::CatalogApi;
use crate::changelog::{self, Changelog};
use crate::config::{MailConfig, SyncConfig};
use crate::enrich::{Enricher, EnrichmentOutcome};
use crate::error::SyncError;
use crate::glossary::GlossaryApi;
use crate::inventory::ReportingInventory;
use crate::mailer::{MailError, Mailer, OutgoingMail};
use crate::reconcile::Reconciler;
use crate::registrar::{DatasetTemplate, Registrar, RegistrationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Refresh,
    Enrich,
    Sync,
    Changelog,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Refresh,
        Operation::Enrich,
        Operation::Sync,
        Operation::Changelog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Refresh => "refresh",
            Operation::Enrich => "enrich",
            Operation::Sync => "sync",
            Operation::Changelog => "changelog",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one completed run. Per-item failures are counted here and
/// detailed only in the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub run_id: Uuid,
    pub operation: Operation,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    processed: usize,
    skipped: usize,
    failed: usize,
}

/// Static settings the operations need beyond their collaborators.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Reporting schema whose tables are reconciled.
    pub reporting_schema: String,
    pub excluded_tables: BTreeSet<String>,
    pub template: DatasetTemplate,
    pub dictionary: String,
}

impl ServiceSettings {
    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self {
            reporting_schema: cfg.reporting.schema.clone(),
            excluded_tables: cfg.excluded_tables.clone(),
            template: DatasetTemplate {
                database_id: cfg.catalog.database_id,
                schema: cfg.catalog.schema.clone(),
                owner_id: cfg.catalog.owner_id,
            },
            dictionary: cfg.glossary.dictionary.clone(),
        }
    }
}

/// Who receives the changelog, and how.
pub struct ChangelogMail {
    mailer: Arc<dyn Mailer>,
    from: String,
    reply_to: Option<String>,
    recipients: Vec<String>,
    subject: String,
}

impl ChangelogMail {
    pub fn new(mailer: Arc<dyn Mailer>, cfg: &MailConfig) -> Self {
        Self {
            mailer,
            from: cfg.from.clone(),
            reply_to: cfg.reply_to.clone(),
            recipients: cfg.recipients.clone(),
            subject: cfg.subject.clone(),
        }
    }

    async fn send(&self, changelog: &Changelog) -> Result<(), MailError> {
        let mail = OutgoingMail {
            from: self.from.clone(),
            reply_to: self.reply_to.clone(),
            to: self.recipients.clone(),
            subject: self.subject.clone(),
            body: changelog.text(),
        };
        self.mailer.send(&mail).await
    }
}

pub struct SyncService {
    catalog: Arc<dyn CatalogApi>,
    reconciler: Reconciler,
    registrar: Registrar,
    enricher: Enricher,
    mail: Option<ChangelogMail>,
}

impl SyncService {
    pub fn new(
        catalog: Arc<dyn CatalogApi>,
        glossary: Arc<dyn GlossaryApi>,
        reporting: Arc<dyn ReportingInventory>,
        settings: ServiceSettings,
        mail: Option<ChangelogMail>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(
                reporting,
                catalog.clone(),
                settings.reporting_schema,
                settings.excluded_tables,
            ),
            registrar: Registrar::new(catalog.clone(), settings.template),
            enricher: Enricher::new(catalog.clone(), glossary, settings.dictionary),
            catalog,
            mail,
        }
    }

    pub async fn run(&self, operation: Operation) -> Result<OperationReport, SyncError> {
        match operation {
            Operation::Refresh => self.refresh_all().await,
            Operation::Enrich => self.enrich_all().await,
            Operation::Sync => self.sync_new_tables().await,
            Operation::Changelog => self.generate_and_send_changelog().await,
        }
    }

    /// Ask the catalog to re-read the schema of every dataset.
    pub async fn refresh_all(&self) -> Result<OperationReport, SyncError> {
        tracked(Operation::Refresh, async {
            let mut tally = Tally::default();
            for id in self.catalog.list_dataset_ids().await? {
                if !id.is_valid() {
                    tally.skipped += 1;
                    continue;
                }
                match self.catalog.refresh_dataset(id).await {
                    Ok(()) => {
                        tracing::info!(dataset_id = %id, "Refreshed dataset");
                        tally.processed += 1;
                    }
                    Err(e) if e.is_login_failure() => return Err(e.into()),
                    Err(e) => {
                        tracing::error!(dataset_id = %id, error = %e, "Failed to refresh dataset");
                        tally.failed += 1;
                    }
                }
            }
            Ok::<_, SyncError>(tally)
        })
        .await
    }

    pub async fn enrich_all(&self) -> Result<OperationReport, SyncError> {
        tracked(Operation::Enrich, async {
            let mut tally = Tally::default();
            for id in self.catalog.list_dataset_ids().await? {
                match self.enricher.enrich(id).await? {
                    EnrichmentOutcome::Enriched { .. } => tally.processed += 1,
                    EnrichmentOutcome::Skipped { .. } => tally.skipped += 1,
                    EnrichmentOutcome::Failed { .. } => tally.failed += 1,
                }
            }
            Ok::<_, SyncError>(tally)
        })
        .await
    }

    /// Register every reporting table the catalog does not know yet.
    pub async fn sync_new_tables(&self) -> Result<OperationReport, SyncError> {
        tracked(Operation::Sync, async {
            let mut tally = Tally::default();
            for table in self.reconciler.new_tables().await? {
                match self.registrar.register(&table).await? {
                    RegistrationOutcome::Created { .. } => tally.processed += 1,
                    RegistrationOutcome::Failed { .. } => tally.failed += 1,
                }
            }
            Ok::<_, SyncError>(tally)
        })
        .await
    }

    /// Reconcile, render, and mail the changelog when it says anything.
    ///
    /// The changelog counts as one item: processed when mailed, skipped when
    /// there is nothing to report or no mail transport, failed when the mail
    /// transport rejects it.
    pub async fn generate_and_send_changelog(&self) -> Result<OperationReport, SyncError> {
        tracked(Operation::Changelog, async {
            let result = self.reconciler.reconcile().await?;
            let changelog = changelog::render(&result);
            let mut tally = Tally::default();

            if !changelog.is_worth_sending() {
                tracing::info!(lines = changelog.line_count(), "Nothing worth reporting");
                tally.skipped += 1;
                return Ok(tally);
            }

            let Some(mail) = &self.mail else {
                tracing::info!(changelog = %changelog, "Mail is not configured; changelog not sent");
                tally.skipped += 1;
                return Ok(tally);
            };

            match mail.send(&changelog).await {
                Ok(()) => {
                    tracing::info!(lines = changelog.line_count(), "Changelog sent");
                    tally.processed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to send changelog");
                    tally.failed += 1;
                }
            }
            Ok::<_, SyncError>(tally)
        })
        .await
    }
}

/// Run `work` inside a span carrying a fresh run id and turn its tally into a report.
async fn tracked<F>(operation: Operation, work: F) -> Result<OperationReport, SyncError>
where
    F: Future<Output = Result<Tally, SyncError>>,
{
    let run_id = Uuid::now_v7();
    let started_at = Utc::now();
    let span = tracing::info_span!("run", %run_id, %operation);

    async move {
        tracing::info!("Operation started");
        match work.await {
            Ok(tally) => {
                tracing::info!(
                    processed = tally.processed,
                    skipped = tally.skipped,
                    failed = tally.failed,
                    "Operation finished"
                );
                Ok(OperationReport {
                    run_id,
                    operation,
                    started_at,
                    finished_at: Utc::now(),
                    processed: tally.processed,
                    skipped: tally.skipped,
                    failed: tally.failed,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "Operation aborted");
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}
