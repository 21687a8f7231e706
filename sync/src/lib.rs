//! superset-sync - keeps a Superset dataset catalog in step with a reporting
//! database and fills dataset descriptions from an OpenMetadata glossary.

pub mod api;
pub mod catalog;
pub mod changelog;
pub mod config;
pub mod enrich;
pub mod error;
pub mod glossary;
pub mod inventory;
pub mod mailer;
pub mod reconcile;
pub mod registrar;
pub mod schedule;
pub mod service;

#[cfg(test)]
mod fakes;
