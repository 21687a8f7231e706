//! Superset REST API v1 client.

use std::collections::BTreeSet;
use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{CatalogApi, DatasetDefinition, DatasetId, DatasetUpdate, NewDataset, TokenProvider};
use crate::error::ClientError;

/// Only the first page of any listing is read.
const FIRST_PAGE: u32 = 0;

#[derive(Deserialize)]
struct IdPage {
    #[serde(default)]
    ids: Vec<i64>,
    count: Option<u64>,
}

#[derive(Deserialize)]
struct NamePage {
    #[serde(default)]
    result: Vec<NameRow>,
    count: Option<u64>,
}

#[derive(Deserialize)]
struct NameRow {
    table_name: Option<String>,
}

#[derive(Deserialize)]
struct DatasetEnvelope {
    result: DatasetDefinition,
}

pub struct SupersetClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
    page_size: u32,
}

impl SupersetClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
            page_size,
        }
    }

    fn list_query(&self, columns: &str) -> String {
        format!(
            "(page:{FIRST_PAGE},page_size:{},columns:!({columns}))",
            self.page_size
        )
    }

    fn warn_if_truncated(&self, what: &str, returned: usize, count: Option<u64>) {
        if let Some(total) = count
            && total > returned as u64
        {
            tracing::warn!(
                listing = what,
                returned,
                total,
                page_size = self.page_size,
                "Catalog holds more datasets than one page; only the first page is used"
            );
        }
    }

    /// Build an authenticated request. Every call obtains its own token.
    async fn authorized(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let token = self.tokens.token().await?;
        let url = format!("{}{}", self.base_url, path);
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, ClientError> {
        let start = std::time::Instant::now();
        let response = request.send().await?;
        let status = response.status();

        tracing::debug!(
            path = %path,
            status = %status.as_u16(),
            duration_ms = %start.elapsed().as_millis(),
            "Catalog response"
        );

        if status.is_success() {
            Ok(response)
        } else {
            let message = response
                .text()
                .await
                .ok()
                .filter(|b| !b.is_empty())
                .unwrap_or_else(|| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            ClientError::InvalidResponse(format!(
                "{e} (body: {})",
                String::from_utf8_lossy(&body)
            ))
        })
    }
}

#[async_trait::async_trait]
impl CatalogApi for SupersetClient {
    async fn list_dataset_ids(&self) -> Result<BTreeSet<DatasetId>, ClientError> {
        let path = "/api/v1/dataset/";
        let request = self
            .authorized(Method::GET, path)
            .await?
            .query(&[("q", self.list_query("id"))]);
        let page: IdPage = Self::decode(self.send(request, path).await?).await?;

        self.warn_if_truncated("ids", page.ids.len(), page.count);
        Ok(page.ids.into_iter().map(DatasetId).collect())
    }

    async fn list_dataset_names(&self) -> Result<BTreeSet<String>, ClientError> {
        let path = "/api/v1/dataset/";
        let request = self
            .authorized(Method::GET, path)
            .await?
            .query(&[("q", self.list_query("table_name"))]);
        let page: NamePage = Self::decode(self.send(request, path).await?).await?;

        self.warn_if_truncated("table_name", page.result.len(), page.count);
        Ok(page
            .result
            .into_iter()
            .filter_map(|row| row.table_name)
            .collect())
    }

    async fn get_dataset(&self, id: DatasetId) -> Result<DatasetDefinition, ClientError> {
        let path = format!("/api/v1/dataset/{id}");
        let request = self.authorized(Method::GET, &path).await?;
        let envelope: DatasetEnvelope = Self::decode(self.send(request, &path).await?).await?;
        Ok(envelope.result)
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> Result<(), ClientError> {
        let path = "/api/v1/dataset/";
        let request = self.authorized(Method::POST, path).await?.json(dataset);
        self.send(request, path).await?;
        Ok(())
    }

    async fn update_dataset(
        &self,
        id: DatasetId,
        update: &DatasetUpdate,
    ) -> Result<(), ClientError> {
        let path = format!("/api/v1/dataset/{id}");
        let request = self
            .authorized(Method::PUT, &path)
            .await?
            .query(&[("override_columns", update.override_columns)])
            .json(update);
        self.send(request, &path).await?;
        Ok(())
    }

    async fn refresh_dataset(&self, id: DatasetId) -> Result<(), ClientError> {
        let path = format!("/api/v1/dataset/{id}/refresh");
        let request = self.authorized(Method::PUT, &path).await?;
        self.send(request, &path).await?;
        Ok(())
    }
}
