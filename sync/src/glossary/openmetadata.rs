//! OpenMetadata glossary-term client.

use reqwest::Url;

use super::{GlossaryApi, GlossaryTerm, Lookup};
use crate::error::ClientError;

pub struct OpenMetadataClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl OpenMetadataClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// `{base}/api/v1/glossaryTerms/name/{fqn}` with `fqn` encoded as one segment.
    fn term_url(&self, qualified_name: &str) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "v1", "glossaryTerms", "name", qualified_name]);
        Ok(url)
    }

    async fn fetch(&self, qualified_name: &str) -> Result<GlossaryTerm, ClientError> {
        let url = self.term_url(qualified_name)?;
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, message));
        }

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
impl GlossaryApi for OpenMetadataClient {
    async fn get_term(&self, qualified_name: &str) -> Lookup<GlossaryTerm> {
        let lookup = Lookup::from_result(self.fetch(qualified_name).await);
        if let Lookup::NotFound = lookup {
            tracing::debug!(term = %qualified_name, "Glossary term not found");
        }
        lookup
    }
}
