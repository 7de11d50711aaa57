//! Product fetcher.

use crate::endpoint::{product_url, ProductEndpoint, BANK_GROUP, FINLIFE_BASE_URL};
use crate::error::FeedError;
use crate::gate::HttpProbe;
use crate::wire::{join_products, ApiEnvelope, ApiPage, MAX_PAGES};
use async_trait::async_trait;
use rates_core::{ProductType, RawProductRecord};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of raw product records.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Fetch every raw record of one product type.
    ///
    /// Either the whole listing is returned or an error; partial listings are
    /// never returned.
    async fn fetch(&self, product_type: ProductType) -> Result<Vec<RawProductRecord>, FeedError>;
}

/// Settings for [`FinlifeClient`].
#[derive(Debug, Clone)]
pub struct FinlifeSettings {
    /// API root
    pub base_url: String,
    /// Authentication key
    pub api_key: String,
    /// Financial-group codes to list
    pub groups: Vec<String>,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl FinlifeSettings {
    /// Settings for the public API with the bank group only.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: FINLIFE_BASE_URL.to_string(),
            api_key: api_key.into(),
            groups: vec![BANK_GROUP.to_string()],
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the finlife listing endpoints.
#[derive(Clone)]
pub struct FinlifeClient {
    http: reqwest::Client,
    settings: FinlifeSettings,
}

impl FinlifeClient {
    /// Create a client.
    pub fn new(settings: FinlifeSettings) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| FeedError::Http {
                endpoint: "client",
                source: e.without_url(),
            })?;
        Ok(Self { http, settings })
    }

    /// Availability probe for one endpoint, against page 1 of the first group.
    pub fn probe(
        &self,
        endpoint: ProductEndpoint,
        timeout: Duration,
    ) -> Result<HttpProbe, FeedError> {
        let url = product_url(
            &self.settings.base_url,
            endpoint,
            &self.settings.api_key,
            self.first_group(),
            1,
        )?;
        Ok(HttpProbe::new(self.http.clone(), endpoint, url, timeout))
    }

    fn first_group(&self) -> &str {
        self.settings
            .groups
            .first()
            .map(String::as_str)
            .unwrap_or(BANK_GROUP)
    }

    async fn fetch_page(
        &self,
        endpoint: ProductEndpoint,
        group: &str,
        page: u32,
    ) -> Result<ApiPage, FeedError> {
        let url = product_url(
            &self.settings.base_url,
            endpoint,
            &self.settings.api_key,
            group,
            page,
        )?;
        let http_err = |e: reqwest::Error| FeedError::Http {
            endpoint: endpoint.name(),
            source: e.without_url(),
        };

        let response = self.http.get(url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                endpoint: endpoint.name(),
                status,
            });
        }

        let body = response.bytes().await.map_err(http_err)?;
        let envelope: ApiEnvelope =
            serde_json::from_slice(&body).map_err(|source| FeedError::Decode {
                endpoint: endpoint.name(),
                source,
            })?;

        let page_data = envelope.result;
        if !page_data.is_success() {
            return Err(FeedError::Api {
                endpoint: endpoint.name(),
                code: page_data.err_cd.clone().unwrap_or_default(),
                message: page_data.err_msg.clone().unwrap_or_default(),
            });
        }
        Ok(page_data)
    }

    async fn fetch_group(
        &self,
        endpoint: ProductEndpoint,
        group: &str,
    ) -> Result<Vec<RawProductRecord>, FeedError> {
        let first = self.fetch_page(endpoint, group, 1).await?;
        let pages = first.page_count();
        if pages == MAX_PAGES {
            warn!(endpoint = endpoint.name(), group, pages, "Page count capped");
        }
        let mut records = join_products(&first.base_list, &first.option_list);

        for page in 2..=pages {
            let next = self.fetch_page(endpoint, group, page).await?;
            records.extend(join_products(&next.base_list, &next.option_list));
        }

        debug!(
            endpoint = endpoint.name(),
            group,
            pages,
            records = records.len(),
            "Fetched financial group"
        );
        Ok(records)
    }
}

#[async_trait]
impl ProductSource for FinlifeClient {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, product_type: ProductType) -> Result<Vec<RawProductRecord>, FeedError> {
        let endpoint = ProductEndpoint::from(product_type);
        let mut records = Vec::new();

        for group in &self.settings.groups {
            records.extend(self.fetch_group(endpoint, group).await?);
        }

        info!(
            endpoint = endpoint.name(),
            groups = self.settings.groups.len(),
            records = records.len(),
            "Fetched product listing"
        );
        Ok(records)
    }
}
