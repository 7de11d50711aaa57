//! Rate API endpoints and request URLs.

use crate::error::FeedError;
use rates_core::ProductType;
use reqwest::Url;

/// Default API root.
pub const FINLIFE_BASE_URL: &str = "http://finlife.fss.or.kr/finlifeapi";

/// Financial-group code for commercial banks.
pub const BANK_GROUP: &str = "020000";

/// One product listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductEndpoint {
    /// Fixed-term deposits
    Deposit,
    /// Instalment savings
    Saving,
}

impl ProductEndpoint {
    /// Both endpoints, deposit first.
    pub const ALL: [ProductEndpoint; 2] = [ProductEndpoint::Deposit, ProductEndpoint::Saving];

    /// Path segment below the API root.
    pub fn path(&self) -> &'static str {
        match self {
            ProductEndpoint::Deposit => "depositProductsSearch.json",
            ProductEndpoint::Saving => "savingProductsSearch.json",
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ProductEndpoint::Deposit => "deposit",
            ProductEndpoint::Saving => "saving",
        }
    }

    /// Product type listed by this endpoint.
    pub fn product_type(&self) -> ProductType {
        match self {
            ProductEndpoint::Deposit => ProductType::Deposit,
            ProductEndpoint::Saving => ProductType::Saving,
        }
    }
}

impl From<ProductType> for ProductEndpoint {
    fn from(value: ProductType) -> Self {
        match value {
            ProductType::Deposit => ProductEndpoint::Deposit,
            ProductType::Saving => ProductEndpoint::Saving,
        }
    }
}

/// Build the URL of one listing page.
///
/// The API key travels as the `auth` query parameter, so the returned URL
/// must not be logged.
pub fn product_url(
    base_url: &str,
    endpoint: ProductEndpoint,
    api_key: &str,
    group: &str,
    page: u32,
) -> Result<Url, FeedError> {
    let root = format!("{}/{}", base_url.trim_end_matches('/'), endpoint.path());
    let page = page.to_string();
    Url::parse_with_params(
        &root,
        &[("auth", api_key), ("topFinGrpNo", group), ("pageNo", page.as_str())],
    )
    .map_err(|e| FeedError::Url(format!("{}: {}", endpoint.name(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_url() {
        let url = product_url(FINLIFE_BASE_URL, ProductEndpoint::Deposit, "k3y", BANK_GROUP, 1)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://finlife.fss.or.kr/finlifeapi/depositProductsSearch.json?auth=k3y&topFinGrpNo=020000&pageNo=1"
        );
    }

    #[test]
    fn test_trailing_slash_and_escaping() {
        let url = product_url("http://localhost:9/api/", ProductEndpoint::Saving, "a&b", "030300", 2)
            .unwrap();
        assert_eq!(url.path(), "/api/savingProductsSearch.json");
        assert!(url.query().unwrap().contains("auth=a%26b"));
        assert!(url.query().unwrap().contains("pageNo=2"));
    }

    #[test]
    fn test_invalid_base_url() {
        let err = product_url("not a url", ProductEndpoint::Deposit, "k", BANK_GROUP, 1).unwrap_err();
        assert!(err.to_string().contains("deposit"));
    }

    #[test]
    fn test_endpoint_product_type() {
        for endpoint in ProductEndpoint::ALL {
            assert_eq!(ProductEndpoint::from(endpoint.product_type()), endpoint);
        }
    }
}
