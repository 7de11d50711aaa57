//! Comparison results and notification targets.

use crate::lenient::{opt_f64, opt_text};
use serde::{Deserialize, Serialize};

/// One newly better offer found by the comparison procedure.
///
/// Field names follow the procedure's result columns; English snake_case
/// aliases are accepted as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetterProduct {
    /// Deposit or savings
    #[serde(rename = "상품 타입", alias = "product_type", default, deserialize_with = "opt_text")]
    pub product_type: Option<String>,
    /// Our own product this offer is compared against
    #[serde(rename = "비교 우리 은행 상품", alias = "our_product", default, deserialize_with = "opt_text")]
    pub our_product: Option<String>,
    /// Saving term in months
    #[serde(rename = "저축 기간", alias = "term_months", default, deserialize_with = "opt_text")]
    pub term: Option<String>,
    /// Competing institution
    #[serde(rename = "타행명", alias = "institution", default, deserialize_with = "opt_text")]
    pub institution: Option<String>,
    /// Competing product name
    #[serde(rename = "타행 상품명", alias = "product_name", default, deserialize_with = "opt_text")]
    pub product_name: Option<String>,
    /// Our base rate
    #[serde(rename = "우리은행 기본금리", alias = "our_base_rate", default, deserialize_with = "opt_f64")]
    pub our_base_rate: Option<f64>,
    /// Our maximum rate
    #[serde(rename = "우리은행 최대금리", alias = "our_max_rate", default, deserialize_with = "opt_f64")]
    pub our_max_rate: Option<f64>,
    /// Competing base rate
    #[serde(rename = "타행 기본금리", alias = "base_rate", default, deserialize_with = "opt_f64")]
    pub base_rate: Option<f64>,
    /// Competing maximum rate
    #[serde(rename = "타행 최대금리", alias = "max_rate", default, deserialize_with = "opt_f64")]
    pub max_rate: Option<f64>,
    /// Difference between the maximum rates, in percentage points
    #[serde(rename = "최대 금리차", alias = "rate_delta", default, deserialize_with = "opt_f64")]
    pub rate_delta: Option<f64>,
}

/// Output of the comparison step.
///
/// Either an ordered list of newly better offers, or absent. An empty list
/// and an absent result are the same thing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonResult {
    entries: Vec<BetterProduct>,
}

impl ComparisonResult {
    /// Result signifying no improvement.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Result holding the given entries, in procedure order.
    pub fn from_entries(entries: Vec<BetterProduct>) -> Self {
        Self { entries }
    }

    /// Whether there is nothing to report.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in procedure order.
    pub fn entries(&self) -> &[BetterProduct] {
        &self.entries
    }
}

impl From<Option<Vec<BetterProduct>>> for ComparisonResult {
    fn from(value: Option<Vec<BetterProduct>>) -> Self {
        value.map(Self::from_entries).unwrap_or_default()
    }
}

/// A notification recipient as stored in the subscriber table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Email address
    pub email: String,
    /// Whether the subscriber wants notifications
    pub is_active: bool,
}

impl Subscriber {
    /// Create a subscriber.
    pub fn new(email: impl Into<String>, is_active: bool) -> Self {
        Self {
            email: email.into(),
            is_active,
        }
    }

    /// Whether the subscriber should receive a notification.
    pub fn is_deliverable(&self) -> bool {
        self.is_active && !self.email.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_procedure_row() {
        let row = serde_json::json!({
            "상품 타입": "DEPOSIT",
            "비교 우리 은행 상품": "WON플러스예금",
            "저축 기간": 12,
            "타행명": "케이뱅크",
            "타행 상품명": "코드K 정기예금",
            "우리은행 기본금리": "2.80",
            "우리은행 최대금리": 3.0,
            "타행 기본금리": 3.1,
            "타행 최대금리": 3.3,
            "최대 금리차": 0.3,
            "spcl_cnd": "ignored"
        });

        let entry: BetterProduct = serde_json::from_value(row).unwrap();
        assert_eq!(entry.term.as_deref(), Some("12"));
        assert_eq!(entry.institution.as_deref(), Some("케이뱅크"));
        assert_eq!(entry.our_base_rate, Some(2.8));
        assert_eq!(entry.rate_delta, Some(0.3));
    }

    #[test]
    fn test_deserialize_english_aliases() {
        let row = serde_json::json!({
            "institution": "Bank",
            "product_name": "Super Saver",
            "rate_delta": "0.15"
        });
        let entry: BetterProduct = serde_json::from_value(row).unwrap();
        assert_eq!(entry.product_name.as_deref(), Some("Super Saver"));
        assert_eq!(entry.rate_delta, Some(0.15));
        assert!(entry.product_type.is_none());
    }

    #[test]
    fn test_absent_and_empty_are_equal() {
        assert_eq!(ComparisonResult::absent(), ComparisonResult::from_entries(vec![]));
        assert!(ComparisonResult::from(None).is_empty());
        assert_eq!(
            ComparisonResult::from(Some(vec![BetterProduct::default()])).len(),
            1
        );
    }

    #[test]
    fn test_subscriber_deliverable() {
        assert!(Subscriber::new("a@example.com", true).is_deliverable());
        assert!(!Subscriber::new("a@example.com", false).is_deliverable());
        assert!(!Subscriber::new("  ", true).is_deliverable());
    }
}
