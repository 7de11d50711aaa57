//! Raw and canonical product records.
//!
//! A [`RawProductRecord`] is one product joined with one term tier exactly as
//! the rate API describes it: every field optional, every value text. A
//! [`CanonicalProductRow`] is the store-ready form, identified by its
//! [`ProductKey`]. A [`ProductBatch`] is the unit handed to the loader; it can
//! only be built by collapsing duplicate keys, so a batch never carries the
//! same key twice.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of product collected by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductType {
    /// Fixed-term deposit
    Deposit,
    /// Instalment savings
    Saving,
}

impl ProductType {
    /// Stored label of the product type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Deposit => "DEPOSIT",
            ProductType::Saving => "SAVING",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown product type label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown product type: {0}")]
pub struct UnknownProductType(pub String);

impl FromStr for ProductType {
    type Err = UnknownProductType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEPOSIT" => Ok(ProductType::Deposit),
            "SAVING" | "SAVINGS" => Ok(ProductType::Saving),
            _ => Err(UnknownProductType(s.to_string())),
        }
    }
}

/// One product/term pair as returned by the rate API.
///
/// The schema is controlled externally, so nothing here is guaranteed to be
/// present or well formed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProductRecord {
    /// Financial institution code (`fin_co_no`)
    pub institution_id: Option<String>,
    /// Institution display name (`kor_co_nm`)
    pub institution_name: Option<String>,
    /// Product code (`fin_prdt_cd`)
    pub product_code: Option<String>,
    /// Product display name (`fin_prdt_nm`)
    pub product_name: Option<String>,
    /// Disclosure start day, `YYYYMMDD` (`dcls_strt_day`)
    pub disclosure_start_day: Option<String>,
    /// Preferential conditions free text (`spcl_cnd`)
    pub special_conditions: Option<String>,
    /// Saving term in months (`save_trm`)
    pub term: Option<String>,
    /// Interest rate type, e.g. simple or compound (`intr_rate_type`)
    pub rate_type: Option<String>,
    /// Reserve type for instalment savings (`rsrv_type_nm`)
    pub reserve_type: Option<String>,
    /// Base rate (`intr_rate`)
    pub base_rate: Option<String>,
    /// Maximum preferential rate (`intr_rate2`)
    pub max_rate: Option<String>,
}

/// Stable identity of a canonical row, used as the upsert conflict target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductKey {
    /// Product code
    pub product_code: String,
    /// Saving term in months
    pub term_months: u32,
    /// Financial institution code
    pub institution_id: String,
}

impl fmt::Display for ProductKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}m@{}",
            self.product_code, self.term_months, self.institution_id
        )
    }
}

/// Normalised, store-ready product offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProductRow {
    /// Date the row was collected (in the pipeline's timezone)
    pub collected_at: NaiveDate,
    /// Deposit or savings
    pub product_type: ProductType,
    /// Financial institution code
    pub institution_id: String,
    /// Product code
    pub product_code: String,
    /// Saving term in months
    pub term_months: u32,
    /// Interest rate type
    pub rate_type: Option<String>,
    /// Reserve type, `-` when not applicable
    pub reserve_type: String,
    /// Institution display name
    pub institution_name: Option<String>,
    /// Product display name
    pub product_name: Option<String>,
    /// Base rate in percent
    pub base_rate: Option<f64>,
    /// Maximum preferential rate in percent
    pub max_rate: Option<f64>,
    /// Disclosure start day
    pub disclosure_start_day: Option<String>,
    /// Preferential conditions
    pub special_conditions: String,
}

impl CanonicalProductRow {
    /// Upsert key of this row.
    pub fn key(&self) -> ProductKey {
        ProductKey {
            product_code: self.product_code.clone(),
            term_months: self.term_months,
            institution_id: self.institution_id.clone(),
        }
    }
}

/// A batch of canonical rows with unique keys.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use rates_core::product::{CanonicalProductRow, ProductBatch, ProductType};
///
/// let row = |rate: f64| CanonicalProductRow {
///     collected_at: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
///     product_type: ProductType::Deposit,
///     institution_id: "0010001".to_string(),
///     product_code: "WR0001B".to_string(),
///     term_months: 12,
///     rate_type: None,
///     reserve_type: "-".to_string(),
///     institution_name: None,
///     product_name: None,
///     base_rate: Some(rate),
///     max_rate: None,
///     disclosure_start_day: None,
///     special_conditions: String::new(),
/// };
///
/// let batch = ProductBatch::collapse(vec![row(3.0), row(3.2)]);
/// assert_eq!(batch.len(), 1);
/// assert_eq!(batch.collapsed(), 1);
/// assert_eq!(batch.rows()[0].base_rate, Some(3.2));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductBatch {
    rows: Vec<CanonicalProductRow>,
    collapsed: usize,
}

impl ProductBatch {
    /// Collapse duplicate keys, last write wins.
    ///
    /// A surviving row keeps the position where its key was first seen, so
    /// the output order is a function of the input order only.
    pub fn collapse(rows: Vec<CanonicalProductRow>) -> Self {
        let mut positions: HashMap<ProductKey, usize> = HashMap::with_capacity(rows.len());
        let mut out: Vec<CanonicalProductRow> = Vec::with_capacity(rows.len());
        let mut collapsed = 0;

        for row in rows {
            match positions.get(&row.key()) {
                Some(&idx) => {
                    out[idx] = row;
                    collapsed += 1;
                }
                None => {
                    positions.insert(row.key(), out.len());
                    out.push(row);
                }
            }
        }

        Self {
            rows: out,
            collapsed,
        }
    }

    /// Rows of the batch.
    pub fn rows(&self) -> &[CanonicalProductRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of input rows that were overwritten by a later duplicate.
    pub fn collapsed(&self) -> usize {
        self.collapsed
    }

    /// Consume the batch, returning its rows.
    pub fn into_rows(self) -> Vec<CanonicalProductRow> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(code: &str, term: u32, inst: &str, rate: f64) -> CanonicalProductRow {
        CanonicalProductRow {
            collected_at: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            product_type: ProductType::Saving,
            institution_id: inst.to_string(),
            product_code: code.to_string(),
            term_months: term,
            rate_type: Some("S".to_string()),
            reserve_type: "자유적립식".to_string(),
            institution_name: None,
            product_name: None,
            base_rate: Some(rate),
            max_rate: None,
            disclosure_start_day: None,
            special_conditions: String::new(),
        }
    }

    #[test]
    fn test_product_type_roundtrip() {
        assert_eq!("deposit".parse::<ProductType>().unwrap(), ProductType::Deposit);
        assert_eq!("SAVING".parse::<ProductType>().unwrap(), ProductType::Saving);
        assert!("loan".parse::<ProductType>().is_err());
        assert_eq!(ProductType::Saving.to_string(), "SAVING");
    }

    #[test]
    fn test_collapse_keeps_first_position_last_value() {
        let batch = ProductBatch::collapse(vec![
            row("A", 12, "1", 1.0),
            row("B", 12, "1", 2.0),
            row("A", 12, "1", 3.0),
        ]);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.collapsed(), 1);
        assert_eq!(batch.rows()[0].product_code, "A");
        assert_eq!(batch.rows()[0].base_rate, Some(3.0));
        assert_eq!(batch.rows()[1].product_code, "B");
    }

    #[test]
    fn test_key_distinguishes_term_and_institution() {
        let batch = ProductBatch::collapse(vec![
            row("A", 6, "1", 1.0),
            row("A", 12, "1", 1.0),
            row("A", 12, "2", 1.0),
        ]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.collapsed(), 0);
    }

    #[test]
    fn test_key_display() {
        let key = row("WR0001B", 12, "0010001", 1.0).key();
        assert_eq!(key.to_string(), "WR0001B/12m@0010001");
    }
}
