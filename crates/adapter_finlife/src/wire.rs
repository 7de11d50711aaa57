//! Wire format of the listing endpoints.
//!
//! A page carries two lists: `baseList` with one entry per product and
//! `optionList` with one entry per product/term tier. Records are produced
//! by left-joining options onto products by product code.

use rates_core::lenient::{opt_text, Scalar};
use rates_core::RawProductRecord;
use serde::Deserialize;
use std::collections::HashMap;

/// Success code reported in `err_cd`.
pub const SUCCESS_CODE: &str = "000";

/// Most pages followed for one financial group.
pub const MAX_PAGES: u32 = 50;

/// Top-level response document.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    /// Response payload
    pub result: ApiPage,
}

/// One page of listings.
#[derive(Debug, Default, Deserialize)]
pub struct ApiPage {
    /// Error code, `000` on success
    #[serde(default, deserialize_with = "opt_text")]
    pub err_cd: Option<String>,
    /// Error message
    #[serde(default, deserialize_with = "opt_text")]
    pub err_msg: Option<String>,
    /// Total number of pages
    #[serde(default)]
    pub max_page_no: Option<Scalar>,
    /// Index of this page
    #[serde(default)]
    pub now_page_no: Option<Scalar>,
    /// Product entries
    #[serde(rename = "baseList", default)]
    pub base_list: Vec<BaseEntry>,
    /// Term tier entries
    #[serde(rename = "optionList", default)]
    pub option_list: Vec<OptionEntry>,
}

impl ApiPage {
    /// Whether the API reported success. A missing code counts as success.
    pub fn is_success(&self) -> bool {
        self.err_cd.as_deref().map_or(true, |c| c == SUCCESS_CODE)
    }

    /// Number of pages to fetch: the reported total, between 1 and
    /// [`MAX_PAGES`].
    pub fn page_count(&self) -> u32 {
        self.max_page_no
            .as_ref()
            .and_then(Scalar::as_f64)
            .filter(|n| *n >= 1.0)
            .map(|n| n.min(f64::from(MAX_PAGES)) as u32)
            .unwrap_or(1)
    }
}

/// A `baseList` entry.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BaseEntry {
    #[serde(default, deserialize_with = "opt_text")]
    pub fin_co_no: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub fin_prdt_cd: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub kor_co_nm: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub fin_prdt_nm: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub dcls_strt_day: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub spcl_cnd: Option<String>,
}

/// An `optionList` entry.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct OptionEntry {
    #[serde(default, deserialize_with = "opt_text")]
    pub fin_prdt_cd: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub save_trm: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub intr_rate_type: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub rsrv_type_nm: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub intr_rate: Option<String>,
    #[serde(default, deserialize_with = "opt_text")]
    pub intr_rate2: Option<String>,
}

/// Left-join options onto products.
///
/// Each option yields one record; a product without options yields one
/// record with no term. Options whose product is not in `base` are ignored.
pub fn join_products(base: &[BaseEntry], options: &[OptionEntry]) -> Vec<RawProductRecord> {
    let mut by_product: HashMap<&str, Vec<&OptionEntry>> = HashMap::new();
    for option in options {
        if let Some(code) = option.fin_prdt_cd.as_deref() {
            by_product.entry(code).or_default().push(option);
        }
    }

    let mut records = Vec::with_capacity(options.len().max(base.len()));
    for product in base {
        let tiers = product
            .fin_prdt_cd
            .as_deref()
            .and_then(|code| by_product.get(code));

        match tiers {
            Some(tiers) => {
                for option in tiers {
                    records.push(record(product, Some(option)));
                }
            }
            None => records.push(record(product, None)),
        }
    }
    records
}

fn record(product: &BaseEntry, option: Option<&OptionEntry>) -> RawProductRecord {
    RawProductRecord {
        institution_id: product.fin_co_no.clone(),
        institution_name: product.kor_co_nm.clone(),
        product_code: product.fin_prdt_cd.clone(),
        product_name: product.fin_prdt_nm.clone(),
        disclosure_start_day: product.dcls_strt_day.clone(),
        special_conditions: product.spcl_cnd.clone(),
        term: option.and_then(|o| o.save_trm.clone()),
        rate_type: option.and_then(|o| o.intr_rate_type.clone()),
        reserve_type: option.and_then(|o| o.rsrv_type_nm.clone()),
        base_rate: option.and_then(|o| o.intr_rate.clone()),
        max_rate: option.and_then(|o| o.intr_rate2.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"{
        "result": {
            "prdt_div": "D",
            "total_count": "2",
            "max_page_no": "3",
            "now_page_no": "1",
            "err_cd": "000",
            "err_msg": "정상",
            "baseList": [
                {"fin_co_no": "0010001", "fin_prdt_cd": "WR0001B", "kor_co_nm": "우리은행",
                 "fin_prdt_nm": "WON플러스예금", "dcls_strt_day": "20261001", "spcl_cnd": null},
                {"fin_co_no": "0010002", "fin_prdt_cd": "XX0002", "kor_co_nm": "다른은행",
                 "fin_prdt_nm": "옵션없음", "dcls_strt_day": "20261001", "spcl_cnd": "없음"}
            ],
            "optionList": [
                {"fin_prdt_cd": "WR0001B", "save_trm": "6", "intr_rate_type": "S",
                 "intr_rate": 2.9, "intr_rate2": 3.1},
                {"fin_prdt_cd": "WR0001B", "save_trm": "12", "intr_rate_type": "S",
                 "intr_rate": "3.0", "intr_rate2": null},
                {"fin_prdt_cd": "ORPHAN", "save_trm": "12"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_page() {
        let envelope: ApiEnvelope = serde_json::from_str(PAGE).unwrap();
        assert!(envelope.result.is_success());
        assert_eq!(envelope.result.page_count(), 3);
        assert_eq!(envelope.result.base_list.len(), 2);
        assert_eq!(envelope.result.option_list[0].intr_rate.as_deref(), Some("2.9"));
    }

    #[test]
    fn test_join_left_outer() {
        let envelope: ApiEnvelope = serde_json::from_str(PAGE).unwrap();
        let records = join_products(&envelope.result.base_list, &envelope.result.option_list);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].term.as_deref(), Some("6"));
        assert_eq!(records[1].term.as_deref(), Some("12"));
        assert_eq!(records[1].max_rate, None);
        assert_eq!(records[2].product_code.as_deref(), Some("XX0002"));
        assert_eq!(records[2].term, None);
    }

    #[test]
    fn test_error_code() {
        let envelope: ApiEnvelope = serde_json::from_str(
            r#"{"result": {"err_cd": "010", "err_msg": "미등록 인증키"}}"#,
        )
        .unwrap();
        assert!(!envelope.result.is_success());
        assert_eq!(envelope.result.page_count(), 1);
        assert!(envelope.result.base_list.is_empty());
    }

    #[test]
    fn test_page_count_is_capped() {
        let envelope: ApiEnvelope =
            serde_json::from_str(r#"{"result": {"err_cd": "000", "max_page_no": 1e9}}"#).unwrap();
        assert_eq!(envelope.result.page_count(), MAX_PAGES);

        let envelope: ApiEnvelope =
            serde_json::from_str(r#"{"result": {"err_cd": "000", "max_page_no": "NaN"}}"#).unwrap();
        assert_eq!(envelope.result.page_count(), 1);
    }
}
