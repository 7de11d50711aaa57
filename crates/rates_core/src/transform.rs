//! Normalisation of raw API records into canonical rows.
//!
//! Each raw record maps to zero or one canonical row. Records missing a
//! required field (institution, product code, term) are dropped and counted
//! in a [`TransformReport`]; they never fail the run. An empty output is a
//! valid outcome.

use crate::lenient::parse_rate;
use crate::product::{CanonicalProductRow, ProductBatch, ProductType, RawProductRecord};
use chrono::NaiveDate;
use std::fmt;

/// Reserve type stored when the API does not provide one.
pub const NO_RESERVE_TYPE: &str = "-";

/// Special-conditions text stored when the API does not provide one.
pub const NO_SPECIAL_CONDITIONS: &str = "해당사항 없음";

/// Longest term accepted, in months. Longer terms count as invalid.
pub const MAX_TERM_MONTHS: u32 = 1200;

/// Counters describing one transformation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformReport {
    /// Raw records examined
    pub input: usize,
    /// Canonical rows produced before deduplication
    pub emitted: usize,
    /// Dropped: no institution id
    pub missing_institution: usize,
    /// Dropped: no product code
    pub missing_product_code: usize,
    /// Dropped: term absent or not a whole number of months
    pub invalid_term: usize,
    /// Rows overwritten by a later row with the same key
    pub collapsed: usize,
}

impl TransformReport {
    /// Total number of dropped records.
    pub fn dropped(&self) -> usize {
        self.missing_institution + self.missing_product_code + self.invalid_term
    }

    fn merge(self, other: TransformReport) -> TransformReport {
        TransformReport {
            input: self.input + other.input,
            emitted: self.emitted + other.emitted,
            missing_institution: self.missing_institution + other.missing_institution,
            missing_product_code: self.missing_product_code + other.missing_product_code,
            invalid_term: self.invalid_term + other.invalid_term,
            collapsed: self.collapsed + other.collapsed,
        }
    }
}

impl fmt::Display for TransformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input={} emitted={} dropped={} (institution={}, product_code={}, term={}) collapsed={}",
            self.input,
            self.emitted,
            self.dropped(),
            self.missing_institution,
            self.missing_product_code,
            self.invalid_term,
            self.collapsed
        )
    }
}

enum Rejection {
    MissingInstitution,
    MissingProductCode,
    InvalidTerm,
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse a term such as `"12"` or `"12.0"` into whole months, at most
/// [`MAX_TERM_MONTHS`].
fn parse_term(raw: &Option<String>) -> Option<u32> {
    let raw = raw.as_deref()?.trim();
    let months = match raw.parse::<u32>() {
        Ok(months) => months,
        Err(_) => {
            let value = raw.parse::<f64>().ok()?;
            if value.fract() != 0.0 || !(0.0..=f64::from(MAX_TERM_MONTHS)).contains(&value) {
                return None;
            }
            value as u32
        }
    };
    (months <= MAX_TERM_MONTHS).then_some(months)
}

fn canonicalise(
    product_type: ProductType,
    record: &RawProductRecord,
    collected_at: NaiveDate,
) -> Result<CanonicalProductRow, Rejection> {
    let institution_id = required(&record.institution_id).ok_or(Rejection::MissingInstitution)?;
    let product_code = required(&record.product_code).ok_or(Rejection::MissingProductCode)?;
    let term_months = parse_term(&record.term).ok_or(Rejection::InvalidTerm)?;

    Ok(CanonicalProductRow {
        collected_at,
        product_type,
        institution_id,
        product_code,
        term_months,
        rate_type: required(&record.rate_type),
        reserve_type: required(&record.reserve_type)
            .unwrap_or_else(|| NO_RESERVE_TYPE.to_string()),
        institution_name: required(&record.institution_name),
        product_name: required(&record.product_name),
        base_rate: record.base_rate.as_deref().and_then(parse_rate),
        max_rate: record.max_rate.as_deref().and_then(parse_rate),
        disclosure_start_day: required(&record.disclosure_start_day),
        special_conditions: required(&record.special_conditions)
            .unwrap_or_else(|| NO_SPECIAL_CONDITIONS.to_string()),
    })
}

/// Transform the raw records of one product type.
///
/// Rows are returned in input order and are not deduplicated; see
/// [`build_batch`] for the combined, collapsed batch.
pub fn transform_records(
    product_type: ProductType,
    records: &[RawProductRecord],
    collected_at: NaiveDate,
) -> (Vec<CanonicalProductRow>, TransformReport) {
    let mut report = TransformReport {
        input: records.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        match canonicalise(product_type, record, collected_at) {
            Ok(row) => rows.push(row),
            Err(Rejection::MissingInstitution) => report.missing_institution += 1,
            Err(Rejection::MissingProductCode) => report.missing_product_code += 1,
            Err(Rejection::InvalidTerm) => report.invalid_term += 1,
        }
    }

    report.emitted = rows.len();
    (rows, report)
}

/// Transform deposit and savings records into one load-ready batch.
///
/// Deposit rows come first, then savings rows; duplicate keys collapse
/// last-write-wins.
pub fn build_batch(
    deposit: &[RawProductRecord],
    saving: &[RawProductRecord],
    collected_at: NaiveDate,
) -> (ProductBatch, TransformReport) {
    let (mut rows, deposit_report) =
        transform_records(ProductType::Deposit, deposit, collected_at);
    let (saving_rows, saving_report) =
        transform_records(ProductType::Saving, saving, collected_at);
    rows.extend(saving_rows);

    let batch = ProductBatch::collapse(rows);
    let mut report = deposit_report.merge(saving_report);
    report.collapsed = batch.collapsed();
    (batch, report)
}
