//! # rates_core: Product Model for the Rates Pipeline
//!
//! ## Foundation Role
//!
//! rates_core is the bottom layer of the workspace. It owns every type that
//! crosses a crate boundary and every step of the pipeline that is pure:
//! - Raw and canonical product records (`product`)
//! - Lenient scalar decoding for externally controlled payloads (`lenient`)
//! - Normalisation of raw records into a deduplicated batch (`transform`)
//! - Comparison results, subscribers and the notify/skip decision (`comparison`, `branch`)
//!
//! ## No I/O
//!
//! Nothing in this crate touches the network, the database or the clock.
//! The collection date is always passed in, so identical input yields
//! identical output.
//!
//! ## Usage Examples
//!
//! ```rust
//! use chrono::NaiveDate;
//! use rates_core::product::{ProductType, RawProductRecord};
//! use rates_core::transform::build_batch;
//!
//! let record = RawProductRecord {
//!     institution_id: Some("0010001".to_string()),
//!     product_code: Some("WR0001B".to_string()),
//!     term: Some("12".to_string()),
//!     base_rate: Some("3.10".to_string()),
//!     ..Default::default()
//! };
//!
//! let collected_at = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
//! let (batch, report) = build_batch(&[record], &[], collected_at);
//! assert_eq!(batch.len(), 1);
//! assert_eq!(report.emitted, 1);
//! assert_eq!(batch.rows()[0].product_type, ProductType::Deposit);
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod branch;
pub mod comparison;
pub mod lenient;
pub mod product;
pub mod transform;

pub use branch::Branch;
pub use comparison::{BetterProduct, ComparisonResult, Subscriber};
pub use product::{CanonicalProductRow, ProductBatch, ProductKey, ProductType, RawProductRecord};
pub use transform::{build_batch, transform_records, TransformReport};
