//! The notify/skip decision taken after the comparison step.

use crate::comparison::ComparisonResult;
use std::fmt;

/// Downstream path chosen from a comparison result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    /// There are newly better offers; notify subscribers
    Notify,
    /// Nothing to report
    Skip,
}

impl Branch {
    /// Select the path for a comparison result.
    ///
    /// Pure: no I/O, and the same result always selects the same path.
    ///
    /// # Examples
    ///
    /// ```
    /// use rates_core::{Branch, BetterProduct, ComparisonResult};
    ///
    /// assert_eq!(Branch::select(&ComparisonResult::absent()), Branch::Skip);
    ///
    /// let found = ComparisonResult::from_entries(vec![BetterProduct::default()]);
    /// assert_eq!(Branch::select(&found), Branch::Notify);
    /// ```
    pub fn select(result: &ComparisonResult) -> Branch {
        if result.is_empty() {
            Branch::Skip
        } else {
            Branch::Notify
        }
    }

    /// Display name of the path.
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Notify => "notify",
            Branch::Skip => "skip",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::BetterProduct;

    #[test]
    fn test_exactly_one_path() {
        for n in 0..4 {
            let result = ComparisonResult::from_entries(vec![BetterProduct::default(); n]);
            let branch = Branch::select(&result);
            assert_eq!(branch == Branch::Notify, n > 0);
            assert_eq!(branch == Branch::Skip, n == 0);
        }
    }

    #[test]
    fn test_select_is_repeatable() {
        let result = ComparisonResult::from_entries(vec![BetterProduct::default()]);
        assert_eq!(Branch::select(&result), Branch::select(&result));
    }
}
