//! Currency set resolution for a run.

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::contract::CurrencyConverter;

/// Base currency plus every allowed currency with a usable exchange rate.
///
/// Built once at run start and immutable afterwards. The base currency is
/// always first; the remaining codes keep their configured order.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencySet {
    base: String,
    codes: Vec<String>,
}

impl CurrencySet {
    /// Resolve the set, dropping currencies whose rate is unknown or zero.
    pub fn resolve(base: &str, allowed: &[String], converter: &dyn CurrencyConverter) -> Self {
        let base = base.trim().to_ascii_uppercase();
        let mut codes = vec![base.clone()];

        for code in allowed {
            let code = code.trim().to_ascii_uppercase();
            if code.is_empty() || codes.contains(&code) {
                continue;
            }
            match converter.rate(&base, &code) {
                Some(rate) if rate > Decimal::ZERO => {
                    debug!(base = %base, currency = %code, %rate, "Currency enabled for feed");
                    codes.push(code);
                }
                other => {
                    warn!(base = %base, currency = %code, rate = ?other, "Skipping currency without exchange rate");
                }
            }
        }

        Self { base, codes }
    }

    /// A set holding only the base currency.
    pub fn base_only(base: &str) -> Self {
        let base = base.trim().to_ascii_uppercase();
        Self {
            codes: vec![base.clone()],
            base,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// All codes, base first.
    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}
