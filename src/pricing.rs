//! # pricing: price rollups for the product feed
//!
//! Computes the `Prices`, `SalePrices` and `GroupPrices` fields of a product
//! row. Amounts are first resolved in the base currency per structural type:
//!
//! - **Simple**: the regular price, and the lower of the sale rule result and
//!   the product's final price as the sale price.
//! - **VariantParent / Grouped**: min/max rolled up over the enabled children,
//!   each child priced on its own with tax included.
//! - **Bundle**: taken as-is from the store's bundle calculator.
//!
//! Tax is then applied to the range, except for variant parents whose totals
//! already include tax through their children. Finally the range is expanded
//! into one `"<amount> <code>"` token per currency and slot.
//!
//! Regular prices do not depend on the customer tier, so they are rolled up
//! once per product; only the final prices are recomputed for each tier.
//!
//! Pricing never fails: a product without a resolvable price is priced at zero.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::contract::{BundlePriceCalculator, BundlePrices, CurrencyConverter, TaxCalculator};
use crate::currency::CurrencySet;
use crate::models::{Product, ProductType, TierId};

/// Resolved price range in base currency.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
    pub final_min: Decimal,
    pub final_max: Decimal,
}

impl From<BundlePrices> for PriceRange {
    fn from(b: BundlePrices) -> Self {
        Self {
            min: b.min,
            max: b.max,
            final_min: b.final_min,
            final_max: b.final_max,
        }
    }
}

/// Running min/max over children. `None` means no child has contributed yet,
/// so a legitimately free child still counts as a price.
#[derive(Debug, Clone, Copy, Default)]
struct Rollup {
    min: Option<Decimal>,
    max: Option<Decimal>,
    final_min: Option<Decimal>,
    final_max: Option<Decimal>,
}

impl Rollup {
    fn include_regular(&mut self, min: Decimal, max: Decimal) {
        self.min = Some(self.min.map_or(min, |m| m.min(min)));
        self.max = Some(self.max.map_or(max, |m| m.max(max)));
    }

    fn include_final(&mut self, final_min: Decimal, final_max: Decimal) {
        self.final_min = Some(self.final_min.map_or(final_min, |m| m.min(final_min)));
        self.final_max = Some(self.final_max.map_or(final_max, |m| m.max(final_max)));
    }

    fn resolve(self) -> PriceRange {
        PriceRange {
            min: self.min.unwrap_or_default(),
            max: self.max.unwrap_or_default(),
            final_min: self.final_min.unwrap_or_default(),
            final_max: self.final_max.unwrap_or_default(),
        }
    }
}

/// Formatted prices for one pricing context.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PriceSummary {
    pub prices: Vec<String>,
    pub sale_prices: Vec<String>,
}

/// Price fields of a product row.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProductPrices {
    pub prices: Vec<String>,
    pub sale_prices: Vec<String>,
    /// Per customer tier, keyed by tier id.
    pub group_prices: BTreeMap<String, PriceSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PricingOptions {
    pub include_tax: bool,
    pub tier_pricing: bool,
}

/// Child price whose tier independent part has been resolved once.
struct PreparedChild<'p> {
    product: &'p Product,
    regular: PriceRange,
}

pub struct PriceAggregator<'a> {
    tax: &'a dyn TaxCalculator,
    converter: &'a dyn CurrencyConverter,
    bundles: &'a dyn BundlePriceCalculator,
}

impl<'a> PriceAggregator<'a> {
    pub fn new(
        tax: &'a dyn TaxCalculator,
        converter: &'a dyn CurrencyConverter,
        bundles: &'a dyn BundlePriceCalculator,
    ) -> Self {
        Self {
            tax,
            converter,
            bundles,
        }
    }

    /// Compute all price fields of `product`.
    ///
    /// `children` may contain disabled products; they are ignored. The tier-less
    /// baseline is always computed; per tier prices only when tier pricing is on.
    pub fn summarize(
        &self,
        product: &Product,
        children: &[Product],
        currencies: &CurrencySet,
        tiers: &[TierId],
        options: PricingOptions,
    ) -> ProductPrices {
        let prepared = self.prepare(children);

        let baseline = self.base_range(product, &prepared, None, options.include_tax);
        let PriceSummary {
            prices,
            sale_prices,
        } = self.expand(&baseline, currencies);

        let mut group_prices = BTreeMap::new();
        if options.tier_pricing {
            for tier in tiers {
                let range = self.base_range(product, &prepared, Some(*tier), options.include_tax);
                group_prices.insert(tier.to_string(), self.expand(&range, currencies));
            }
        }

        tracing::trace!(
            product_id = product.id,
            children = prepared.len(),
            ?baseline,
            "Priced product"
        );

        ProductPrices {
            prices,
            sale_prices,
            group_prices,
        }
    }

    /// Base currency range for one pricing context.
    pub fn range(
        &self,
        product: &Product,
        children: &[Product],
        tier: Option<TierId>,
        include_tax: bool,
    ) -> PriceRange {
        let prepared = self.prepare(children);
        self.base_range(product, &prepared, tier, include_tax)
    }

    fn prepare<'p>(&self, children: &'p [Product]) -> Vec<PreparedChild<'p>> {
        children
            .iter()
            .filter(|child| child.enabled)
            .map(|child| PreparedChild {
                product: child,
                regular: self.child_regular(child),
            })
            .collect()
    }

    fn base_range(
        &self,
        product: &Product,
        children: &[PreparedChild<'_>],
        tier: Option<TierId>,
        include_tax: bool,
    ) -> PriceRange {
        match product.product_type {
            ProductType::Simple => {
                let range = simple_range(product, tier);
                self.apply_tax(product, range, include_tax)
            }
            ProductType::VariantParent => self.rollup(children, tier),
            ProductType::Grouped => {
                let range = self.rollup(children, tier);
                self.apply_tax(product, range, include_tax)
            }
            ProductType::Bundle => {
                let range = PriceRange::from(self.bundles.prices(product, tier));
                self.apply_tax(product, range, include_tax)
            }
        }
    }

    fn rollup(&self, children: &[PreparedChild<'_>], tier: Option<TierId>) -> PriceRange {
        let mut rollup = Rollup::default();
        for child in children {
            let range = self.child_range(child, tier);
            rollup.include_regular(range.min, range.max);
            rollup.include_final(range.final_min, range.final_max);
        }
        rollup.resolve()
    }

    /// Tier independent part of a child's range, tax included.
    fn child_regular(&self, child: &Product) -> PriceRange {
        let range = match child.product_type {
            ProductType::Bundle => PriceRange::from(self.bundles.prices(child, None)),
            _ => simple_range(child, None),
        };
        self.apply_tax(child, range, true)
    }

    fn child_range(&self, child: &PreparedChild<'_>, tier: Option<TierId>) -> PriceRange {
        let product = child.product;
        let finals = match product.product_type {
            ProductType::Bundle => {
                let prices = self.bundles.prices(product, tier);
                (prices.final_min, prices.final_max)
            }
            _ => {
                let range = simple_range(product, tier);
                (range.final_min, range.final_max)
            }
        };
        PriceRange {
            min: child.regular.min,
            max: child.regular.max,
            final_min: self.tax.price(product, finals.0, true),
            final_max: self.tax.price(product, finals.1, true),
        }
    }

    fn apply_tax(&self, product: &Product, range: PriceRange, include_tax: bool) -> PriceRange {
        PriceRange {
            min: self.tax.price(product, range.min, include_tax),
            max: self.tax.price(product, range.max, include_tax),
            final_min: self.tax.price(product, range.final_min, include_tax),
            final_max: self.tax.price(product, range.final_max, include_tax),
        }
    }

    /// Expand a base currency range into formatted tokens for every currency.
    pub fn expand(&self, range: &PriceRange, currencies: &CurrencySet) -> PriceSummary {
        let mut summary = PriceSummary::default();
        let base = currencies.base();

        for code in currencies.codes() {
            let convert = |amount: Decimal| {
                let amount = if code == base {
                    amount
                } else {
                    self.converter.convert(amount, base, code)
                };
                round_price(amount)
            };
            let min = convert(range.min);
            let max = convert(range.max);
            let final_min = convert(range.final_min);
            let final_max = convert(range.final_max);

            push_unique(&mut summary.prices, format_price(min, code));
            if final_min < min {
                push_unique(&mut summary.sale_prices, format_price(final_min, code));
            }
            if max > min {
                push_unique(&mut summary.prices, format_price(max, code));
                if final_max < max {
                    push_unique(&mut summary.sale_prices, format_price(final_max, code));
                }
            }
        }

        summary
    }
}

/// Regular and final price of a product read from its own price fields.
fn simple_range(product: &Product, tier: Option<TierId>) -> PriceRange {
    // TODO: surface products without a regular price instead of pricing them at zero.
    let regular = product.price.unwrap_or_default();
    let sale = match (product.rule_price_for(tier), product.final_price_for(tier)) {
        (Some(rule), Some(final_price)) => rule.min(final_price),
        (Some(rule), None) => rule,
        (None, Some(final_price)) => final_price,
        (None, None) => regular,
    };
    PriceRange {
        min: regular,
        max: regular,
        final_min: sale,
        final_max: sale,
    }
}

fn round_price(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

/// Two decimal places, half away from zero.
pub fn format_amount(amount: Decimal) -> String {
    round_price(amount).to_string()
}

fn format_price(amount: Decimal, code: &str) -> String {
    format!("{amount} {code}")
}

fn push_unique(tokens: &mut Vec<String>, token: String) {
    if !tokens.contains(&token) {
        tokens.push(token);
    }
}
