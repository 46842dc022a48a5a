//! Discount resolution.
//!
//! Rounding is always up to the next whole currency unit, and fixed-amount
//! discounts never push a price below 1.

use shopbot_store::{DiscountDescriptor, PackageKey, PriceCatalogue};

/// Resolves the discounted price for `base_price`.
///
/// Returns `None` when no descriptor is present or the descriptor has no entry
/// for `package`; callers then charge `base_price`.
pub fn resolve_price(
    base_price: u32,
    descriptor: Option<&DiscountDescriptor>,
    package: Option<PackageKey>,
) -> Option<u32> {
    match descriptor? {
        DiscountDescriptor::Percent { value } => Some(apply_percent(base_price, *value)),
        DiscountDescriptor::Euro { packages } => {
            let amount = packages.get(&package?)?;
            Some(base_price.saturating_sub(*amount).max(1))
        }
        DiscountDescriptor::PercentPackages { packages } => {
            let value = packages.get(&package?)?;
            Some(apply_percent(base_price, *value))
        }
    }
}

fn apply_percent(base_price: u32, percent: u32) -> u32 {
    let kept = u64::from(100 - percent.min(100));
    let scaled = u64::from(base_price) * kept;
    // ceil(scaled / 100)
    let rounded = scaled.div_ceil(100);
    u32::try_from(rounded).unwrap_or(base_price)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceQuote {
    pub package: PackageKey,
    pub base_price: u32,
    pub discounted_price: Option<u32>,
}

impl PriceQuote {
    /// Price actually charged.
    pub fn final_price(&self) -> u32 {
        self.discounted_price.unwrap_or(self.base_price)
    }

    /// True when a descriptor lowered the price.
    pub fn is_discounted(&self) -> bool {
        self.discounted_price
            .map(|price| price < self.base_price)
            .unwrap_or(false)
    }
}

pub fn quote_package(
    catalogue: &PriceCatalogue,
    descriptor: Option<&DiscountDescriptor>,
    package: PackageKey,
) -> PriceQuote {
    let base_price = catalogue.base_price(package);
    PriceQuote {
        package,
        base_price,
        discounted_price: resolve_price(base_price, descriptor, Some(package)),
    }
}
