//! Fixed product catalogue: preview segments, media types, and packages.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Package sizes offered for every media type.
pub const PACKAGE_AMOUNTS: [u32; 3] = [10, 25, 35];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
/// Content category a visitor can preview or price.
pub enum Segment {
    #[serde(rename = "ks")]
    Small,
    #[serde(rename = "gs")]
    Large,
}

impl Segment {
    pub const ALL: [Segment; 2] = [Segment::Small, Segment::Large];

    pub fn code(self) -> &'static str {
        match self {
            Self::Small => "ks",
            Self::Large => "gs",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ks" => Some(Self::Small),
            "gs" => Some(Self::Large),
            _ => None,
        }
    }

    /// Upper-case code used in operator-facing text.
    pub fn label(self) -> &'static str {
        match self {
            Self::Small => "KS",
            Self::Large => "GS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Bilder,
    Videos,
}

impl MediaType {
    pub const ALL: [MediaType; 2] = [MediaType::Bilder, MediaType::Videos];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bilder => "bilder",
            Self::Videos => "videos",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Bilder => "Bilder",
            Self::Videos => "Videos",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bilder" => Some(Self::Bilder),
            "videos" => Some(Self::Videos),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageKeyError {
    #[error("unknown media type '{0}'")]
    UnknownMediaType(String),
    #[error("unsupported package amount {0}")]
    UnsupportedAmount(u32),
    #[error("malformed package key '{0}'")]
    Malformed(String),
}

/// A `{media_type}_{amount}` key drawn from the fixed catalogue.
///
/// Construction and deserialization both reject anything outside
/// `{bilder,videos} × PACKAGE_AMOUNTS`, so a stored discount can never name a
/// package that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageKey {
    media_type: MediaType,
    amount: u32,
}

impl PackageKey {
    pub fn new(media_type: MediaType, amount: u32) -> Result<Self, PackageKeyError> {
        if !PACKAGE_AMOUNTS.contains(&amount) {
            return Err(PackageKeyError::UnsupportedAmount(amount));
        }
        Ok(Self { media_type, amount })
    }

    /// Every package in catalogue order.
    pub fn all() -> Vec<PackageKey> {
        MediaType::ALL
            .iter()
            .flat_map(|media_type| {
                PACKAGE_AMOUNTS.iter().map(move |amount| PackageKey {
                    media_type: *media_type,
                    amount: *amount,
                })
            })
            .collect()
    }

    pub fn media_type(self) -> MediaType {
        self.media_type
    }

    pub fn amount(self) -> u32 {
        self.amount
    }

    /// Human label such as `10 Bilder`.
    pub fn label(self) -> String {
        format!("{} {}", self.amount, self.media_type.display_name())
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.media_type.as_str(), self.amount)
    }
}

impl FromStr for PackageKey {
    type Err = PackageKeyError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let (media_raw, amount_raw) = trimmed
            .rsplit_once('_')
            .ok_or_else(|| PackageKeyError::Malformed(trimmed.to_string()))?;
        let media_type = MediaType::parse(media_raw)
            .ok_or_else(|| PackageKeyError::UnknownMediaType(media_raw.to_string()))?;
        let amount = amount_raw
            .parse::<u32>()
            .map_err(|_| PackageKeyError::Malformed(trimmed.to_string()))?;
        PackageKey::new(media_type, amount)
    }
}

impl TryFrom<String> for PackageKey {
    type Error = PackageKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PackageKey> for String {
    fn from(value: PackageKey) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Base price (whole currency units) for every package.
pub struct PriceCatalogue {
    prices: BTreeMap<PackageKey, u32>,
}

impl Default for PriceCatalogue {
    fn default() -> Self {
        let defaults = [
            (MediaType::Bilder, [5, 10, 15]),
            (MediaType::Videos, [15, 25, 30]),
        ];
        let mut prices = BTreeMap::new();
        for (media_type, row) in defaults {
            for (amount, price) in PACKAGE_AMOUNTS.iter().zip(row) {
                prices.insert(
                    PackageKey {
                        media_type,
                        amount: *amount,
                    },
                    price,
                );
            }
        }
        Self { prices }
    }
}

impl PriceCatalogue {
    /// Applies `key=price` overrides separated by commas, e.g.
    /// `bilder_10=6,videos_35=29`. Unlisted packages keep their defaults.
    pub fn with_overrides(mut self, raw: &str) -> Result<Self> {
        for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let Some((key_raw, price_raw)) = entry.split_once('=') else {
                bail!("price override '{entry}' must use key=price");
            };
            let key = key_raw
                .parse::<PackageKey>()
                .with_context(|| format!("invalid package in price override '{entry}'"))?;
            let price = price_raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("invalid price in price override '{entry}'"))?;
            if price == 0 {
                bail!("price override '{entry}' must be greater than 0");
            }
            self.prices.insert(key, price);
        }
        Ok(self)
    }

    pub fn base_price(&self, key: PackageKey) -> u32 {
        self.prices.get(&key).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PackageKey, u32)> + '_ {
        self.prices.iter().map(|(key, price)| (*key, *price))
    }
}
