//! Media lookup for preview and price images.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use shopbot_store::Segment;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Preview,
    Prices,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Prices => "prices",
        }
    }
}

/// Resolves the photos (Telegram file ids or URLs) shown for a segment.
pub trait MediaLibrary: Send + Sync {
    fn assets(&self, segment: Segment, kind: MediaKind) -> Vec<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Library backed by a JSON manifest such as
/// `{"ks_preview": ["AgAC..."], "gs_prices": ["https://cdn/p.jpg"]}`.
pub struct ManifestMediaLibrary {
    entries: BTreeMap<String, Vec<String>>,
}

fn manifest_key(segment: Segment, kind: MediaKind) -> String {
    format!("{}_{}", segment.code(), kind.as_str())
}

impl ManifestMediaLibrary {
    pub fn from_entries(entries: BTreeMap<String, Vec<String>>) -> Self {
        let known = [MediaKind::Preview, MediaKind::Prices]
            .into_iter()
            .flat_map(|kind| Segment::ALL.map(|segment| manifest_key(segment, kind)))
            .collect::<Vec<_>>();
        for key in entries.keys() {
            if !known.contains(key) {
                warn!("media manifest key ignored: key={key}");
            }
        }
        let entries = entries
            .into_iter()
            .map(|(key, assets)| {
                let assets = assets
                    .into_iter()
                    .map(|asset| asset.trim().to_string())
                    .filter(|asset| !asset.is_empty())
                    .collect();
                (key, assets)
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read media manifest {}", path.display()))?;
        let entries = serde_json::from_str::<BTreeMap<String, Vec<String>>>(&raw)
            .with_context(|| format!("failed to parse media manifest {}", path.display()))?;
        Ok(Self::from_entries(entries))
    }
}

impl MediaLibrary for ManifestMediaLibrary {
    fn assets(&self, segment: Segment, kind: MediaKind) -> Vec<String> {
        self.entries
            .get(&manifest_key(segment, kind))
            .cloned()
            .unwrap_or_default()
    }
}
