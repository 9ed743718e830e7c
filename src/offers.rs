use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Maps reason tags to dealer service offers. Versioned config, loaded once
/// at startup alongside the score weights.
#[derive(Debug, Clone, Deserialize)]
pub struct OffersConfig {
    pub version: String,
    pub mapping: HashMap<String, Vec<String>>,
}

impl OffersConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("failed to read {}: {}", path.as_ref().display(), e)
        })?;
        let cfg: Self = serde_json::from_str(&raw)?;
        tracing::info!("Service offers loaded (version {})", cfg.version);
        Ok(cfg)
    }

    /// Union of the offers mapped from each tag, deduplicated, input order
    /// preserved. Unknown tags contribute nothing.
    pub fn map_tags_to_offers(&self, tags: &[String]) -> Vec<String> {
        let mut offers: Vec<String> = Vec::new();
        for tag in tags {
            for offer in self.mapping.get(tag).into_iter().flatten() {
                if !offers.iter().any(|o| o == offer) {
                    offers.push(offer.clone());
                }
            }
        }
        offers
    }
}
