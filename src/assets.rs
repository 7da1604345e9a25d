//! Symbol → asset-index catalog.
//!
//! The wire protocol identifies markets by the zero-based position of their
//! symbol in the exchange's `universe` array, not by name. The catalog
//! fetches that array once, on the first call that needs an index, and is
//! immutable afterwards. Concurrent first callers share a single fetch.

use std::collections::HashMap;

use tokio::sync::OnceCell;

use crate::{
    error::{Error, Result},
    http::Client,
    types::AssetInfo,
};

/// A catalogued asset: its wire index plus the universe metadata.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Zero-based position in the universe array.
    pub index: u64,
    pub info: AssetInfo,
}

/// Lazily populated, then read-only, symbol → index map.
#[derive(Default)]
pub struct AssetCatalog {
    entries: OnceCell<HashMap<String, CatalogEntry>>,
}

impl AssetCatalog {
    /// Creates an empty catalog. The first resolution populates it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn populate(&self, client: &Client) -> Result<&HashMap<String, CatalogEntry>> {
        self.entries
            .get_or_try_init(|| async {
                let meta = client.meta().await?;
                log::debug!("asset catalog populated with {} assets", meta.universe.len());
                Ok(meta
                    .universe
                    .into_iter()
                    .enumerate()
                    .map(|(index, info)| {
                        (
                            info.name.clone(),
                            CatalogEntry {
                                index: index as u64,
                                info,
                            },
                        )
                    })
                    .collect())
            })
            .await
    }

    /// Resolves a base symbol to its asset index, fetching the universe on
    /// first use.
    ///
    /// # Errors
    ///
    /// [`Error::AssetNotFound`] when the symbol is not in the universe;
    /// transport errors from the one-time metadata fetch.
    pub async fn index_of(&self, client: &Client, symbol: &str) -> Result<u64> {
        Ok(self.entry(client, symbol).await?.index)
    }

    /// Resolves a base symbol to its full catalog entry.
    pub async fn entry(&self, client: &Client, symbol: &str) -> Result<CatalogEntry> {
        let entries = self.populate(client).await?;
        entries
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::AssetNotFound {
                symbol: symbol.to_string(),
            })
    }

    /// Returns whether the catalog has been populated yet.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.entries.initialized()
    }
}
