//! Opens a document from the network, falling back to a blob saved for offline reading.

use std::rc::Rc;

use async_trait::async_trait;

use crate::cancel::{CancellationToken, Generations};
use crate::error::{ApiError, Result, ViewerError};

#[async_trait(?Send)]
pub trait ByteFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, ApiError>;
}

#[async_trait(?Send)]
pub trait OfflineBlobs {
    async fn get(&self, document_id: &str) -> std::result::Result<Option<Vec<u8>>, ApiError>;
}

/// Parses document bytes. The same engine later rasterizes pages.
#[async_trait(?Send)]
pub trait DocumentEngine {
    /// Returns the page count.
    async fn open(&self, bytes: Vec<u8>) -> std::result::Result<u32, String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrigin {
    Network,
    Offline,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoadedDocument {
    pub document_id: String,
    pub page_count: u32,
    pub origin: ByteOrigin,
}

pub struct DocumentLoader {
    fetcher: Rc<dyn ByteFetcher>,
    offline: Rc<dyn OfflineBlobs>,
    engine: Rc<dyn DocumentEngine>,
    generations: Generations,
}

impl DocumentLoader {
    pub fn new(
        fetcher: Rc<dyn ByteFetcher>,
        offline: Rc<dyn OfflineBlobs>,
        engine: Rc<dyn DocumentEngine>,
    ) -> Self {
        Self {
            fetcher,
            offline,
            engine,
            generations: Generations::new(),
        }
    }

    /// A newer `load` or `destroy` makes this one resolve to `LoadCancelled`.
    pub async fn load(&self, document_id: &str, source_url: Option<&str>) -> Result<LoadedDocument> {
        let (generation, token) = self.generations.begin();
        let result = self.load_inner(document_id, source_url, &token).await;
        if token.is_cancelled() || !self.generations.is_current(generation) {
            return Err(ViewerError::LoadCancelled);
        }
        self.generations.finish(generation);
        result
    }

    pub fn destroy(&self) {
        self.generations.cancel();
    }

    async fn load_inner(
        &self,
        document_id: &str,
        source_url: Option<&str>,
        token: &CancellationToken,
    ) -> Result<LoadedDocument> {
        let unavailable = || ViewerError::DocumentUnavailable {
            document_id: document_id.to_string(),
        };
        let (bytes, origin) = match self.fetch_network(source_url).await {
            Some(bytes) => (bytes, ByteOrigin::Network),
            None => {
                if token.is_cancelled() {
                    return Err(ViewerError::LoadCancelled);
                }
                let bytes = match self.offline.get(document_id).await {
                    Ok(Some(bytes)) if !bytes.is_empty() => bytes,
                    Ok(_) => return Err(unavailable()),
                    Err(error) => {
                        log::warn!("offline lookup for {document_id} failed: {error}");
                        return Err(unavailable());
                    }
                };
                (bytes, ByteOrigin::Offline)
            }
        };
        if token.is_cancelled() {
            return Err(ViewerError::LoadCancelled);
        }
        let page_count = match self.engine.open(bytes).await {
            Ok(count) if count > 0 => count,
            Ok(_) => {
                log::warn!("document {document_id} has no pages");
                return Err(unavailable());
            }
            Err(reason) => {
                log::warn!("document {document_id} could not be parsed: {reason}");
                return Err(unavailable());
            }
        };
        log::info!("opened {document_id}: {page_count} pages from {origin:?}");
        Ok(LoadedDocument {
            document_id: document_id.to_string(),
            page_count,
            origin,
        })
    }

    async fn fetch_network(&self, source_url: Option<&str>) -> Option<Vec<u8>> {
        let url = source_url?;
        match self.fetcher.fetch(url).await {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => {
                log::warn!("{url} returned an empty body, trying the offline copy");
                None
            }
            Err(error) => {
                log::warn!("fetching {url} failed ({error}), trying the offline copy");
                None
            }
        }
    }
}
