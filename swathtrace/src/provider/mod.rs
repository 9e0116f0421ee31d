//! Satellite imagery provider abstraction
//!
//! This module defines the [`ImageryProvider`] trait used by the tile
//! resolver, and the Sentinel Hub implementation used in production.
//! Tests substitute their own providers behind the same trait.
//!
//! ```ignore
//! use swathtrace::provider::{ReqwestClient, SentinelHubConfig, SentinelHubProvider};
//!
//! let http_client = ReqwestClient::with_timeout(60)?;
//! let provider = SentinelHubProvider::new(http_client, SentinelHubConfig::default());
//! ```

mod http;
mod sentinel;
mod types;

pub use http::{classify_status, HttpClient, ReqwestClient};
pub use sentinel::{
    decode_single_tiff, download_evalscript, DecodedImage, SentinelHubConfig, SentinelHubProvider,
    DEFAULT_BASE_URL, DEFAULT_COLLECTION, DEFAULT_TOKEN_URL,
};
pub use types::{
    CoverageMask, CoverageRequest, DownloadRequest, ImageryProvider, ProviderError, TimeWindow,
    TimeWindows, WindowKind,
};
