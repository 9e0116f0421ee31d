//! Sentinel Hub imagery provider.
//!
//! Talks to the Sentinel Hub Process API for Sentinel-2 L2A data.
//!
//! # API Endpoints
//!
//! - Token: `{token_url}` (OAuth2 client-credentials grant)
//! - Process: `{base_url}/api/v1/process`
//!
//! # Requests
//!
//! Every request names a WGS84 bounding box, an acquisition time range and
//! an output size in pixels. Mosaicking uses the most recent acquisition and
//! accepts any cloud cover. The pixel values come from an evalscript:
//!
//! - coverage queries return the single `dataMask` band;
//! - downloads return the 13 canonical bands as UINT8, reflectances scaled
//!   by 255 and `CLD` passed through unchanged.
//!
//! # Responses
//!
//! Responses are single-image TIFFs with interleaved samples. An empty body,
//! a TIFF holding more than one image, or the wrong band count are protocol
//! errors.

use std::io::Cursor;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::ColorType;
use tracing::{debug, trace};

use super::http::HttpClient;
use super::types::{
    CoverageMask, CoverageRequest, DownloadRequest, ImageryProvider, ProviderError, TimeWindow,
};
use crate::geo::BBox;
use crate::raster::{BandRaster, BANDS, BAND_COUNT, CLOUD_BAND};

/// Default Process API host.
pub const DEFAULT_BASE_URL: &str = "https://services.sentinel-hub.com";

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URL: &str =
    "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token";

/// Default data collection.
pub const DEFAULT_COLLECTION: &str = "sentinel-2-l2a";

const CRS84: &str = "http://www.opengis.net/def/crs/OGC/1.3/CRS84";

/// Tokens are refreshed this long before they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(60);

const COVERAGE_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
    return {
        input: ["dataMask"],
        output: {
            bands: 1,
            sampleType: "UINT8"
        }
    };
}

function evaluatePixel(sample) {
    return [sample.dataMask];
}
"#;

/// Connection settings for Sentinel Hub.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub token_url: String,
    pub collection: String,
}

impl Default for SentinelHubConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct AccessToken {
    value: String,
    refresh_at: Instant,
}

/// Sentinel Hub Process API provider.
///
/// # Example
///
/// ```no_run
/// use swathtrace::provider::{ReqwestClient, SentinelHubConfig, SentinelHubProvider};
///
/// let client = ReqwestClient::new().unwrap();
/// let config = SentinelHubConfig {
///     client_id: "id".into(),
///     client_secret: "secret".into(),
///     ..SentinelHubConfig::default()
/// };
/// let provider = SentinelHubProvider::new(client, config);
/// ```
pub struct SentinelHubProvider<C: HttpClient> {
    http_client: C,
    config: SentinelHubConfig,
    token: Mutex<Option<AccessToken>>,
}

impl<C: HttpClient> SentinelHubProvider<C> {
    pub fn new(http_client: C, config: SentinelHubConfig) -> Self {
        Self {
            http_client,
            config,
            token: Mutex::new(None),
        }
    }

    fn process_url(&self) -> String {
        format!("{}/api/v1/process", self.config.base_url.trim_end_matches('/'))
    }

    /// Returns a cached token or fetches a new one.
    fn access_token(&self) -> Result<String, ProviderError> {
        let mut guard = self.token.lock();
        if let Some(token) = guard.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        if self.config.client_id.is_empty() || self.config.client_secret.is_empty() {
            return Err(ProviderError::Auth(
                "Sentinel Hub client_id and client_secret are not configured".to_string(),
            ));
        }

        debug!(url = %self.config.token_url, "Requesting Sentinel Hub access token");
        let body = self.http_client.post_form(
            &self.config.token_url,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ],
        )?;
        let response: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| ProviderError::Auth(format!("Malformed token response: {}", e)))?;

        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        let token = AccessToken {
            value: response.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_MARGIN),
        };
        let value = token.value.clone();
        *guard = Some(token);
        Ok(value)
    }

    fn request_body(
        &self,
        bbox: &BBox,
        window: &TimeWindow,
        width_px: u32,
        height_px: u32,
        evalscript: &str,
    ) -> serde_json::Value {
        json!({
            "input": {
                "bounds": {
                    "bbox": [bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat],
                    "properties": { "crs": CRS84 }
                },
                "data": [{
                    "type": self.config.collection,
                    "dataFilter": {
                        "timeRange": {
                            "from": format!("{}T00:00:00Z", window.start),
                            "to": format!("{}T23:59:59Z", window.end)
                        },
                        "mosaickingOrder": "mostRecent",
                        "maxCloudCoverage": 100
                    }
                }]
            },
            "output": {
                "width": width_px,
                "height": height_px,
                "responses": [{
                    "identifier": "default",
                    "format": { "type": "image/tiff" }
                }]
            },
            "evalscript": evalscript
        })
    }

    fn process(&self, body: &serde_json::Value) -> Result<Vec<u8>, ProviderError> {
        let token = self.access_token()?;
        self.http_client
            .post_json(&self.process_url(), Some(&token), body)
    }
}

impl<C: HttpClient> ImageryProvider for SentinelHubProvider<C> {
    fn coverage(&self, request: &CoverageRequest) -> Result<CoverageMask, ProviderError> {
        trace!(bbox = %request.bbox, window = %request.window.kind, "Coverage query");
        let body = self.request_body(
            &request.bbox,
            &request.window,
            request.width_px,
            request.height_px,
            COVERAGE_EVALSCRIPT,
        );
        let bytes = self.process(&body)?;
        let image = decode_single_tiff(&bytes)?;
        if image.samples != 1 {
            return Err(ProviderError::BandMismatch {
                expected: 1,
                actual: image.samples,
            });
        }
        Ok(CoverageMask {
            width: image.width,
            height: image.height,
            data: image.data,
        })
    }

    fn download(&self, request: &DownloadRequest) -> Result<BandRaster, ProviderError> {
        trace!(bbox = %request.bbox, window = %request.window.kind, "Tile download");
        let body = self.request_body(
            &request.bbox,
            &request.window,
            request.width_px,
            request.height_px,
            &download_evalscript(),
        );
        let bytes = self.process(&body)?;
        let image = decode_single_tiff(&bytes)?;
        if image.samples != BAND_COUNT {
            return Err(ProviderError::BandMismatch {
                expected: BAND_COUNT,
                actual: image.samples,
            });
        }
        BandRaster::from_interleaved(image.height as usize, image.width as usize, image.data)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn name(&self) -> &str {
        "Sentinel Hub"
    }
}

/// Evalscript returning all 13 bands as UINT8.
pub fn download_evalscript() -> String {
    let quoted = BANDS
        .iter()
        .map(|b| format!("\"{}\"", b))
        .collect::<Vec<_>>()
        .join(", ");
    let values = BANDS
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if i == CLOUD_BAND {
                format!("        sample.{}", b)
            } else {
                format!("        sample.{} * 255", b)
            }
        })
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"//VERSION=3
function setup() {{
    return {{
        input: [{{
            bands: [{quoted}],
        }}],
        output: {{
            bands: {count},
            sampleType: "UINT8"
        }}
    }};
}}

function evaluatePixel(sample) {{
    return [
{values}
    ];
}}
"#,
        quoted = quoted,
        count = BAND_COUNT,
        values = values
    )
}

/// A decoded, interleaved 8-bit image.
#[derive(Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub samples: usize,
    pub data: Vec<u8>,
}

fn tiff_err(e: tiff::TiffError) -> ProviderError {
    ProviderError::InvalidResponse(format!("TIFF decode failed: {}", e))
}

/// Decodes a response that must hold exactly one 8-bit TIFF image.
pub fn decode_single_tiff(bytes: &[u8]) -> Result<DecodedImage, ProviderError> {
    if bytes.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    let mut decoder = Decoder::new(Cursor::new(bytes))
        .map_err(tiff_err)?
        .with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let samples = match decoder.colortype().map_err(tiff_err)? {
        ColorType::Gray(8) => 1,
        ColorType::GrayA(8) => 2,
        ColorType::RGB(8) => 3,
        ColorType::RGBA(8) | ColorType::CMYK(8) => 4,
        ColorType::Multiband {
            bit_depth: 8,
            num_samples,
        } => usize::from(num_samples),
        other => {
            return Err(ProviderError::InvalidResponse(format!(
                "Unsupported TIFF color type {:?}",
                other
            )))
        }
    };

    let data = match decoder.read_image().map_err(tiff_err)? {
        DecodingResult::U8(data) => data,
        _ => {
            return Err(ProviderError::InvalidResponse(
                "Expected 8-bit samples".to_string(),
            ))
        }
    };

    if decoder.more_images() {
        return Err(ProviderError::MultiplePayloads(2));
    }

    let expected = width as usize * height as usize * samples;
    if data.len() != expected {
        return Err(ProviderError::InvalidResponse(format!(
            "TIFF holds {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    Ok(DecodedImage {
        width,
        height,
        samples,
        data,
    })
}
