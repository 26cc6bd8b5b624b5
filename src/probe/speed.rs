//! HTTP throughput probe.
//!
//! Downloads a payload and uploads a payload of zero bytes, timing each
//! transfer. Throughput is reported in bits per second.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::probe::{ProbeError, SampleSource};
use crate::storage::SpeedSample;

/// Default download endpoint (25 MB payload).
pub const DEFAULT_DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down?bytes=25000000";

/// Default upload endpoint.
pub const DEFAULT_UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";

/// Default upload payload size (10 MB).
const DEFAULT_UPLOAD_BYTES: usize = 10_000_000;

/// Default timeout per transfer (60 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

fn default_download_url() -> String {
    DEFAULT_DOWNLOAD_URL.to_string()
}

fn default_upload_url() -> String {
    DEFAULT_UPLOAD_URL.to_string()
}

fn default_upload_bytes() -> usize {
    DEFAULT_UPLOAD_BYTES
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Configuration for the HTTP speed probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSpeedConfig {
    /// URL whose response body is downloaded.
    #[serde(default = "default_download_url")]
    pub download_url: String,
    /// URL that receives the upload payload via POST.
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// Upload payload size in bytes (default: 10 MB).
    #[serde(default = "default_upload_bytes")]
    pub upload_bytes: usize,
    /// Timeout per transfer (default: 60s).
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HttpSpeedConfig {
    fn default() -> Self {
        Self {
            download_url: default_download_url(),
            upload_url: default_upload_url(),
            upload_bytes: DEFAULT_UPLOAD_BYTES,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpSpeedConfig {
    /// Create a configuration for the given endpoints.
    pub fn new(download_url: impl Into<String>, upload_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            upload_url: upload_url.into(),
            ..Self::default()
        }
    }

    /// Set the upload payload size.
    pub fn with_upload_bytes(mut self, bytes: usize) -> Self {
        self.upload_bytes = bytes;
        self
    }

    /// Set the per-transfer timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `ProbeError::Config` for a non-HTTP URL, an empty upload
    /// payload or a zero timeout.
    pub fn validate(&self) -> Result<(), ProbeError> {
        for (field, raw) in [
            ("download_url", &self.download_url),
            ("upload_url", &self.upload_url),
        ] {
            let url = url::Url::parse(raw)
                .map_err(|e| ProbeError::Config(format!("{field}: invalid URL '{raw}': {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ProbeError::Config(format!(
                    "{field}: unsupported scheme '{}'",
                    url.scheme()
                )));
            }
        }
        if self.upload_bytes == 0 {
            return Err(ProbeError::Config(
                "upload_bytes must be positive".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ProbeError::Config("timeout must be positive".to_string()));
        }
        Ok(())
    }
}

/// Throughput probe over HTTP.
pub struct HttpSpeedProbe {
    config: HttpSpeedConfig,
    client: Client,
}

impl HttpSpeedProbe {
    /// Create a probe from a validated configuration.
    ///
    /// # Errors
    /// Returns `ProbeError::Config` if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: HttpSpeedConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProbeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpSpeedConfig {
        &self.config
    }

    /// Measure download then upload throughput.
    ///
    /// Blocks the calling task for the duration of both transfers.
    pub async fn measure(&self) -> Result<SpeedSample, ProbeError> {
        let download_bps = self.download().await?;
        let upload_bps = self.upload().await?;

        tracing::debug!(
            download_mbps = download_bps / 1_000_000.0,
            upload_mbps = upload_bps / 1_000_000.0,
            "Speed measured"
        );
        Ok(SpeedSample::new(download_bps, upload_bps))
    }

    async fn download(&self) -> Result<f64, ProbeError> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(&self.config.download_url)
            .send()
            .await?
            .error_for_status()?;

        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            bytes += chunk.len() as u64;
        }

        bits_per_second(bytes, start.elapsed())
    }

    async fn upload(&self) -> Result<f64, ProbeError> {
        let payload = vec![0u8; self.config.upload_bytes];
        let bytes = payload.len() as u64;

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.upload_url)
            .body(payload)
            .send()
            .await?
            .error_for_status()?;
        // Drain so the timing covers the full exchange
        response.bytes().await?;

        bits_per_second(bytes, start.elapsed())
    }
}

impl std::fmt::Debug for HttpSpeedProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSpeedProbe")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SampleSource for HttpSpeedProbe {
    type Sample = SpeedSample;

    fn name(&self) -> &str {
        "http-speed"
    }

    async fn sample(&self) -> Result<SpeedSample, ProbeError> {
        self.measure().await.inspect_err(|e| {
            tracing::error!(error = %e, "Error measuring speed");
        })
    }
}

fn bits_per_second(bytes: u64, elapsed: Duration) -> Result<f64, ProbeError> {
    if bytes == 0 {
        return Err(ProbeError::Unavailable(
            "transfer carried no payload".to_string(),
        ));
    }
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return Err(ProbeError::Unavailable(
            "transfer finished in zero time".to_string(),
        ));
    }
    Ok(bytes as f64 * 8.0 / secs)
}
