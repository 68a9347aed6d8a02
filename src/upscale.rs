// Client for the hosted upscaling inference provider.
//
// A job is submitted as a prediction (image as a base64 data URI plus fixed
// scale / face-enhance parameters), then polled until it reaches a terminal
// state. The provider returns a URL to the upscaled image, which is fetched
// and decoded separately.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Real-ESRGAN model version on the provider.
const MODEL_VERSION: &str = "350d32041630ffbe63c8352783a26d94126809164e54085352f8326e53999085";
const SCALE_FACTOR: u32 = 3;
const FACE_ENHANCE: bool = false;
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upscale client errors
#[derive(Debug, Error)]
pub enum UpscaleError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider API error {0}: {1}")]
    Api(u16, String),

    #[error("Upscale prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Prediction succeeded but returned no output URL")]
    MissingOutput,

    #[error("Fetching result image failed with status {0}")]
    FetchFailed(u16),

    #[error("Failed to decode result image: {0}")]
    ImageDecode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    version: &'static str,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    image: String,
    scale: u32,
    face_enhance: bool,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn error_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("prediction ended with status '{}'", self.status))
    }

    /// The provider returns either a single URI string or a list of them.
    fn output_url(&self) -> Option<String> {
        match self.output.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
            _ => None,
        }
    }
}

/// Client for the upscaling inference provider API
pub struct UpscaleClient {
    http_client: reqwest::Client,
    api_base: String,
    api_token: String,
}

impl UpscaleClient {
    pub fn new(
        api_base: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self, UpscaleError> {
        // Only the connect phase is bounded. Predictions and result downloads
        // have no deadline; they run as long as the provider needs.
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| UpscaleError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    /// Submit the image at `path` for upscaling and wait for the provider to
    /// finish, returning the URL of the upscaled result.
    pub async fn upscale(&self, path: &Path) -> Result<String, UpscaleError> {
        info!("Upscaling started for {}", path.display());

        let bytes = tokio::fs::read(path).await?;
        let request = PredictionRequest {
            version: MODEL_VERSION,
            input: PredictionInput {
                image: to_data_uri(&bytes),
                scale: SCALE_FACTOR,
                face_enhance: FACE_ENHANCE,
            },
        };

        let mut prediction = self.post_prediction(&request).await?;

        while !prediction.is_terminal() {
            debug!(
                "Prediction {} in progress (status: {})",
                prediction.id, prediction.status
            );
            tokio::time::sleep(POLL_INTERVAL).await;
            prediction = self.get_prediction(&prediction.id).await?;
        }

        if prediction.status != "succeeded" {
            warn!(
                "Prediction {} did not succeed: {}",
                prediction.id,
                prediction.error_message()
            );
            return Err(UpscaleError::PredictionFailed(prediction.error_message()));
        }

        let url = prediction.output_url().ok_or(UpscaleError::MissingOutput)?;
        info!("Upscaling completed for {}", path.display());
        Ok(url)
    }

    /// Download and decode the upscaled image the provider produced.
    pub async fn fetch_result_image(&self, url: &str) -> Result<DynamicImage, UpscaleError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| UpscaleError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Error fetching image from URL: {}", status);
            return Err(UpscaleError::FetchFailed(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpscaleError::Network(e.to_string()))?;

        image::load_from_memory(&bytes).map_err(|e| UpscaleError::ImageDecode(e.to_string()))
    }

    async fn post_prediction(
        &self,
        request: &PredictionRequest,
    ) -> Result<Prediction, UpscaleError> {
        let response = self
            .http_client
            .post(format!("{}/v1/predictions", self.api_base))
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| UpscaleError::Network(e.to_string()))?;

        Self::parse_prediction(response).await
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction, UpscaleError> {
        let response = self
            .http_client
            .get(format!("{}/v1/predictions/{}", self.api_base, id))
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| UpscaleError::Network(e.to_string()))?;

        Self::parse_prediction(response).await
    }

    async fn parse_prediction(response: reqwest::Response) -> Result<Prediction, UpscaleError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpscaleError::Api(status.as_u16(), body));
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| UpscaleError::Network(e.to_string()))
    }
}

/// Encode raw upload bytes as a data URI, guessing the media type from the
/// image content when possible.
fn to_data_uri(bytes: &[u8]) -> String {
    let media_type = image::guess_format(bytes)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| mime::APPLICATION_OCTET_STREAM.to_string());
    format!("data:{};base64,{}", media_type, BASE64.encode(bytes))
}
