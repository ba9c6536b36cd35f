//! Adapter for the external vision-analysis service.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use crate::models::job::{SourceImage, TargetKind};
use crate::models::target::{Label, SafeSearch, WebEntity};

/// Number of labels requested for frame verification.
const MAX_LABELS: u32 = 10;

/// Vision capabilities the pipeline relies on.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Content-safety likelihoods. The only gating signal for artworks.
    async fn detect_safety(&self, image: &SourceImage) -> Result<SafeSearch, VisionError>;

    async fn detect_web_entities(&self, image: &SourceImage)
        -> Result<Vec<WebEntity>, VisionError>;

    async fn detect_labels(&self, image: &SourceImage) -> Result<Vec<Label>, VisionError>;
}

/// Signals gathered for one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisionSignals {
    pub safe_search: SafeSearch,
    pub web_entities: Vec<WebEntity>,
    /// `None` for artworks, where label detection is not run.
    pub labels: Option<Vec<Label>>,
}

/// Run the three detections concurrently.
///
/// Web-entity and label failures are logged and degrade to empty results;
/// a content-safety failure fails the whole call.
pub async fn collect_signals(
    client: &dyn VisionClient,
    image: &SourceImage,
    kind: TargetKind,
) -> Result<VisionSignals, VisionError> {
    let labels = async {
        match kind {
            TargetKind::Frame => Some(client.detect_labels(image).await),
            TargetKind::Artwork => None,
        }
    };

    let (safety, web, labels) = tokio::join!(
        client.detect_safety(image),
        client.detect_web_entities(image),
        labels
    );

    let safe_search = safety?;

    let web_entities = web.unwrap_or_else(|e| {
        warn!(url = %image.url, error = %e, "Web entity detection failed");
        Vec::new()
    });

    let labels = labels.map(|result| {
        result.unwrap_or_else(|e| {
            warn!(url = %image.url, error = %e, "Label detection failed");
            Vec::new()
        })
    });

    Ok(VisionSignals {
        safe_search,
        web_entities,
        labels,
    })
}

/// Google Cloud Vision REST client (`images:annotate`).
pub struct GoogleVisionClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    requests: [AnnotateImageRequest<'a>; 1],
}

#[derive(Serialize)]
struct AnnotateImageRequest<'a> {
    image: ImageRef<'a>,
    features: [Feature; 1],
}

#[derive(Serialize)]
struct ImageRef<'a> {
    source: ImageSource<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSource<'a> {
    image_uri: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_results: Option<u32>,
}

#[derive(Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct AnnotateImageResponse {
    safe_search_annotation: Option<SafeSearch>,
    web_detection: Option<WebDetection>,
    label_annotations: Vec<Label>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct WebDetection {
    web_entities: Vec<WebEntity>,
}

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl GoogleVisionClient {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self, VisionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(VisionError::Http)?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn annotate(
        &self,
        image: &SourceImage,
        feature: &'static str,
        max_results: Option<u32>,
    ) -> Result<AnnotateImageResponse, VisionError> {
        let url = format!("{}/images:annotate", self.endpoint);

        let body = AnnotateRequest {
            requests: [AnnotateImageRequest {
                image: ImageRef {
                    source: ImageSource {
                        image_uri: &image.url,
                    },
                },
                features: [Feature {
                    kind: feature,
                    max_results,
                }],
            }],
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(VisionError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(VisionError::Status(status.as_u16(), text));
        }

        let parsed: AnnotateResponse = response.json().await.map_err(VisionError::Http)?;
        let first = parsed
            .responses
            .into_iter()
            .next()
            .ok_or(VisionError::EmptyResponse)?;

        if let Some(ref err) = first.error {
            if err.code != 0 {
                return Err(VisionError::Api {
                    code: err.code,
                    message: err.message.clone(),
                });
            }
        }

        Ok(first)
    }
}

#[async_trait]
impl VisionClient for GoogleVisionClient {
    async fn detect_safety(&self, image: &SourceImage) -> Result<SafeSearch, VisionError> {
        self.annotate(image, "SAFE_SEARCH_DETECTION", None)
            .await?
            .safe_search_annotation
            .ok_or(VisionError::EmptyResponse)
    }

    async fn detect_web_entities(
        &self,
        image: &SourceImage,
    ) -> Result<Vec<WebEntity>, VisionError> {
        let response = self.annotate(image, "WEB_DETECTION", None).await?;
        Ok(response
            .web_detection
            .map(|w| w.web_entities)
            .unwrap_or_default())
    }

    async fn detect_labels(&self, image: &SourceImage) -> Result<Vec<Label>, VisionError> {
        let response = self
            .annotate(image, "LABEL_DETECTION", Some(MAX_LABELS))
            .await?;
        Ok(response.label_annotations)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Vision request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Vision service responded with status {0}: {1}")]
    Status(u16, String),

    #[error("Vision service error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("Vision service returned no annotation")]
    EmptyResponse,
}
