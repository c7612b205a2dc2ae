use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::models::photo::{GeneratedPhoto, ProfilePhoto};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// How far the model may drift from the input photo (0.0 - 1.0).
const IMG2IMG_STRENGTH: f32 = 0.6;

const IMG2IMG_STEPS: u32 = 20;

/// Produces a generated variant of a customer's photo.
#[async_trait]
pub trait PhotoGenerator: Send + Sync {
    async fn generate(&self, photo: &ProfilePhoto) -> Result<GeneratedPhoto, GenerationError>;
}

/// Client for a Cloudflare Workers AI image-to-image model.
pub struct WorkersAiClient {
    http: Client,
    base_url: String,
    account_id: String,
    api_token: String,
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct Img2ImgRequest<'a> {
    prompt: &'a str,
    image_b64: String,
    strength: f32,
    num_steps: u32,
}

impl WorkersAiClient {
    pub fn new(
        account_id: &str,
        api_token: &str,
        model: &str,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
            prompt: prompt.to_string(),
        })
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn run_url(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.base_url.trim_end_matches('/'),
            self.account_id,
            self.model
        )
    }
}

#[async_trait]
impl PhotoGenerator for WorkersAiClient {
    /// Send the original photo to the img2img model and return the image it draws.
    async fn generate(&self, photo: &ProfilePhoto) -> Result<GeneratedPhoto, GenerationError> {
        let image_bytes = tokio::fs::read(&photo.original_path).await?;

        let request_body = Img2ImgRequest {
            prompt: &self.prompt,
            image_b64: base64::engine::general_purpose::STANDARD.encode(&image_bytes),
            strength: IMG2IMG_STRENGTH,
            num_steps: IMG2IMG_STEPS,
        };

        let response = self
            .http
            .post(self.run_url())
            .bearer_auth(&self.api_token)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(GenerationError::EmptyImage);
        }

        Ok(GeneratedPhoto {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Workers AI returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Workers AI returned an empty image")]
    EmptyImage,

    #[error("Failed to read original photo: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use uuid::Uuid;

    const MODEL: &str = "@cf/runwayml/stable-diffusion-v1-5-img2img";

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn photo_in(dir: &tempfile::TempDir) -> ProfilePhoto {
        ProfilePhoto::materialize(dir.path(), "c1", "face.png", "image/png", b"original-bytes")
            .await
            .unwrap()
    }

    fn client(base_url: &str) -> WorkersAiClient {
        WorkersAiClient::new("acct", "token", MODEL, "a studio portrait", Duration::from_secs(5))
            .unwrap()
            .with_base_url(base_url)
    }

    #[test]
    fn test_run_url() {
        let client = client("https://api.test/");
        assert_eq!(
            client.run_url(),
            format!("https://api.test/accounts/acct/ai/run/{MODEL}")
        );
    }

    #[tokio::test]
    async fn test_generate_returns_image_bytes() {
        let router = Router::new().route(
            "/accounts/acct/ai/run/{*model}",
            post(|headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
                assert_eq!(
                    headers.get(header::AUTHORIZATION).unwrap(),
                    "Bearer token"
                );
                assert_eq!(body["prompt"], "a studio portrait");
                let sent = base64::engine::general_purpose::STANDARD
                    .decode(body["image_b64"].as_str().unwrap())
                    .unwrap();
                assert_eq!(sent, b"original-bytes");
                ([(header::CONTENT_TYPE, "image/png")], Bytes::from_static(b"generated-png"))
            }),
        );
        let base_url = serve(router).await;
        let dir = tempfile::tempdir().unwrap();

        let generated = client(&base_url).generate(&photo_in(&dir).await).await.unwrap();

        assert_eq!(generated.bytes, b"generated-png");
        assert_eq!(generated.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_generate_surfaces_error_status() {
        let router = Router::new().route(
            "/accounts/acct/ai/run/{*model}",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base_url = serve(router).await;
        let dir = tempfile::tempdir().unwrap();

        let err = client(&base_url)
            .generate(&photo_in(&dir).await)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Status { status: 429, .. }));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_generate_fails_on_missing_input() {
        let photo = ProfilePhoto {
            id: Uuid::new_v4(),
            original_path: std::env::temp_dir().join(format!("missing-{}", Uuid::new_v4())),
            file_name: "missing.png".to_string(),
            content_type: "image/png".to_string(),
        };

        let err = client("http://127.0.0.1:9").generate(&photo).await.unwrap_err();
        assert!(matches!(err, GenerationError::Io(_)));
    }
}
