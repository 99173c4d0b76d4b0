//! Hosted vision-language model access
//!
//! [`VisionModel`] is the seam the counting service talks to. [`GeminiClient`]
//! implements it over the Generative Language REST API: resumable Files
//! uploads, a single `generateContent` call and file deletion.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ModelError;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
/// Bound for file deletion and model listing
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// A file stored in the model provider's file store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Resource name used for deletion, e.g. `files/abc123`
    pub name: String,
    pub uri: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile, ModelError>;

    /// One generation call with the prompt followed by `files`, bounded by `timeout`
    async fn generate(
        &self,
        prompt: &str,
        files: &[RemoteFile],
        timeout: Duration,
    ) -> Result<String, ModelError>;

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), ModelError>;

    async fn list_models(&self) -> Result<Vec<String>, ModelError>;
}

/// MIME type sent with an uploaded image, from its extension
pub fn mime_type_for(path: &Path) -> &'static str {
    match crate::utils::get_file_extension(path).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}

// --- REST serde structs ---

#[derive(Serialize)]
struct UploadStart<'a> {
    file: UploadMetadata<'a>,
}

#[derive(Serialize)]
struct UploadMetadata<'a> {
    display_name: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: Option<RemoteFile>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    File { file_data: FileData<'a> },
}

#[derive(Serialize)]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, files: &'a [RemoteFile]) -> Self {
        let mut parts = Vec::with_capacity(files.len() + 1);
        parts.push(RequestPart::Text { text: prompt });
        parts.extend(files.iter().map(|file| RequestPart::File {
            file_data: FileData {
                mime_type: &file.mime_type,
                file_uri: &file.uri,
            },
        }));

        Self {
            contents: vec![RequestContent {
                role: "user",
                parts,
            }],
        }
    }
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Result<String, ModelError> {
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(ModelError::MissingField("candidates"))?;

        let text: String = candidate
            .content
            .ok_or(ModelError::MissingField("candidate content"))?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        Ok(text.trim().to_string())
    }
}

/// Client for the Gemini REST API
pub struct GeminiClient {
    client: Client,
    api_base: String,
    api_key: String,
    model_name: String,
    request_timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: &str, model_name: &str, api_base: &str) -> Result<Self, ModelError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;

        let api_base = api_base.trim_end_matches('/').to_string();
        info!("Gemini client configured: base={}, model={}", api_base, model_name);

        Ok(Self {
            client,
            api_base,
            api_key: api_key.to_string(),
            model_name: model_name.to_string(),
            request_timeout: REQUEST_TIMEOUT,
        })
    }

    /// Override the timeout used for deletion and model listing
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(timeout)
    } else {
        ModelError::Http(e)
    }
}

/// Turn a non-2xx response into [`ModelError::Api`]
async fn check_status(response: Response) -> Result<Response, ModelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ModelError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl VisionModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<RemoteFile, ModelError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| ModelError::File {
            path: path.display().to_string(),
            source,
        })?;
        let display_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload");

        debug!("Uploading {} ({} bytes, {})", display_name, bytes.len(), mime_type);

        let start = self
            .client
            .post(self.url("upload/v1beta/files"))
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .timeout(UPLOAD_TIMEOUT)
            .json(&UploadStart {
                file: UploadMetadata { display_name },
            })
            .send()
            .await?;
        let start = check_status(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or(ModelError::MissingField("x-goog-upload-url header"))?;

        let finished = self
            .client
            .post(upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .timeout(UPLOAD_TIMEOUT)
            .body(bytes)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(finished).await?.json().await?;

        let mut file = uploaded.file.ok_or(ModelError::MissingField("file"))?;
        if file.mime_type.is_empty() {
            file.mime_type = mime_type.to_string();
        }

        debug!("Uploaded {} as {}", display_name, file.name);
        Ok(file)
    }

    async fn generate(
        &self,
        prompt: &str,
        files: &[RemoteFile],
        timeout: Duration,
    ) -> Result<String, ModelError> {
        let request = GenerateRequest::new(prompt, files);
        let url = self.url(&format!("v1beta/models/{}:generateContent", self.model_name));

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let response = check_status(response).await?;
        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        body.into_text()
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), ModelError> {
        let response = self
            .client
            .delete(self.url(&format!("v1beta/{}", file.name)))
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, self.request_timeout))?;
        check_status(response).await?;

        debug!("Deleted remote file {}", file.name);
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, ModelError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.url("v1beta/models"))
                .header("x-goog-api-key", &self.api_key)
                .timeout(self.request_timeout)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| transport_error(e, self.request_timeout))?;
            let page: ModelList = check_status(response)
                .await?
                .json()
                .await
                .map_err(|e| transport_error(e, self.request_timeout))?;
            names.extend(page.models.into_iter().map(|m| m.name));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(name: &str, mime: &str) -> RemoteFile {
        RemoteFile {
            name: format!("files/{}", name),
            uri: format!("https://example.invalid/v1beta/files/{}", name),
            mime_type: mime.to_string(),
        }
    }

    #[test]
    fn test_gemini_client_new() {
        let client = GeminiClient::new("key", "gemini-2.5-pro", DEFAULT_API_BASE).unwrap();
        assert_eq!(client.api_base, "https://generativelanguage.googleapis.com");
        assert_eq!(client.model_name(), "gemini-2.5-pro");
    }

    #[test]
    fn test_gemini_client_trailing_slash_trimmed() {
        let client = GeminiClient::new("key", "m", "http://localhost:8081/").unwrap();
        assert_eq!(client.api_base, "http://localhost:8081");
        assert_eq!(client.url("/v1beta/models"), "http://localhost:8081/v1beta/models");
    }

    #[test]
    fn test_generate_request_format() {
        let files = vec![remote("orig", "image/jpeg"), remote("sprite", "image/jpeg")];
        let request = GenerateRequest::new("count the beads", &files);
        let json = serde_json::to_value(&request).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(parts.as_array().unwrap().len(), 3);
        assert_eq!(parts[0]["text"], "count the beads");
        assert_eq!(parts[1]["file_data"]["mime_type"], "image/jpeg");
        assert_eq!(
            parts[1]["file_data"]["file_uri"],
            "https://example.invalid/v1beta/files/orig"
        );
        assert_eq!(
            parts[2]["file_data"]["file_uri"],
            "https://example.invalid/v1beta/files/sprite"
        );
    }

    #[test]
    fn test_upload_start_format() {
        let body = UploadStart {
            file: UploadMetadata {
                display_name: "sprite_right.jpg",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"file": {"display_name": "sprite_right.jpg"}}));
    }

    #[test]
    fn test_upload_response_parsing() {
        let json = serde_json::json!({
            "file": {
                "name": "files/abc123",
                "uri": "https://generativelanguage.googleapis.com/v1beta/files/abc123",
                "mimeType": "image/jpeg",
                "sizeBytes": "1024",
                "state": "ACTIVE"
            }
        });
        let response: UploadResponse = serde_json::from_value(json).unwrap();
        let file = response.file.unwrap();
        assert_eq!(file.name, "files/abc123");
        assert_eq!(file.mime_type, "image/jpeg");
    }

    #[test]
    fn test_generate_response_joins_text_parts() {
        let json = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{"text": "```json\n{\"contagem\": "}, {"text": "{}}\n```"}]
                },
                "finishReason": "STOP"
            }]
        });
        let response: GenerateResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.into_text().unwrap(), "```json\n{\"contagem\": {}}\n```");
    }

    #[test]
    fn test_generate_response_without_candidates() {
        let json = serde_json::json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let response: GenerateResponse = serde_json::from_value(json).unwrap();

        match response.into_text() {
            Err(ModelError::MissingField(field)) => assert_eq!(field, "candidates"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_model_list_parsing() {
        let json = serde_json::json!({
            "models": [
                {"name": "models/gemini-2.5-pro", "displayName": "Gemini 2.5 Pro"},
                {"name": "models/gemini-2.5-flash"}
            ],
            "nextPageToken": ""
        });
        let list: ModelList = serde_json::from_value(json).unwrap();
        assert_eq!(list.models.len(), 2);
        assert_eq!(list.models[0].name, "models/gemini-2.5-pro");
    }

    #[test]
    fn test_mime_type_for() {
        assert_eq!(mime_type_for(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("a")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_list_models_unreachable() {
        let client = GeminiClient::new("key", "m", "http://127.0.0.1:59999").unwrap();
        let result = client.list_models().await;
        assert!(matches!(result, Err(ModelError::Http(_))));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let client = GeminiClient::new("key", "m", "http://127.0.0.1:59999").unwrap();
        let result = client
            .upload_file(Path::new("/definitely/not/here.jpg"), "image/jpeg")
            .await;
        assert!(matches!(result, Err(ModelError::File { .. })));
    }

    mod wire {
        use super::*;
        use axum::body::Bytes;
        use axum::extract::State;
        use axum::http::{HeaderMap, Method, StatusCode, Uri};
        use axum::response::{IntoResponse, Response};
        use axum::{Json, Router};
        use serde_json::json;
        use std::sync::{Arc, Mutex};

        #[derive(Debug, Clone)]
        struct Seen {
            method: Method,
            path: String,
            query: String,
            headers: HeaderMap,
            body: Vec<u8>,
        }

        #[derive(Clone)]
        struct FakeApi {
            addr: String,
            seen: Arc<Mutex<Vec<Seen>>>,
        }

        async fn fake_api(
            State(api): State<FakeApi>,
            method: Method,
            uri: Uri,
            headers: HeaderMap,
            body: Bytes,
        ) -> Response {
            let query = uri.query().unwrap_or_default().to_string();
            api.seen.lock().unwrap().push(Seen {
                method: method.clone(),
                path: uri.path().to_string(),
                query: query.clone(),
                headers,
                body: body.to_vec(),
            });

            match (method.as_str(), uri.path()) {
                ("POST", "/upload/v1beta/files") => (
                    [("x-goog-upload-url", format!("http://{}/upload-session", api.addr))],
                    "",
                )
                    .into_response(),
                ("POST", "/upload-session") => Json(json!({
                    "file": {"name": "files/abc", "uri": "https://files.invalid/abc"}
                }))
                .into_response(),
                ("POST", "/v1beta/models/good-model:generateContent") => Json(json!({
                    "candidates": [{"content": {"parts": [{"text": "  {\"contagem\": {}}\n"}]}}]
                }))
                .into_response(),
                ("POST", "/v1beta/models/busy-model:generateContent") => {
                    (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response()
                }
                ("POST", "/v1beta/models/empty-model:generateContent") => {
                    Json(json!({"candidates": []})).into_response()
                }
                ("DELETE", "/v1beta/files/abc") => Json(json!({})).into_response(),
                ("GET", "/v1beta/models") if query.contains("pageToken=page2") => {
                    Json(json!({"models": [{"name": "models/b"}]})).into_response()
                }
                ("GET", "/v1beta/models") => Json(json!({
                    "models": [{"name": "models/a"}],
                    "nextPageToken": "page2"
                }))
                .into_response(),
                _ => (StatusCode::NOT_FOUND, "no such route").into_response(),
            }
        }

        async fn spawn_fake_api() -> (String, Arc<Mutex<Vec<Seen>>>) {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap().to_string();
            let api = FakeApi {
                addr: addr.clone(),
                seen: Arc::new(Mutex::new(Vec::new())),
            };
            let seen = Arc::clone(&api.seen);
            let app = Router::new().fallback(fake_api).with_state(api);
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            (format!("http://{}", addr), seen)
        }

        fn header<'a>(seen: &'a Seen, name: &str) -> &'a str {
            seen.headers.get(name).unwrap().to_str().unwrap()
        }

        #[tokio::test]
        async fn test_resumable_upload() {
            let (base, seen) = spawn_fake_api().await;
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("sprite_right.jpg");
            std::fs::write(&path, b"jpegbytes").unwrap();

            let client = GeminiClient::new("key", "good-model", &base).unwrap();
            let file = client.upload_file(&path, "image/jpeg").await.unwrap();

            assert_eq!(file.name, "files/abc");
            assert_eq!(file.uri, "https://files.invalid/abc");
            // Missing in the reply, taken from the request
            assert_eq!(file.mime_type, "image/jpeg");

            let seen = seen.lock().unwrap().clone();
            assert_eq!(seen.len(), 2);

            let start = &seen[0];
            assert_eq!(start.path, "/upload/v1beta/files");
            assert_eq!(header(start, "x-goog-api-key"), "key");
            assert_eq!(header(start, "x-goog-upload-protocol"), "resumable");
            assert_eq!(header(start, "x-goog-upload-command"), "start");
            assert_eq!(header(start, "x-goog-upload-header-content-length"), "9");
            assert_eq!(header(start, "x-goog-upload-header-content-type"), "image/jpeg");
            let metadata: serde_json::Value = serde_json::from_slice(&start.body).unwrap();
            assert_eq!(metadata["file"]["display_name"], "sprite_right.jpg");

            let finish = &seen[1];
            assert_eq!(finish.path, "/upload-session");
            assert_eq!(header(finish, "x-goog-upload-command"), "upload, finalize");
            assert_eq!(header(finish, "x-goog-upload-offset"), "0");
            assert_eq!(finish.body, b"jpegbytes");
        }

        #[tokio::test]
        async fn test_generate_posts_prompt_and_files() {
            let (base, seen) = spawn_fake_api().await;
            let client = GeminiClient::new("key", "good-model", &base).unwrap();
            let files = vec![remote("orig", "image/png"), remote("sprite", "image/jpeg")];

            let text = client
                .generate("count", &files, Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(text, "{\"contagem\": {}}");

            let seen = seen.lock().unwrap().clone();
            assert_eq!(seen[0].method, Method::POST);
            assert_eq!(seen[0].path, "/v1beta/models/good-model:generateContent");
            assert_eq!(header(&seen[0], "x-goog-api-key"), "key");
            let body: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
            let parts = &body["contents"][0]["parts"];
            assert_eq!(parts[0]["text"], "count");
            assert_eq!(parts[1]["file_data"]["mime_type"], "image/png");
            assert_eq!(
                parts[2]["file_data"]["file_uri"],
                "https://example.invalid/v1beta/files/sprite"
            );
        }

        #[tokio::test]
        async fn test_generate_error_status_is_api_error() {
            let (base, _seen) = spawn_fake_api().await;
            let client = GeminiClient::new("key", "busy-model", &base).unwrap();

            match client.generate("count", &[], Duration::from_secs(5)).await {
                Err(ModelError::Api { status, body }) => {
                    assert_eq!(status, 503);
                    assert_eq!(body, "overloaded");
                }
                other => panic!("unexpected result: {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_generate_without_candidates() {
            let (base, _seen) = spawn_fake_api().await;
            let client = GeminiClient::new("key", "empty-model", &base).unwrap();

            let result = client.generate("count", &[], Duration::from_secs(5)).await;
            assert!(matches!(result, Err(ModelError::MissingField("candidates"))));
        }

        #[tokio::test]
        async fn test_delete_file_uses_resource_name() {
            let (base, seen) = spawn_fake_api().await;
            let client = GeminiClient::new("key", "good-model", &base).unwrap();

            client
                .delete_file(&remote("abc", "image/jpeg"))
                .await
                .unwrap();
            let result = client.delete_file(&remote("gone", "image/jpeg")).await;
            assert!(matches!(result, Err(ModelError::Api { status: 404, .. })));

            let seen = seen.lock().unwrap().clone();
            assert_eq!(seen[0].method, Method::DELETE);
            assert_eq!(seen[0].path, "/v1beta/files/abc");
            assert_eq!(header(&seen[0], "x-goog-api-key"), "key");
        }

        #[tokio::test]
        async fn test_list_models_follows_page_token() {
            let (base, seen) = spawn_fake_api().await;
            let client = GeminiClient::new("key", "good-model", &base).unwrap();

            let models = client.list_models().await.unwrap();
            assert_eq!(models, vec!["models/a".to_string(), "models/b".to_string()]);

            let seen = seen.lock().unwrap().clone();
            assert_eq!(seen.len(), 2);
            assert!(seen.iter().all(|s| s.query.contains("pageSize=1000")));
            assert!(!seen[0].query.contains("pageToken"));
            assert!(seen[1].query.contains("pageToken=page2"));
        }

        /// Accepts connections and never answers
        async fn spawn_silent_server() -> String {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let mut held = Vec::new();
                while let Ok((socket, _)) = listener.accept().await {
                    held.push(socket);
                }
            });
            format!("http://{}", addr)
        }

        #[tokio::test]
        async fn test_stalled_delete_and_list_time_out() {
            let base = spawn_silent_server().await;
            let client = GeminiClient::new("key", "m", &base)
                .unwrap()
                .with_request_timeout(Duration::from_millis(200));

            let deleted = tokio::time::timeout(
                Duration::from_secs(5),
                client.delete_file(&remote("abc", "image/jpeg")),
            )
            .await
            .expect("delete_file must not hang");
            assert!(matches!(deleted, Err(ModelError::Timeout(_))));

            let listed = tokio::time::timeout(Duration::from_secs(5), client.list_models())
                .await
                .expect("list_models must not hang");
            assert!(matches!(listed, Err(ModelError::Timeout(_))));
        }
    }
}
