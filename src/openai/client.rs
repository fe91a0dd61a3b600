//! HTTP client for the hosted generation API: streaming responses plus
//! the files, vector store, and container endpoints.
use std::path::Path;
use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};

use super::events::{ResponseEvent, SseParser};

/// Purpose attached to a file upload; decides which tool the remote
/// store routes the file to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilePurpose {
    Assistants,
    UserData,
    Vision,
}

impl FilePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assistants => "assistants",
            Self::UserData => "user_data",
            Self::Vision => "vision",
        }
    }
}

/// One page of a paginated list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListPage {
    pub data: Vec<ListedObject>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListedObject {
    pub id: String,
}

#[derive(Clone, Debug)]
pub struct Client {
    api_hostname: String,
    api_key: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(api_hostname: &str, api_key: &str) -> Self {
        Self {
            api_hostname: api_hostname.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_hostname, path)
    }

    /// Issue a streaming generation call and surface the SSE stream as
    /// typed events. The returned stream owns everything it needs so the
    /// caller is free to mutate its own state while consuming it.
    pub fn stream_response(
        &self,
        payload: Value,
    ) -> impl Stream<Item = Result<ResponseEvent, Error>> + Send + 'static {
        let http = self.http.clone();
        let url = self.url("/v1/responses");
        let api_key = self.api_key.clone();

        try_stream! {
            let response = http
                .post(&url)
                .bearer_auth(&api_key)
                .header("Content-Type", "application/json")
                .timeout(Duration::from_secs(60 * 10))
                .json(&payload)
                .send()
                .await?
                .error_for_status()?;

            let mut bytes = response.bytes_stream();
            let mut parser = SseParser::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk?;
                for event in parser.feed(&chunk) {
                    yield event;
                }
                if parser.done() {
                    break;
                }
            }
        }
    }

    /// Upload a local file to the remote file store.
    pub async fn upload_file(&self, path: &Path, purpose: FilePurpose) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .text("purpose", purpose.as_str())
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

        let resp: Value = self
            .http
            .post(self.url("/v1/files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        object_id(&resp)
    }

    /// Fetch the raw content of a stored file.
    pub async fn file_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.url(&format!("/v1/files/{}/content", file_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn create_container(&self, name: &str) -> Result<String> {
        let resp = self
            .post_json("/v1/containers", json!({ "name": name }))
            .await?;
        object_id(&resp)
    }

    pub async fn attach_container_file(&self, container_id: &str, file_id: &str) -> Result<()> {
        self.post_json(
            &format!("/v1/containers/{}/files", container_id),
            json!({ "file_id": file_id }),
        )
        .await?;
        Ok(())
    }

    /// Fetch the content of a file that lives inside an execution
    /// container (e.g. a generated plot).
    pub async fn container_file_content(
        &self,
        container_id: &str,
        file_id: &str,
    ) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.url(&format!(
                "/v1/containers/{}/files/{}/content",
                container_id, file_id
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn create_vector_store(&self) -> Result<String> {
        let resp = self.post_json("/v1/vector_stores", json!({})).await?;
        object_id(&resp)
    }

    pub async fn attach_vector_store_file(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<()> {
        self.post_json(
            &format!("/v1/vector_stores/{}/files", vector_store_id),
            json!({ "file_id": file_id }),
        )
        .await?;
        Ok(())
    }

    /// The indexing status of a file attached to a vector store.
    pub async fn vector_store_file_status(
        &self,
        vector_store_id: &str,
        file_id: &str,
    ) -> Result<String> {
        let resp: Value = self
            .http
            .get(self.url(&format!(
                "/v1/vector_stores/{}/files/{}",
                vector_store_id, file_id
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        resp["status"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("Vector store file response missing status: {}", resp))
    }

    pub async fn list_files(&self, limit: usize, after: Option<&str>) -> Result<ListPage> {
        self.list_page("/v1/files", limit, after).await
    }

    pub async fn list_vector_stores(&self, limit: usize, after: Option<&str>) -> Result<ListPage> {
        self.list_page("/v1/vector_stores", limit, after).await
    }

    pub async fn list_containers(&self, limit: usize, after: Option<&str>) -> Result<ListPage> {
        self.list_page("/v1/containers", limit, after).await
    }

    pub async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.delete(&format!("/v1/files/{}", file_id)).await
    }

    pub async fn delete_vector_store(&self, vector_store_id: &str) -> Result<()> {
        self.delete(&format!("/v1/vector_stores/{}", vector_store_id))
            .await
    }

    pub async fn delete_container(&self, container_id: &str) -> Result<()> {
        self.delete(&format!("/v1/containers/{}", container_id))
            .await
    }

    async fn post_json(&self, path: &str, payload: Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp)
    }

    async fn list_page(&self, path: &str, limit: usize, after: Option<&str>) -> Result<ListPage> {
        let mut request = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(&[("limit", limit.to_string())]);
        if let Some(after) = after {
            request = request.query(&[("after", after)]);
        }
        let page = request
            .send()
            .await?
            .error_for_status()?
            .json::<ListPage>()
            .await?;
        Ok(page)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let resp: Value = self
            .http
            .delete(self.url(path))
            .bearer_auth(&self.api_key)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !resp["deleted"].as_bool().unwrap_or(false) {
            bail!("Deletion was not confirmed: {}", resp);
        }
        Ok(())
    }
}

fn object_id(resp: &Value) -> Result<String> {
    resp["id"]
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("API response missing object id: {}", resp))
}
