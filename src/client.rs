//! HTTP adapter for the survey backend.
//!
//! Implements [`TaskSource`], [`RecordSink`] and [`UploadSink`] over the
//! backend's JSON API with `reqwest`:
//!
//! | Call | Request |
//! |------|---------|
//! | tasks for a date | `GET /api/tasks?date=YYYY-MM-DD` |
//! | one task | `GET /api/tasks/{id}` |
//! | completion | `GET /api/tasks/{id}/completion/{surveyor_id}` |
//! | create record | `POST /api/records` |
//! | update record | `PUT /api/records/{id}` |
//! | delete record | `DELETE /api/records/{id}` |
//! | list records | `GET /api/records?surveyor_id=&date=` |
//! | upload photo | `POST /api/upload` (multipart `file`, `type=image`) |
//! | login | `POST /api/login` |
//!
//! Every request carries the session's bearer token when there is one.
//! A `401` clears the session through [`SessionStore::on_unauthorized`]
//! and surfaces as [`TransportError::Unauthorized`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;
use crate::error::TransportError;
use crate::models::{
    CompletionSnapshot, ItemId, Record, RecordId, RecordPayload, RecordUpdate, SurveyorId,
    Task, TaskId,
};
use crate::traits::{RecordSink, SessionStore, TaskSource, UploadSink};

pub struct HttpApi {
    client: reqwest::Client,
    upload_client: reqwest::Client,
    base_url: String,
    session: Arc<dyn SessionStore>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig, session: Arc<dyn SessionStore>) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            upload_client: build_client(config.upload_timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, client: &reqwest::Client, method: Method, path: &str) -> RequestBuilder {
        let builder = client.request(method, self.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.session.on_unauthorized();
            return Err(TransportError::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = self.send(builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    /// Fetches one task with its item catalog.
    pub async fn fetch_task(&self, task_id: TaskId) -> Result<Task, TransportError> {
        let path = format!("/api/tasks/{task_id}");
        self.send_json(self.request(&self.client, Method::GET, &path))
            .await
    }

    /// Exchanges credentials for a session token. Does not use the current
    /// session.
    pub async fn login(
        config: &ApiConfig,
        username: &str,
        password: &str,
    ) -> Result<LoginGrant, TransportError> {
        let client =
            build_client(config.timeout()).map_err(|e| TransportError::Network(e.to_string()))?;
        let url = format!("{}/api/login", config.base_url.trim_end_matches('/'));
        let response = client
            .post(url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        let reply: LoginReply = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        match reply {
            LoginReply {
                success: true,
                user_id: Some(surveyor_id),
                token,
                name,
                ..
            } => Ok(LoginGrant {
                surveyor_id,
                name,
                token,
            }),
            LoginReply {
                success: true,
                ..
            } => Err(TransportError::Protocol("login reply without user id".to_string())),
            LoginReply { message, .. } => Err(TransportError::Status {
                status: status.as_u16(),
                message: message.unwrap_or_else(|| "login rejected".to_string()),
            }),
        }
    }
}

fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Pulls `detail` or `message` out of an error body, else the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("detail")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn mime_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "image/jpeg",
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginReply {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user_id: Option<SurveyorId>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// A successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginGrant {
    pub surveyor_id: SurveyorId,
    pub name: Option<String>,
    pub token: Option<String>,
}

#[derive(Deserialize)]
struct CompletionWire {
    task_id: TaskId,
    surveyor_id: SurveyorId,
    #[serde(default)]
    total_records: u32,
    #[serde(default)]
    items: Vec<CompletionItemWire>,
}

#[derive(Deserialize)]
struct CompletionItemWire {
    item_id: ItemId,
    #[serde(default)]
    count: u32,
}

impl From<CompletionWire> for CompletionSnapshot {
    fn from(wire: CompletionWire) -> Self {
        let per_item_counts: HashMap<ItemId, u32> =
            wire.items.iter().map(|i| (i.item_id, i.count)).collect();
        CompletionSnapshot {
            task_id: wire.task_id,
            surveyor_id: wire.surveyor_id,
            completed_item_count: per_item_counts.values().filter(|c| **c > 0).count(),
            total_record_count: wire.total_records,
            per_item_counts,
        }
    }
}

#[derive(Deserialize)]
struct CreateReply {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    record_id: Option<RecordId>,
}

fn default_success() -> bool {
    true
}

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl TaskSource for HttpApi {
    async fn fetch_tasks_for_date(&self, date: NaiveDate) -> Result<Vec<Task>, TransportError> {
        let builder = self
            .request(&self.client, Method::GET, "/api/tasks")
            .query(&[("date", date.format("%Y-%m-%d").to_string())]);
        self.send_json(builder).await
    }

    async fn fetch_completion(
        &self,
        task_id: TaskId,
        surveyor_id: SurveyorId,
    ) -> Result<CompletionSnapshot, TransportError> {
        let path = format!("/api/tasks/{task_id}/completion/{surveyor_id}");
        let wire: CompletionWire = self
            .send_json(self.request(&self.client, Method::GET, &path))
            .await?;
        Ok(wire.into())
    }
}

#[async_trait]
impl RecordSink for HttpApi {
    async fn create_record(&self, payload: &RecordPayload) -> Result<RecordId, TransportError> {
        let builder = self
            .request(&self.client, Method::POST, "/api/records")
            .json(payload);
        let reply: CreateReply = self.send_json(builder).await?;
        match reply {
            CreateReply {
                success: true,
                record_id: Some(id),
                ..
            } => Ok(id),
            CreateReply {
                success: true,
                record_id: None,
                ..
            } => Err(TransportError::Protocol("missing record_id".to_string())),
            CreateReply { message, .. } => Err(TransportError::Protocol(
                message.unwrap_or_else(|| "record rejected".to_string()),
            )),
        }
    }

    async fn update_record(
        &self,
        id: RecordId,
        update: &RecordUpdate,
    ) -> Result<(), TransportError> {
        let path = format!("/api/records/{id}");
        self.send(self.request(&self.client, Method::PUT, &path).json(update))
            .await?;
        Ok(())
    }

    async fn delete_record(&self, id: RecordId) -> Result<(), TransportError> {
        let path = format!("/api/records/{id}");
        self.send(self.request(&self.client, Method::DELETE, &path))
            .await?;
        Ok(())
    }

    async fn list_records(
        &self,
        surveyor_id: SurveyorId,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Record>, TransportError> {
        let mut query = vec![("surveyor_id", surveyor_id.to_string())];
        if let Some(date) = date {
            query.push(("date", date.format("%Y-%m-%d").to_string()));
        }
        let builder = self
            .request(&self.client, Method::GET, "/api/records")
            .query(&query);
        self.send_json(builder).await
    }
}

#[async_trait]
impl UploadSink for HttpApi {
    async fn upload_file(&self, bytes: Vec<u8>, filename: &str) -> Result<String, TransportError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("type", "image");
        let builder = self
            .request(&self.upload_client, Method::POST, "/api/upload")
            .multipart(form);
        let reply: UploadReply = self.send_json(builder).await?;
        match reply {
            UploadReply {
                success: true,
                url: Some(url),
            } => Ok(url),
            _ => Err(TransportError::Protocol("upload reply without url".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_detail() {
        assert_eq!(error_message(r#"{"detail":"not found"}"#), "not found");
        assert_eq!(error_message(r#"{"message":"nope"}"#), "nope");
        assert_eq!(error_message(" gateway timeout \n"), "gateway timeout");
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(mime_for("a.PNG"), "image/png");
        assert_eq!(mime_for("a.webp"), "image/webp");
        assert_eq!(mime_for("a_wm.jpg"), "image/jpeg");
        assert_eq!(mime_for("noext"), "image/jpeg");
    }

    #[test]
    fn completion_wire_maps_counts() {
        let wire: CompletionWire = serde_json::from_str(
            r#"{"task_id": 1, "surveyor_id": 7, "total_items": 2, "completed_items": 1,
                "total_records": 2,
                "items": [
                  {"item_id": 10, "category": "produce", "product_name": "Tomato", "count": 2, "completed": true},
                  {"item_id": 11, "category": "dairy", "product_name": "Milk", "count": 0, "completed": false}
                ]}"#,
        )
        .unwrap();
        let snap = CompletionSnapshot::from(wire);
        assert_eq!(snap.per_item_counts.get(&10), Some(&2));
        assert_eq!(snap.per_item_counts.get(&11), Some(&0));
        assert_eq!(snap.completed_item_count, 1);
        assert_eq!(snap.total_record_count, 2);
    }
}
