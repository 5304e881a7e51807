use super::auth::SessionToken;
use crate::config::DEFAULT_POLL_INTERVAL_SECS;
use crate::error::{Error, Result};
use crate::http;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const TASK_IN_PROGRESS: &str = "In_progress";
pub const TASK_FINISHED: &str = "Finished_ok";
pub const DEFAULT_FORMAT: &str = "Geotiff";
pub const DEFAULT_COORDINATE_SYSTEM: &str = "EPSG:4326";

const SUBMIT_ENDPOINT: &str = "@datarequest_post";
const STATUS_ENDPOINT: &str = "@datarequest_status_get";
const SEARCH_ENDPOINT: &str = "@datarequest_search";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataRequest {
    #[serde(rename = "Datasets")]
    pub datasets: Vec<DatasetRequest>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum DatasetRequest {
    Generated {
        #[serde(rename = "DatasetID")]
        dataset_id: String,
        #[serde(rename = "DatasetDownloadInformationID")]
        download_information_id: String,
        #[serde(rename = "OutputFormat")]
        output_format: String,
        #[serde(rename = "OutputGCS")]
        output_gcs: String,
    },
    Prepackaged {
        #[serde(rename = "DatasetID")]
        dataset_id: String,
        #[serde(rename = "FileID")]
        file_id: String,
    },
}

impl DataRequest {
    pub fn generated(uid: &str, download_id: &str, format: &str, coordinate_system: &str) -> Self {
        Self {
            datasets: vec![DatasetRequest::Generated {
                dataset_id: uid.to_string(),
                download_information_id: download_id.to_string(),
                output_format: format.to_string(),
                output_gcs: coordinate_system.to_string(),
            }],
        }
    }

    pub fn prepackaged(uid: &str, file_id: &str) -> Self {
        Self {
            datasets: vec![DatasetRequest::Prepackaged {
                dataset_id: uid.to_string(),
                file_id: file_id.to_string(),
            }],
        }
    }
}

#[derive(Deserialize, Debug)]
struct SubmitResponse {
    #[serde(rename = "TaskIds", default)]
    task_ids: Vec<TaskId>,
    #[serde(rename = "ErrorTaskIds", default)]
    error_task_ids: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct TaskId {
    #[serde(rename = "TaskID")]
    id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle(String);

impl TaskHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status object as reported by both the single-task and bulk endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TaskStatusReport {
    #[serde(rename = "Status", default, deserialize_with = "http::null_as_default")]
    pub status: String,
    #[serde(
        rename = "DownloadURL",
        default,
        deserialize_with = "http::null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub download_url: String,
    #[serde(
        rename = "FileSize",
        default,
        deserialize_with = "lenient_size",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_size: Option<u64>,
    #[serde(
        rename = "Message",
        default,
        deserialize_with = "http::null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub message: String,
    #[serde(rename = "Datasets", default, deserialize_with = "http::null_as_default")]
    pub datasets: Vec<DatasetStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct DatasetStatus {
    #[serde(rename = "DatasetID", default, deserialize_with = "http::null_as_default")]
    pub dataset_id: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Accepts the size as a number, a numeric string, or nothing at all.
fn lenient_size<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Number(u64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Size>::deserialize(deserializer)? {
        Some(Size::Number(n)) => Some(n),
        Some(Size::Float(f)) if f >= 0.0 => Some(f as u64),
        Some(Size::Text(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinishedTask {
    pub download_url: String,
    pub file_size: Option<u64>,
}

impl FinishedTask {
    /// Name for the staged download: the last segment of the URL path.
    pub fn target_filename(&self) -> Result<String> {
        let url = Url::parse(&self.download_url)
            .map_err(|e| Error::Protocol(format!("failed to parse download url: {e}")))?;
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("download url has no file name: {url}")))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TaskStatus {
    InProgress,
    Finished(FinishedTask),
    Failed { status: String, message: String },
}

impl From<TaskStatusReport> for TaskStatus {
    fn from(report: TaskStatusReport) -> Self {
        match report.status.as_str() {
            TASK_IN_PROGRESS => Self::InProgress,
            TASK_FINISHED => Self::Finished(FinishedTask {
                download_url: report.download_url,
                file_size: report.file_size,
            }),
            _ => Self::Failed {
                status: report.status,
                message: report.message,
            },
        }
    }
}

/// Submits data requests and follows them to a terminal state.
pub struct TaskOrchestrator<'a> {
    client: &'a Client,
    api_url: &'a str,
    token: &'a SessionToken,
    poll_interval: Duration,
}

impl<'a> TaskOrchestrator<'a> {
    pub fn new(client: &'a Client, api_url: &'a str, token: &'a SessionToken) -> Self {
        Self {
            client,
            api_url,
            token,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn submit(&self, request: &DataRequest) -> Result<TaskHandle> {
        let url = format!("{}{SUBMIT_ENDPOINT}", self.api_url);
        let builder = self
            .client
            .post(&url)
            .headers(http::accept_json())
            .json(request);
        let response = self
            .token
            .apply(builder)?
            .send()
            .await
            .map_err(|e| Error::transport(&url, e))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RequestRejected(format!("HTTP status {status}: {body}")));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("failed to decode submission response: {e}")))?;

        // A single-item request either succeeds entirely or not at all.
        if !submitted.error_task_ids.is_empty() {
            return Err(Error::RequestRejected(format!(
                "server reported error tasks: {}",
                serde_json::Value::Array(submitted.error_task_ids)
            )));
        }
        let mut task_ids = submitted.task_ids;
        if task_ids.len() != 1 {
            return Err(Error::Protocol(format!(
                "expected one task, got {}",
                task_ids.len()
            )));
        }
        let handle = TaskHandle(task_ids.remove(0).id);
        info!(task = %handle, "data requested");
        Ok(handle)
    }

    pub async fn poll(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let mut url = Url::parse(&format!("{}{STATUS_ENDPOINT}", self.api_url))
            .map_err(|e| Error::Config(format!("invalid api url: {e}")))?;
        url.query_pairs_mut().append_pair("TaskID", handle.as_str());

        let report: TaskStatusReport = self.get_authenticated(url.as_str()).await?;
        debug!(task = %handle, status = %report.status, "polled task");
        Ok(report.into())
    }

    /// Polls at a fixed interval until the task leaves the in-progress state.
    /// There is no retry ceiling: the server decides how long a job runs.
    pub async fn wait_for_completion(&self, handle: &TaskHandle) -> Result<FinishedTask> {
        loop {
            match self.poll(handle).await? {
                TaskStatus::InProgress => {
                    info!(task = %handle, "in progress...");
                    tokio::time::sleep(self.poll_interval).await;
                }
                TaskStatus::Finished(finished) => {
                    if finished.download_url.is_empty() {
                        return Err(Error::Protocol(
                            "got an empty download URL for task".to_string(),
                        ));
                    }
                    info!(task = %handle, size = ?finished.file_size, "task finished");
                    return Ok(finished);
                }
                TaskStatus::Failed { status, message } => {
                    let detail = if message.is_empty() {
                        status
                    } else {
                        format!("{status} ({message})")
                    };
                    return Err(Error::UnexpectedStatus(detail));
                }
            }
        }
    }

    /// Every request made with this account, keyed by task id.
    pub async fn list_requests(&self) -> Result<BTreeMap<String, TaskStatusReport>> {
        let url = format!("{}{SEARCH_ENDPOINT}", self.api_url);
        self.get_authenticated(&url).await
    }

    async fn get_authenticated<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let builder = self.client.get(url).headers(http::accept_json());
        let response = self
            .token
            .apply(builder)?
            .send()
            .await
            .map_err(|e| Error::transport(url, e))?;
        let response = http::expect_status(url, response, StatusCode::OK).await?;
        response.json().await.map_err(|e| Error::transport(url, e))
    }
}
