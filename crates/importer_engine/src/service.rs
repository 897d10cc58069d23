use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use importer_logging::{importer_debug, importer_info};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use url::Url;

use crate::envelope::{decode, open, read_body};
use crate::{
    extract_plain_text, FailureKind, HealthReport, ParsedPreview, ServiceError, StartedOperation,
    StatusReport, TicketDetails,
};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub max_response_bytes: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            max_response_bytes: 8 * 1024 * 1024,
        }
    }
}

/// The importer's remote service. Every call is one request; retries and
/// cadence belong to the caller.
#[async_trait::async_trait]
pub trait TicketService: Send + Sync {
    async fn upload(&self, file_name: &str, bytes: Bytes) -> Result<ParsedPreview, ServiceError>;

    async fn start_operation(&self, preview_id: &str) -> Result<StartedOperation, ServiceError>;

    async fn poll_status(&self, operation_id: &str) -> Result<StatusReport, ServiceError>;

    async fn fetch_ticket(&self, key: &str) -> Result<TicketDetails, ServiceError>;

    async fn check_health(&self) -> Result<HealthReport, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTicketService {
    client: reqwest::Client,
    base: Url,
    max_response_bytes: u64,
}

impl ReqwestTicketService {
    pub fn new(settings: ServiceSettings) -> Result<Self, ServiceError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| ServiceError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ServiceError::new(
                FailureKind::InvalidUrl,
                format!("unsupported server url {}", settings.base_url),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ServiceError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            client,
            base,
            max_response_bytes: settings.max_response_bytes,
        })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ServiceError::new(FailureKind::InvalidUrl, "server url cannot be a base")
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value, ServiceError> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let (status, body) = read_body(response, self.max_response_bytes).await?;
        open(status, &body)
    }
}

#[async_trait::async_trait]
impl TicketService for ReqwestTicketService {
    async fn upload(&self, file_name: &str, bytes: Bytes) -> Result<ParsedPreview, ServiceError> {
        let url = self.endpoint(&["api", "upload"])?;
        let len = bytes.len() as u64;
        importer_info!("POST {} ({}, {} bytes)", url, file_name, len);

        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(bytes), len)
            .file_name(file_name.to_string())
            .mime_str(spreadsheet_mime(file_name))
            .map_err(|err| ServiceError::new(FailureKind::InvalidResponse, err.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let data = self.execute(self.client.post(url).multipart(form)).await?;
        let wire: UploadData = decode(data)?;
        Ok(wire.into_preview())
    }

    async fn start_operation(&self, preview_id: &str) -> Result<StartedOperation, ServiceError> {
        let url = self.endpoint(&["api", "create-tickets"])?;
        importer_info!("POST {} (preview {})", url, preview_id);
        let data = self
            .execute(self.client.post(url).json(&json!({ "preview_id": preview_id })))
            .await?;
        decode(data)
    }

    async fn poll_status(&self, operation_id: &str) -> Result<StatusReport, ServiceError> {
        let url = self.endpoint(&["api", "status", operation_id])?;
        importer_debug!("GET {}", url);
        let data = self.execute(self.client.get(url)).await?;
        let mut report: StatusReport = decode(data)?;
        if report.operation_id.is_empty() {
            report.operation_id = operation_id.to_string();
        }
        Ok(report)
    }

    async fn fetch_ticket(&self, key: &str) -> Result<TicketDetails, ServiceError> {
        let url = self.endpoint(&["api", "ticket", key])?;
        importer_info!("GET {}", url);
        let data = self.execute(self.client.get(url)).await?;
        let record: IssueRecord = decode(data)?;
        Ok(record.into_details())
    }

    async fn check_health(&self) -> Result<HealthReport, ServiceError> {
        let url = self.endpoint(&["api", "health"])?;
        importer_debug!("GET {}", url);
        let data = self.execute(self.client.get(url)).await?;
        decode(data)
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        return ServiceError::new(FailureKind::Timeout, err.to_string());
    }
    ServiceError::new(FailureKind::Network, err.to_string())
}

fn spreadsheet_mime(file_name: &str) -> &'static str {
    let is_xls = file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case("xls"));
    if is_xls {
        XLS_MIME
    } else {
        XLSX_MIME
    }
}

#[derive(Debug, Deserialize)]
struct UploadData {
    preview_id: String,
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    data: Vec<Map<String, Value>>,
    #[serde(default)]
    total_rows: Option<usize>,
}

impl UploadData {
    fn into_preview(self) -> ParsedPreview {
        let total_rows = self.total_rows.unwrap_or(self.data.len());
        let rows = self
            .data
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(column, cell)| (column, cell_text(cell)))
                    .collect::<BTreeMap<_, _>>()
            })
            .collect();
        ParsedPreview {
            preview_id: self.preview_id,
            columns: self.columns,
            rows,
            total_rows,
        }
    }
}

fn cell_text(cell: Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct IssueRecord {
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    issuetype: Option<Named>,
    #[serde(default)]
    status: Option<Named>,
    #[serde(default)]
    priority: Option<Named>,
    #[serde(default)]
    assignee: Option<Person>,
    #[serde(default)]
    created: String,
    #[serde(default)]
    labels: Option<Vec<String>>,
    #[serde(default)]
    description: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Person {
    #[serde(rename = "displayName")]
    display_name: String,
}

impl IssueRecord {
    fn into_details(self) -> TicketDetails {
        let fields = self.fields;
        TicketDetails {
            key: self.key,
            summary: fields.summary,
            issue_type: fields.issuetype.map(|n| n.name).unwrap_or_default(),
            status: fields.status.map(|n| n.name).unwrap_or_default(),
            priority: fields.priority.map(|n| n.name),
            assignee: fields.assignee.map(|p| p.display_name),
            created: fields.created,
            labels: fields.labels.unwrap_or_default(),
            description: fields
                .description
                .as_ref()
                .map(extract_plain_text)
                .unwrap_or_default(),
        }
    }
}
