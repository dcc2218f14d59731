//! Google Calendar v3 style provider over `reqwest`.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;

use super::{CreateResponse, RemoteError, RemoteObject, RemoteProvider, RemoteRef, RemoteResult};
use crate::config::{ConfigError, ProviderConfig};
use crate::error::{Error, Result};
use crate::util::compact_text;

/// HTTP client for the events collection of one provider account.
#[derive(Debug, Clone)]
pub struct HttpCalendarProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl HttpCalendarProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| {
                Error::Config(ConfigError::Invalid(format!(
                    "Failed to construct HTTP client: {error}"
                )))
            })?;
        Ok(Self { config, client })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.config.access_token)
            .header("Accept", "application/json")
    }

    async fn list_first(&self, container_id: &str, query: &[(&str, &str)]) -> RemoteResult<Option<RemoteRef>> {
        let response = self
            .request(Method::GET, events_url(&self.config.api_base_url, container_id))
            .query(query)
            .query(&[("maxResults", "1"), ("singleEvents", "false")])
            .send()
            .await
            .map_err(map_transport_error)?;
        let body = read_json(response).await?;
        Ok(first_item_id(&body).map(RemoteRef::new))
    }
}

#[async_trait]
impl RemoteProvider for HttpCalendarProvider {
    async fn lookup_by_uid(&self, container_id: &str, uid: &str) -> RemoteResult<Option<RemoteRef>> {
        tracing::debug!("Looking up remote object by uid {uid}");
        self.list_first(container_id, &[("iCalUID", uid)]).await
    }

    async fn lookup_by_private_key(
        &self,
        container_id: &str,
        key: &str,
        value: &str,
    ) -> RemoteResult<Option<RemoteRef>> {
        tracing::debug!("Looking up remote object by private property {key}={value}");
        let filter = format!("{key}={value}");
        self.list_first(container_id, &[("privateExtendedProperty", filter.as_str())])
            .await
    }

    async fn create_object(&self, container_id: &str, payload: &Value) -> RemoteResult<CreateResponse> {
        let response = self
            .request(Method::POST, events_url(&self.config.api_base_url, container_id))
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        // A success whose body is not JSON still may have created the object
        let body = match read_json(response).await {
            Ok(body) => body,
            Err(RemoteError::MalformedResponse(message)) => {
                tracing::warn!("Unreadable create response: {message}");
                Value::Null
            }
            Err(error) => return Err(error),
        };
        Ok(CreateResponse {
            id: string_field(&body, "id"),
        })
    }

    async fn get_object(&self, container_id: &str, remote_id: &str) -> RemoteResult<Option<RemoteObject>> {
        let response = self
            .request(
                Method::GET,
                event_url(&self.config.api_base_url, container_id, remote_id),
            )
            .send()
            .await
            .map_err(map_transport_error)?;
        match read_json(response).await {
            Ok(body) => parse_event(&body).map(Some).ok_or_else(|| {
                RemoteError::MalformedResponse(format!("event {remote_id} has no id"))
            }),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn update_object(&self, container_id: &str, remote_id: &str, payload: &Value) -> RemoteResult<()> {
        let response = self
            .request(
                Method::PATCH,
                event_url(&self.config.api_base_url, container_id, remote_id),
            )
            .json(payload)
            .send()
            .await
            .map_err(map_transport_error)?;
        read_json(response).await.map(|_| ())
    }
}

fn events_url(base_url: &str, container_id: &str) -> String {
    format!(
        "{base_url}/calendars/{}/events",
        urlencoding::encode(container_id)
    )
}

fn event_url(base_url: &str, container_id: &str, remote_id: &str) -> String {
    format!(
        "{}/{}",
        events_url(base_url, container_id),
        urlencoding::encode(remote_id)
    )
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Transient(format!("request timed out: {error}"))
    } else {
        RemoteError::Unreachable(error.to_string())
    }
}

async fn read_json(response: Response) -> RemoteResult<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|error| RemoteError::Unreachable(format!("failed to read body: {error}")))?;
    if !status.is_success() {
        return Err(RemoteError::from_status(status.as_u16(), &body));
    }
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body)
        .map_err(|error| RemoteError::MalformedResponse(format!("{error}: {}", compact_text(&body))))
}

fn string_field(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToString::to_string)
}

fn first_item_id(body: &Value) -> Option<String> {
    body.get("items")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| string_field(item, "id"))
}

fn parse_event(body: &Value) -> Option<RemoteObject> {
    let start = body.get("start").and_then(|start| {
        string_field(start, "dateTime").or_else(|| string_field(start, "date"))
    });
    Some(RemoteObject {
        id: string_field(body, "id")?,
        status: string_field(body, "status"),
        start,
        summary: string_field(body, "summary"),
        description: string_field(body, "description"),
    })
}
