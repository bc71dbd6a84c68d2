use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{Agent, AgentId, Comment, CommentId, EntityKind, Lead, LeadId, Tag, TagId},
    protocol::{
        AgentDraft, AgentPatch, AgentPayload, AgentsPayload, CommentDraft, CommentPatch,
        CommentsEnvelope, DataEnvelope, LeadDraft, LeadPatch, LeadPayload, LeadsPayload,
        ReportAggregate, TagDraft, TagPatch, TagPayload, TagsPayload,
    },
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::{
    config::{parse_base_url, ClientSettings},
    error::SyncError,
};

/// Anything that can produce a fresh analytics aggregate.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_report_aggregate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReportAggregate, SyncError>;
}

/// Typed HTTP access to the pipeline service. Holds no mirrored state.
#[derive(Clone)]
pub struct RemoteGateway {
    http: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl RemoteGateway {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn from_settings(settings: &ClientSettings) -> anyhow::Result<Self> {
        Self::new(&settings.api_base_url, settings.request_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn list_leads(&self, cancel: &CancellationToken) -> Result<Vec<Lead>, SyncError> {
        let envelope: DataEnvelope<LeadsPayload> = self
            .execute(self.request(Method::GET, &["api", "leads"]), cancel)
            .await?;
        Ok(envelope.data.leads)
    }

    pub async fn get_lead(
        &self,
        id: &LeadId,
        cancel: &CancellationToken,
    ) -> Result<Lead, SyncError> {
        let envelope: DataEnvelope<LeadPayload> = self
            .execute(self.request(Method::GET, &["api", "leads", id.as_str()]), cancel)
            .await
            .map_err(missing(EntityKind::Lead, id.as_str()))?;
        Ok(envelope.data.lead)
    }

    pub async fn create_lead(
        &self,
        draft: &LeadDraft,
        cancel: &CancellationToken,
    ) -> Result<Lead, SyncError> {
        let envelope: DataEnvelope<LeadPayload> = self
            .execute(self.json(Method::POST, &["api", "leads"], draft), cancel)
            .await?;
        Ok(envelope.data.lead)
    }

    pub async fn update_lead(
        &self,
        id: &LeadId,
        patch: &LeadPatch,
        cancel: &CancellationToken,
    ) -> Result<Lead, SyncError> {
        let envelope: DataEnvelope<LeadPayload> = self
            .execute(
                self.json(Method::PUT, &["api", "leads", id.as_str()], patch),
                cancel,
            )
            .await?;
        Ok(envelope.data.lead)
    }

    pub async fn delete_lead(
        &self,
        id: &LeadId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.execute_discarding(
            self.request(Method::DELETE, &["api", "leads", id.as_str()]),
            cancel,
        )
        .await
    }

    pub async fn list_agents(&self, cancel: &CancellationToken) -> Result<Vec<Agent>, SyncError> {
        let envelope: DataEnvelope<AgentsPayload> = self
            .execute(self.request(Method::GET, &["api", "agents"]), cancel)
            .await?;
        Ok(envelope.data.agents)
    }

    pub async fn get_agent(
        &self,
        id: &AgentId,
        cancel: &CancellationToken,
    ) -> Result<Agent, SyncError> {
        let envelope: DataEnvelope<AgentPayload> = self
            .execute(self.request(Method::GET, &["api", "agents", id.as_str()]), cancel)
            .await
            .map_err(missing(EntityKind::Agent, id.as_str()))?;
        Ok(envelope.data.agent)
    }

    pub async fn create_agent(
        &self,
        draft: &AgentDraft,
        cancel: &CancellationToken,
    ) -> Result<Agent, SyncError> {
        let envelope: DataEnvelope<AgentPayload> = self
            .execute(self.json(Method::POST, &["api", "agents"], draft), cancel)
            .await?;
        Ok(envelope.data.agent)
    }

    pub async fn update_agent(
        &self,
        id: &AgentId,
        patch: &AgentPatch,
        cancel: &CancellationToken,
    ) -> Result<Agent, SyncError> {
        let envelope: DataEnvelope<AgentPayload> = self
            .execute(
                self.json(Method::PUT, &["api", "agents", id.as_str()], patch),
                cancel,
            )
            .await?;
        Ok(envelope.data.agent)
    }

    pub async fn delete_agent(
        &self,
        id: &AgentId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.execute_discarding(
            self.request(Method::DELETE, &["api", "agents", id.as_str()]),
            cancel,
        )
        .await
    }

    pub async fn list_tags(&self, cancel: &CancellationToken) -> Result<Vec<Tag>, SyncError> {
        let envelope: DataEnvelope<TagsPayload> = self
            .execute(self.request(Method::GET, &["api", "tags"]), cancel)
            .await?;
        Ok(envelope.data.tags)
    }

    pub async fn get_tag(&self, id: &TagId, cancel: &CancellationToken) -> Result<Tag, SyncError> {
        let envelope: DataEnvelope<TagPayload> = self
            .execute(self.request(Method::GET, &["api", "tags", id.as_str()]), cancel)
            .await
            .map_err(missing(EntityKind::Tag, id.as_str()))?;
        Ok(envelope.data.tag)
    }

    pub async fn create_tag(
        &self,
        draft: &TagDraft,
        cancel: &CancellationToken,
    ) -> Result<Tag, SyncError> {
        let envelope: DataEnvelope<TagPayload> = self
            .execute(self.json(Method::POST, &["api", "tags"], draft), cancel)
            .await?;
        Ok(envelope.data.tag)
    }

    pub async fn update_tag(
        &self,
        id: &TagId,
        patch: &TagPatch,
        cancel: &CancellationToken,
    ) -> Result<Tag, SyncError> {
        let envelope: DataEnvelope<TagPayload> = self
            .execute(
                self.json(Method::PUT, &["api", "tags", id.as_str()], patch),
                cancel,
            )
            .await?;
        Ok(envelope.data.tag)
    }

    pub async fn delete_tag(&self, id: &TagId, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.execute_discarding(
            self.request(Method::DELETE, &["api", "tags", id.as_str()]),
            cancel,
        )
        .await
    }

    /// Comments of one lead, in the order the service lists them.
    pub async fn list_comments(
        &self,
        lead_id: &LeadId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Comment>, SyncError> {
        let envelope: CommentsEnvelope = self
            .execute(
                self.request(Method::GET, &["api", "leads", lead_id.as_str(), "comments"]),
                cancel,
            )
            .await?;
        Ok(envelope.comments)
    }

    pub async fn get_comment(
        &self,
        lead_id: &LeadId,
        comment_id: &CommentId,
        cancel: &CancellationToken,
    ) -> Result<Comment, SyncError> {
        let envelope: DataEnvelope<Comment> = self
            .execute(
                self.request(Method::GET, &comment_path(lead_id, comment_id)),
                cancel,
            )
            .await
            .map_err(missing(EntityKind::Comment, comment_id.as_str()))?;
        Ok(envelope.data)
    }

    pub async fn add_comment(
        &self,
        lead_id: &LeadId,
        draft: &CommentDraft,
        cancel: &CancellationToken,
    ) -> Result<Comment, SyncError> {
        let envelope: DataEnvelope<Comment> = self
            .execute(
                self.json(
                    Method::POST,
                    &["api", "leads", lead_id.as_str(), "comments"],
                    draft,
                ),
                cancel,
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn update_comment(
        &self,
        lead_id: &LeadId,
        comment_id: &CommentId,
        patch: &CommentPatch,
        cancel: &CancellationToken,
    ) -> Result<Comment, SyncError> {
        let envelope: DataEnvelope<Comment> = self
            .execute(
                self.json(Method::PUT, &comment_path(lead_id, comment_id), patch),
                cancel,
            )
            .await?;
        Ok(envelope.data)
    }

    pub async fn delete_comment(
        &self,
        lead_id: &LeadId,
        comment_id: &CommentId,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.execute_discarding(
            self.request(Method::DELETE, &comment_path(lead_id, comment_id)),
            cancel,
        )
        .await
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http.request(method, self.endpoint(segments))
    }

    fn json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> RequestBuilder {
        self.request(method, segments).json(body)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<T, SyncError> {
        let body = self.exchange(request, cancel).await?;
        serde_json::from_slice(&body).map_err(|e| SyncError::InvalidResponse(e.to_string()))
    }

    async fn execute_discarding(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.exchange(request, cancel).await.map(|_| ())
    }

    /// Sends the request and returns the body of a 2xx response.
    async fn exchange(
        &self,
        request: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SyncError> {
        let request = request.build().map_err(transport_error)?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "gateway: request");

        let roundtrip = async {
            let response = self.http.execute(request).await.map_err(transport_error)?;
            let status = response.status();
            let body = response.bytes().await.map_err(transport_error)?;
            if status.is_success() {
                Ok(body.to_vec())
            } else {
                Err(http_error(status, &body))
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%method, %url, "gateway: request cancelled");
                Err(SyncError::Cancelled)
            }
            outcome = roundtrip => outcome,
        }
    }
}

#[async_trait]
impl ReportSource for RemoteGateway {
    async fn fetch_report_aggregate(
        &self,
        cancel: &CancellationToken,
    ) -> Result<ReportAggregate, SyncError> {
        let envelope: DataEnvelope<ReportAggregate> = self
            .execute(self.request(Method::GET, &["api", "reports"]), cancel)
            .await?;
        Ok(envelope.data)
    }
}

fn comment_path<'a>(lead_id: &'a LeadId, comment_id: &'a CommentId) -> [&'a str; 5] {
    [
        "api",
        "leads",
        lead_id.as_str(),
        "comments",
        comment_id.as_str(),
    ]
}

fn transport_error(err: reqwest::Error) -> SyncError {
    if err.is_timeout() {
        SyncError::Network(format!("request timed out: {err}"))
    } else {
        SyncError::Network(err.to_string())
    }
}

fn http_error(status: StatusCode, body: &[u8]) -> SyncError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()))
        });
    SyncError::Http {
        status: status.as_u16(),
        message,
    }
}

fn missing(kind: EntityKind, id: &str) -> impl FnOnce(SyncError) -> SyncError + '_ {
    move |err| match err {
        SyncError::Http { status: 404, .. } => SyncError::NotFound {
            kind,
            id: id.to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
