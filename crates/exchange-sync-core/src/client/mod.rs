//! Exchange Client (spec.md §4.A).
//!
//! A single authenticated request/response primitive, wrapped by a set of
//! typed operations so callers never dispatch on a runtime-typed response
//! (spec.md §9 "Replacing the generic response handle").

mod types;

use reqwest::{Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::warn;

use crate::error::{ExchangeError, Result, TransportCause};
use crate::model::{BlockchainClient, Change, HeartbeatIntervals, Microservice, Organization, Workload};
use types::{
    BlockchainResponse, ChangesRequest, ChangesResponse, MaxChangeIdResponse,
    MicroserviceSearchResponse, OrganizationResponse, WorkloadSearchResponse,
};

/// How many times a request is retried after a transport failure, and the
/// delay between attempts (spec.md §4.A).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// `None` means unbounded retry (used only for cursor re-seeding at
    /// registration, spec.md §3: "fetched with unbounded retry").
    count: Option<u32>,
    interval: Duration,
}

impl RetryPolicy {
    /// The Change Worker's steady-state policy (spec.md §4.A): 2 retries,
    /// 3 second interval.
    pub fn limited(count: u32, interval: Duration) -> Self {
        RetryPolicy {
            count: Some(count),
            interval,
        }
    }

    /// Retries forever. The core cannot make progress with an unknown
    /// starting cursor, so registration re-seeding never gives up.
    pub fn unbounded(interval: Duration) -> Self {
        RetryPolicy {
            count: None,
            interval,
        }
    }

    fn attempts_remaining_after(&self, attempt: u32) -> bool {
        match self.count {
            Some(count) => attempt < count,
            None => true,
        }
    }
}

/// The result of a GET that may legitimately return 404 (spec.md §4.A:
/// "404 on GET yields an application error only if the caller marks it so;
/// otherwise it returns a typed 'not found' with an empty response").
pub enum Found<T> {
    Present(T),
    NotFound,
}

impl<T> Found<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Found::Present(v) => Some(v),
            Found::NotFound => None,
        }
    }
}

/// A typed, authenticated client for the Exchange HTTP API.
pub struct ExchangeClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
    password: String,
}

impl ExchangeClient {
    pub fn new(
        base_url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| ExchangeError::internal(format!("failed to build http client: {e}")))?;
        Ok(ExchangeClient {
            http,
            base_url: base_url.into(),
            user: user.into(),
            password: password.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    /// The single entry primitive (spec.md §4.A): issues one request,
    /// applying the method→status matrix and the transport/application
    /// error classification. Retries on transport failure per `retry`.
    async fn call<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        retry: &RetryPolicy,
        allow_404: bool,
    ) -> Result<Found<T>> {
        let mut attempt = 0u32;
        loop {
            match self.call_once(method.clone(), path, query, body, allow_404).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_transport() && retry.attempts_remaining_after(attempt) => {
                    warn!(path, attempt, "transport error, retrying");
                    tokio::time::sleep(retry.interval).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
        allow_404: bool,
    ) -> Result<Found<T>> {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .query(query)
            .header("Accept", "application/json");

        if !self.user.is_empty() && !self.password.is_empty() {
            req = req.basic_auth(&self.user, Some(&self.password));
        }
        if let Some(body) = body {
            req = req.header("Content-Type", "application/json").json(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::transport(TransportCause::Timeout(e))
            } else {
                ExchangeError::transport(TransportCause::Connect(e))
            }
        })?;

        let status = resp.status();
        let expected_ok = match method {
            Method::GET => status == StatusCode::OK || status == StatusCode::NOT_FOUND,
            Method::POST | Method::PUT | Method::PATCH => status == StatusCode::CREATED,
            Method::DELETE => status == StatusCode::NO_CONTENT,
            _ => false,
        };

        if status == StatusCode::UNAUTHORIZED {
            return Err(ExchangeError::auth_dead());
        }

        if !expected_ok {
            let body_text = resp.text().await.unwrap_or_default();
            if status.is_server_error() && body_text.contains("timed out") {
                return Err(ExchangeError::transport(TransportCause::ServerTimedOut {
                    status: status.as_u16(),
                }));
            }
            return Err(ExchangeError::application(status.as_u16(), body_text));
        }

        if method == Method::GET && status == StatusCode::NOT_FOUND {
            if allow_404 {
                return Ok(Found::NotFound);
            }
            let body_text = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::application(404, body_text));
        }

        if status == StatusCode::NO_CONTENT {
            // Caller expects no body; decode `()` via a zero-length JSON
            // object so `T = ()` round-trips.
            return serde_json::from_slice(b"null")
                .map(Found::Present)
                .map_err(|e| ExchangeError::internal(format!("decode empty response: {e}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ExchangeError::transport(TransportCause::Connect(e)))?;
        let bytes: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
        let decoded = serde_json::from_slice(bytes)
            .map_err(|e| ExchangeError::application(status.as_u16(), format!("decode failure: {e}")))?;
        Ok(Found::Present(decoded))
    }

    /// `GET orgs/{org}` (spec.md §6).
    pub async fn get_organization(&self, org: &str, retry: &RetryPolicy) -> Result<Organization> {
        let path = format!("orgs/{org}");
        let resp: OrganizationResponse = self
            .call::<(), _>(Method::GET, &path, &[], None, retry, true)
            .await?
            .into_option()
            .ok_or_else(|| ExchangeError::not_found("organization"))?;
        resp.orgs
            .into_values()
            .next()
            .ok_or_else(|| ExchangeError::not_found("organization"))
    }

    /// `GET orgs/{org}/workloads?workloadUrl=...&arch=...[&version=...]`.
    pub async fn search_workloads(
        &self,
        org: &str,
        workload_url: &str,
        arch: &str,
        version: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<Workload>> {
        let path = format!("orgs/{org}/workloads");
        let mut query = vec![("workloadUrl", workload_url), ("arch", arch)];
        if let Some(v) = version {
            query.push(("version", v));
        }
        let resp: WorkloadSearchResponse = self
            .call::<(), _>(Method::GET, &path, &query, None, retry, true)
            .await?
            .into_option()
            .unwrap_or(WorkloadSearchResponse {
                workloads: Default::default(),
            });
        Ok(resp.into_vec())
    }

    /// `GET orgs/{org}/microservices?specRef=...&arch=...[&version=...]`.
    pub async fn search_microservices(
        &self,
        org: &str,
        spec_ref: &str,
        arch: &str,
        version: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<Microservice>> {
        let path = format!("orgs/{org}/microservices");
        let mut query = vec![("specRef", spec_ref), ("arch", arch)];
        if let Some(v) = version {
            query.push(("version", v));
        }
        let resp: MicroserviceSearchResponse = self
            .call::<(), _>(Method::GET, &path, &query, None, retry, true)
            .await?
            .into_option()
            .unwrap_or(MicroserviceSearchResponse {
                microservices: Default::default(),
            });
        Ok(resp.into_vec())
    }

    /// `GET orgs/{org}/bctypes/{type}/blockchains/{name}`.
    pub async fn get_blockchain_client(
        &self,
        org: &str,
        bc_type: &str,
        name: &str,
        retry: &RetryPolicy,
    ) -> Result<BlockchainClient> {
        let path = format!("orgs/{org}/bctypes/{bc_type}/blockchains/{name}");
        let resp: BlockchainResponse = self
            .call::<(), _>(Method::GET, &path, &[], None, retry, true)
            .await?
            .into_option()
            .ok_or_else(|| ExchangeError::not_found("blockchain client"))?;
        resp.blockchains
            .into_values()
            .next()
            .ok_or_else(|| ExchangeError::not_found("blockchain client"))
    }

    /// `POST orgs/{org}/nodes/{id}/heartbeat`.
    pub async fn post_heartbeat(&self, org: &str, id: &str, retry: &RetryPolicy) -> Result<()> {
        let path = format!("orgs/{org}/nodes/{id}/heartbeat");
        self.call::<(), ()>(Method::POST, &path, &[], Some(&()), retry, false)
            .await?;
        Ok(())
    }

    /// Reads the node's own record to pick up any heartbeat interval
    /// override (spec.md §3 PollState, §4.F Bootstrapping transition).
    pub async fn get_heartbeat_intervals(
        &self,
        org: &str,
        id: &str,
        retry: &RetryPolicy,
    ) -> Result<HeartbeatIntervals> {
        let path = format!("orgs/{org}/nodes/{id}");
        let found: Found<HeartbeatIntervals> =
            self.call::<(), _>(Method::GET, &path, &[], None, retry, true).await?;
        Ok(found.into_option().unwrap_or_default())
    }

    /// `POST orgs/{org}/changes` with `{changeId, maxRecords}`.
    pub async fn post_changes(
        &self,
        org: &str,
        change_id: u64,
        max_records: u32,
        retry: &RetryPolicy,
    ) -> Result<(Vec<Change>, u64)> {
        let path = format!("orgs/{org}/changes");
        let req = ChangesRequest {
            change_id,
            max_records,
        };
        let resp: ChangesResponse = self
            .call(Method::POST, &path, &[], Some(&req), retry, false)
            .await?
            .into_option()
            .ok_or_else(|| ExchangeError::internal("changes endpoint returned no body"))?;
        Ok((resp.changes, resp.most_recent_change_id))
    }

    /// `GET orgs/{org}/changes/maxchangeid`.
    pub async fn get_max_change_id(&self, org: &str, retry: &RetryPolicy) -> Result<u64> {
        let path = format!("orgs/{org}/changes/maxchangeid");
        let resp: MaxChangeIdResponse = self
            .call::<(), _>(Method::GET, &path, &[], None, retry, false)
            .await?
            .into_option()
            .ok_or_else(|| ExchangeError::internal("maxchangeid endpoint returned no body"))?;
        Ok(resp.max_change_id)
    }
}

/// Port over [`ExchangeClient`], so the worker and definition lookup can be
/// exercised against a fake in tests (spec.md §8: the worker's behavior
/// must be testable without a live Exchange).
#[async_trait::async_trait]
pub trait ExchangeApi: Send + Sync {
    async fn get_organization(&self, org: &str, retry: &RetryPolicy) -> Result<Organization>;

    async fn search_workloads(
        &self,
        org: &str,
        workload_url: &str,
        arch: &str,
        version: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<Workload>>;

    async fn search_microservices(
        &self,
        org: &str,
        spec_ref: &str,
        arch: &str,
        version: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<Microservice>>;

    async fn get_blockchain_client(
        &self,
        org: &str,
        bc_type: &str,
        name: &str,
        retry: &RetryPolicy,
    ) -> Result<BlockchainClient>;

    async fn post_heartbeat(&self, org: &str, id: &str, retry: &RetryPolicy) -> Result<()>;

    async fn get_heartbeat_intervals(
        &self,
        org: &str,
        id: &str,
        retry: &RetryPolicy,
    ) -> Result<HeartbeatIntervals>;

    async fn post_changes(
        &self,
        org: &str,
        change_id: u64,
        max_records: u32,
        retry: &RetryPolicy,
    ) -> Result<(Vec<Change>, u64)>;

    async fn get_max_change_id(&self, org: &str, retry: &RetryPolicy) -> Result<u64>;
}

#[async_trait::async_trait]
impl ExchangeApi for ExchangeClient {
    async fn get_organization(&self, org: &str, retry: &RetryPolicy) -> Result<Organization> {
        ExchangeClient::get_organization(self, org, retry).await
    }

    async fn search_workloads(
        &self,
        org: &str,
        workload_url: &str,
        arch: &str,
        version: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<Workload>> {
        ExchangeClient::search_workloads(self, org, workload_url, arch, version, retry).await
    }

    async fn search_microservices(
        &self,
        org: &str,
        spec_ref: &str,
        arch: &str,
        version: Option<&str>,
        retry: &RetryPolicy,
    ) -> Result<Vec<Microservice>> {
        ExchangeClient::search_microservices(self, org, spec_ref, arch, version, retry).await
    }

    async fn get_blockchain_client(
        &self,
        org: &str,
        bc_type: &str,
        name: &str,
        retry: &RetryPolicy,
    ) -> Result<BlockchainClient> {
        ExchangeClient::get_blockchain_client(self, org, bc_type, name, retry).await
    }

    async fn post_heartbeat(&self, org: &str, id: &str, retry: &RetryPolicy) -> Result<()> {
        ExchangeClient::post_heartbeat(self, org, id, retry).await
    }

    async fn get_heartbeat_intervals(
        &self,
        org: &str,
        id: &str,
        retry: &RetryPolicy,
    ) -> Result<HeartbeatIntervals> {
        ExchangeClient::get_heartbeat_intervals(self, org, id, retry).await
    }

    async fn post_changes(
        &self,
        org: &str,
        change_id: u64,
        max_records: u32,
        retry: &RetryPolicy,
    ) -> Result<(Vec<Change>, u64)> {
        ExchangeClient::post_changes(self, org, change_id, max_records, retry).await
    }

    async fn get_max_change_id(&self, org: &str, retry: &RetryPolicy) -> Result<u64> {
        ExchangeClient::get_max_change_id(self, org, retry).await
    }
}
