//! Wire-level request/response envelopes for the Exchange API
//! (spec.md §6 EXTERNAL INTERFACES).
//!
//! The Exchange wraps search results in a map keyed by a composite id
//! (`org/url_version_arch`); the core only needs the values, so the typed
//! response structs here collect them into a `Vec` via `HashMap::into_values`.

use serde::Deserialize;
use std::collections::HashMap;

use crate::model::{BlockchainClient, Change, Microservice, Organization, Workload};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangesRequest {
    pub change_id: u64,
    pub max_records: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChangesResponse {
    #[serde(default)]
    pub changes: Vec<Change>,
    pub most_recent_change_id: u64,
    #[serde(default)]
    pub exchange_version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MaxChangeIdResponse {
    pub max_change_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OrganizationResponse {
    #[serde(default)]
    pub orgs: HashMap<String, Organization>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkloadSearchResponse {
    #[serde(default)]
    pub workloads: HashMap<String, Workload>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MicroserviceSearchResponse {
    #[serde(default)]
    pub microservices: HashMap<String, Microservice>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BlockchainResponse {
    #[serde(default)]
    pub blockchains: HashMap<String, BlockchainClient>,
}

impl WorkloadSearchResponse {
    pub(crate) fn into_vec(self) -> Vec<Workload> {
        self.workloads.into_values().collect()
    }
}

impl MicroserviceSearchResponse {
    pub(crate) fn into_vec(self) -> Vec<Microservice> {
        self.microservices.into_values().collect()
    }
}
