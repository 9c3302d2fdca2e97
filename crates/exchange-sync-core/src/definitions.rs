//! Definition Lookup (spec.md §4.C). Built on top of the Exchange Client
//! and the Version-Range Resolver; called on demand by peer workers outside
//! this core.

use std::sync::Arc;

use crate::client::{ExchangeApi, RetryPolicy};
use crate::error::{ExchangeError, Result};
use crate::model::{ApiSpec, BlockchainClient, Microservice, Organization, VersionSelector, Workload};
use crate::version::{Range, Version};

/// Resolves workload/microservice definitions by name, organization, and
/// version range (spec.md §4.C).
pub struct DefinitionLookup {
    client: Arc<dyn ExchangeApi>,
    retry: RetryPolicy,
}

impl DefinitionLookup {
    pub fn new(client: Arc<dyn ExchangeApi>, retry: RetryPolicy) -> Self {
        DefinitionLookup { client, retry }
    }

    /// `getWorkload` (spec.md §4.C): exact version ⇒ exactly one match
    /// expected; range (or empty) ⇒ highest in range, `None` if no match.
    pub async fn get_workload(
        &self,
        url: &str,
        org: &str,
        version_or_range: &str,
        arch: &str,
    ) -> Result<Option<Workload>> {
        let selector = VersionSelector::parse(version_or_range);
        match &selector {
            VersionSelector::Exact(v) => {
                let matches = self
                    .client
                    .search_workloads(org, url, arch, Some(v), &self.retry)
                    .await?;
                match matches.len() {
                    1 => Ok(Some(matches.into_iter().next().unwrap())),
                    n => Err(ExchangeError::cardinality("workload", n)),
                }
            }
            VersionSelector::Range(r) => {
                let matches = self
                    .client
                    .search_workloads(org, url, arch, None, &self.retry)
                    .await?;
                select_highest(matches, r, |w| &w.version)
            }
        }
    }

    /// `getMicroservice` (spec.md §4.C): identical semantics to
    /// `getWorkload`.
    pub async fn get_microservice(
        &self,
        spec_ref: &str,
        org: &str,
        version_or_range: &str,
        arch: &str,
    ) -> Result<Option<Microservice>> {
        let selector = VersionSelector::parse(version_or_range);
        match &selector {
            VersionSelector::Exact(v) => {
                let matches = self
                    .client
                    .search_microservices(org, spec_ref, arch, Some(v), &self.retry)
                    .await?;
                match matches.len() {
                    1 => Ok(Some(matches.into_iter().next().unwrap())),
                    n => Err(ExchangeError::cardinality("microservice", n)),
                }
            }
            VersionSelector::Range(r) => {
                let matches = self
                    .client
                    .search_microservices(org, spec_ref, arch, None, &self.retry)
                    .await?;
                select_highest(matches, r, |m| &m.version)
            }
        }
    }

    /// `resolveWorkload` (spec.md §4.C): fetches the workload, then resolves
    /// each declared `apiSpec` dependency via `getMicroservice`. Fails with
    /// an unresolved-dependency error if any dependency is missing. The
    /// boolean gate for dependency resolution described in the spec is
    /// always `true` in this core.
    pub async fn resolve_workload(
        &self,
        url: &str,
        org: &str,
        version_or_range: &str,
        arch: &str,
    ) -> Result<(Workload, Vec<ApiSpec>)> {
        let workload = self
            .get_workload(url, org, version_or_range, arch)
            .await?
            .ok_or_else(|| ExchangeError::not_found("workload"))?;

        let mut resolved = Vec::with_capacity(workload.api_spec.len());
        for dep in &workload.api_spec {
            let found = self
                .get_microservice(&dep.spec_ref, &dep.org, &dep.version, &dep.arch)
                .await?;
            if found.is_none() {
                return Err(ExchangeError::unresolved_dependency(
                    dep.spec_ref.clone(),
                    dep.org.clone(),
                    dep.version.clone(),
                ));
            }
            resolved.push(dep.clone());
        }

        Ok((workload, resolved))
    }

    /// `getOrganization` (spec.md §4.C).
    pub async fn get_organization(&self, org: &str) -> Result<Organization> {
        self.client.get_organization(org, &self.retry).await
    }

    /// `getBlockchainClient` (spec.md §4.C): returns the opaque `details`
    /// string verbatim.
    pub async fn get_blockchain_client(
        &self,
        org: &str,
        bc_type: &str,
        name: &str,
    ) -> Result<BlockchainClient> {
        self.client
            .get_blockchain_client(org, bc_type, name, &self.retry)
            .await
    }
}

fn select_highest<T>(
    candidates: Vec<T>,
    range_str: &str,
    version_of: impl Fn(&T) -> &String,
) -> Result<Option<T>> {
    let range = Range::parse(range_str)?;
    let versions: Result<Vec<(Version, usize)>> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| Version::parse(version_of(c)).map(|v| (v, i)))
        .collect();
    let versions = versions?;
    let best = versions
        .iter()
        .filter(|(v, _)| range.contains(v))
        .max_by(|a, b| a.0.cmp(&b.0));
    Ok(best.map(|(_, i)| *i).map(|i| {
        candidates
            .into_iter()
            .nth(i)
            .expect("index came from the same candidates vec")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HeartbeatIntervals, Microservice, Workload};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FakeClient {
        workloads: Vec<Workload>,
        microservices: Mutex<Vec<Microservice>>,
    }

    #[async_trait]
    impl ExchangeApi for FakeClient {
        async fn get_organization(&self, _org: &str, _r: &RetryPolicy) -> Result<Organization> {
            Ok(Organization { description: None })
        }

        async fn search_workloads(
            &self,
            _org: &str,
            _url: &str,
            _arch: &str,
            version: Option<&str>,
            _r: &RetryPolicy,
        ) -> Result<Vec<Workload>> {
            Ok(self
                .workloads
                .iter()
                .filter(|w| version.is_none_or(|v| w.version == v))
                .cloned()
                .collect())
        }

        async fn search_microservices(
            &self,
            _org: &str,
            _spec_ref: &str,
            _arch: &str,
            version: Option<&str>,
            _r: &RetryPolicy,
        ) -> Result<Vec<Microservice>> {
            Ok(self
                .microservices
                .lock()
                .unwrap()
                .iter()
                .filter(|m| version.is_none_or(|v| m.version == v))
                .cloned()
                .collect())
        }

        async fn get_blockchain_client(
            &self,
            _org: &str,
            _t: &str,
            _n: &str,
            _r: &RetryPolicy,
        ) -> Result<BlockchainClient> {
            Ok(BlockchainClient {
                details: "opaque".into(),
            })
        }

        async fn post_heartbeat(&self, _org: &str, _id: &str, _r: &RetryPolicy) -> Result<()> {
            Ok(())
        }

        async fn get_heartbeat_intervals(
            &self,
            _org: &str,
            _id: &str,
            _r: &RetryPolicy,
        ) -> Result<HeartbeatIntervals> {
            Ok(HeartbeatIntervals::default())
        }

        async fn post_changes(
            &self,
            _org: &str,
            _cid: u64,
            _max: u32,
            _r: &RetryPolicy,
        ) -> Result<(Vec<crate::model::Change>, u64)> {
            Ok((vec![], 0))
        }

        async fn get_max_change_id(&self, _org: &str, _r: &RetryPolicy) -> Result<u64> {
            Ok(0)
        }
    }

    fn workload(version: &str) -> Workload {
        Workload {
            url: "U".into(),
            org: "O".into(),
            version: version.into(),
            arch: "amd64".into(),
            api_spec: vec![],
        }
    }

    #[tokio::test]
    async fn highest_in_range_is_selected() {
        let client = Arc::new(FakeClient {
            workloads: vec![workload("1.0.0"), workload("1.2.0"), workload("2.0.0")],
            microservices: Mutex::new(vec![]),
        });
        let lookup = DefinitionLookup::new(client, RetryPolicy::limited(2, Duration::from_millis(1)));
        let got = lookup
            .get_workload("U", "O", "[1.0.0,2.0.0)", "amd64")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.version, "1.2.0");
    }

    #[tokio::test]
    async fn exact_version_also_resolves() {
        let client = Arc::new(FakeClient {
            workloads: vec![workload("1.0.0"), workload("1.2.0"), workload("2.0.0")],
            microservices: Mutex::new(vec![]),
        });
        let lookup = DefinitionLookup::new(client, RetryPolicy::limited(2, Duration::from_millis(1)));
        let got = lookup
            .get_workload("U", "O", "1.2.0", "amd64")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.version, "1.2.0");
    }

    #[tokio::test]
    async fn exact_version_with_no_match_is_cardinality_error() {
        let client = Arc::new(FakeClient {
            workloads: vec![workload("1.0.0"), workload("1.2.0"), workload("2.0.0")],
            microservices: Mutex::new(vec![]),
        });
        let lookup = DefinitionLookup::new(client, RetryPolicy::limited(2, Duration::from_millis(1)));
        let err = lookup
            .get_workload("U", "O", "1.5.0", "amd64")
            .await
            .unwrap_err();
        assert!(!err.is_transport());
    }

    #[tokio::test]
    async fn resolve_workload_fails_on_missing_dependency() {
        let mut w = workload("1.0.0");
        w.api_spec.push(ApiSpec {
            spec_ref: "svc".into(),
            org: "O".into(),
            version: "1.0.0".into(),
            arch: "amd64".into(),
        });
        let client = Arc::new(FakeClient {
            workloads: vec![w],
            microservices: Mutex::new(vec![]),
        });
        let lookup = DefinitionLookup::new(client, RetryPolicy::limited(2, Duration::from_millis(1)));
        let err = lookup
            .resolve_workload("U", "O", "1.0.0", "amd64")
            .await
            .unwrap_err();
        assert!(!err.is_transport());
    }
}
