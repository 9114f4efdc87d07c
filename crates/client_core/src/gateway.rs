use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::RankedEntry,
    protocol::{
        decode_page, decode_rank_lookup, LeaderboardQuery, SimulationStatus, UsernameQuery,
    },
};
use tracing::debug;
use url::Url;

use crate::error::SyncError;

/// One page of the ranked list, optionally narrowed to a username match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub query: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    fn to_query(&self) -> LeaderboardQuery {
        LeaderboardQuery {
            username: self.query.clone(),
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Read-only access to the leaderboard service. One call is one GET.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RankedEntry>, SyncError>;
    async fn lookup_rank(&self, username: &str) -> Result<Vec<RankedEntry>, SyncError>;
    async fn simulation_status(&self) -> Result<SimulationStatus, SyncError>;
}

pub struct HttpFetchGateway {
    http: Client,
    base_url: Url,
}

impl HttpFetchGateway {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: Client, mut base_url: Url) -> Self {
        // Url::join drops the last path segment unless it ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { http, base_url }
    }

    fn endpoint(&self, path: &str) -> Result<Url, SyncError> {
        self.base_url
            .join(path)
            .map_err(|err| SyncError::TransientNetworkFailure(format!("invalid url: {err}")))
    }

    async fn get_bytes<Q: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
    ) -> Result<Vec<u8>, SyncError> {
        let url = self.endpoint(path)?;
        let body = self
            .http
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FetchGateway for HttpFetchGateway {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<RankedEntry>, SyncError> {
        let body = self.get_bytes("leaderboard", &request.to_query()).await?;
        let entries = decode_page(&body, request.offset)?;
        debug!(
            offset = request.offset,
            limit = request.limit,
            returned = entries.len(),
            "fetched leaderboard page"
        );
        Ok(entries)
    }

    async fn lookup_rank(&self, username: &str) -> Result<Vec<RankedEntry>, SyncError> {
        let body = self
            .get_bytes(
                "users/rank",
                &UsernameQuery {
                    username: username.to_string(),
                },
            )
            .await?;
        let entries = decode_rank_lookup(&body)?;
        if entries.is_empty() {
            return Err(SyncError::NotFound);
        }
        Ok(entries)
    }

    async fn simulation_status(&self) -> Result<SimulationStatus, SyncError> {
        let body = self.get_bytes("simulation/status", &[] as &[(&str, &str)]).await?;
        serde_json::from_slice(&body).map_err(|err| SyncError::MalformedResponse(err.to_string()))
    }
}
