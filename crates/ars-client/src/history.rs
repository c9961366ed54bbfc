//! History page sources.

use std::{future::Future, sync::Arc};

use ars_proto::{HistoryPage, TeamId};
use tracing::debug;

use crate::{auth::AuthClient, error::ClientError};

/// Something that can fetch history pages.
pub trait HistorySource: Send + Sync + 'static {
    /// Fetch page `page` of `team`'s history. Page 1 is the most recent.
    fn fetch(
        &self,
        team: &TeamId,
        page: u32,
    ) -> impl Future<Output = Result<HistoryPage, ClientError>> + Send;
}

/// History over the REST backend.
#[derive(Debug, Clone)]
pub struct HttpHistory {
    client: Arc<AuthClient>,
}

impl HttpHistory {
    /// Fetch through `client`, sharing its tokens.
    pub fn new(client: Arc<AuthClient>) -> Self {
        Self { client }
    }
}

impl HistorySource for HttpHistory {
    async fn fetch(&self, team: &TeamId, page: u32) -> Result<HistoryPage, ClientError> {
        let url = self.client.endpoints().history(team, page);
        debug!(%team, page, "GET history");

        let body = self.client.get(&url).await?;
        Ok(HistoryPage::decode(&body)?)
    }
}
