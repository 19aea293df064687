//! Chart repository
//!
//! Typed façade over the JSON-RPC transport. The trait boundary lets the
//! synchronization service and filter pipeline run against in-memory
//! stand-ins in tests.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use chartsync_common::{Element, Result, ScoreInformation};

use crate::rpc::RpcClient;

/// JSON-RPC method returning the score structure
pub const GET_SCORE_INFORMATION: &str = "getScoreInformation";

/// JSON-RPC method returning the elements of one period
pub const GET_PERIOD_ELEMENTS: &str = "getPeriodElements";

/// Data access for chart server content
#[async_trait]
pub trait ChartRepository: Send + Sync {
    /// Fetch the score structure (staves and their periods)
    async fn get_score_information(&self) -> Result<ScoreInformation>;

    /// Fetch the elements of `period_name` within `staff_name`
    async fn get_period_elements(&self, staff_name: &str, period_name: &str)
        -> Result<Vec<Element>>;
}

/// [`ChartRepository`] backed by a chart server
pub struct RpcChartRepository {
    client: RpcClient,
}

impl RpcChartRepository {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl ChartRepository for RpcChartRepository {
    async fn get_score_information(&self) -> Result<ScoreInformation> {
        let score: ScoreInformation = self.client.call(GET_SCORE_INFORMATION, None).await?;
        debug!(staves = score.staves.len(), "Received score information");
        Ok(score)
    }

    async fn get_period_elements(
        &self,
        staff_name: &str,
        period_name: &str,
    ) -> Result<Vec<Element>> {
        let params = json!({
            "staffName": staff_name,
            "periodName": period_name,
        });
        let elements: Vec<Element> = self.client.call(GET_PERIOD_ELEMENTS, Some(params)).await?;
        debug!(
            staff = %staff_name,
            period = %period_name,
            elements = elements.len(),
            "Received period elements"
        );
        Ok(elements)
    }
}
