use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;
use url::Url;

use super::{
    AssetPath, ExportRequest, Expr, ImageHandle, JobId, JobState, QueueProbe,
    Region, RegionReducer, RemoteJobClient, SourceRef,
};
use crate::error::{PipelineError, Result};
use crate::grid::{Grid, Raster};
use crate::summary::ReductionOutput;

/// JSON-over-HTTP adapter for the compute gateway.
#[derive(Clone, Debug)]
pub struct HttpComputeClient {
    http: reqwest::Client,
    base: Url,
}

#[derive(Deserialize)]
struct JobAccepted {
    id: JobId,
}

#[derive(Deserialize)]
struct ActiveCount {
    active: usize,
}

#[derive(Deserialize)]
struct Availability {
    available: bool,
}

#[derive(Deserialize)]
struct JobStatus {
    state: JobState,
}

#[derive(Serialize)]
struct ReductionBody<'a> {
    expression: &'a Expr,
    reducer: RegionReducer,
    region: &'a Region,
}

#[derive(Serialize)]
struct AvailabilityBody<'a> {
    source: &'a SourceRef,
    date: NaiveDate,
    region: &'a Region,
}

#[derive(Serialize)]
struct SampleBody<'a> {
    expression: &'a Expr,
    region: &'a Region,
}

#[derive(Serialize)]
struct IngestBody<'a> {
    asset: &'a AssetPath,
    raster: &'a Raster,
    region: &'a Region,
}

impl HttpComputeClient {
    /// `endpoint` is the gateway root; requests are scoped to `project`.
    pub fn new(endpoint: &Url, project: &str, timeout: Duration) -> Result<Self> {
        let base = endpoint
            .join(&format!("v1/projects/{project}/"))
            .map_err(|err| {
                PipelineError::Invalid(format!(
                    "invalid compute endpoint {endpoint}: {err}"
                ))
            })?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|err| {
            PipelineError::Invalid(format!("invalid request path {path}: {err}"))
        })
    }

    async fn decode<T: DeserializeOwned>(
        url: Url,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::HttpStatus {
                status,
                url: url.to_string(),
            });
        }
        Ok(response.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "GET");
        let response = self.http.get(url.clone()).send().await?;
        Self::decode(url, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(path)?;
        debug!(%url, "POST");
        let response = self.http.post(url.clone()).json(body).send().await?;
        Self::decode(url, response).await
    }
}

#[async_trait]
impl QueueProbe for HttpComputeClient {
    async fn active_count(&self) -> Result<usize> {
        let count: ActiveCount = self.get_json("jobs/active-count").await?;
        Ok(count.active)
    }
}

#[async_trait]
impl RemoteJobClient for HttpComputeClient {
    async fn submit_export(&self, request: ExportRequest) -> Result<JobId> {
        let accepted: JobAccepted = self.post_json("exports", &request).await?;
        Ok(accepted.id)
    }

    async fn reduce_region(
        &self,
        expression: &Expr,
        reducer: RegionReducer,
        region: &Region,
    ) -> Result<ReductionOutput> {
        self.post_json(
            "reductions",
            &ReductionBody {
                expression,
                reducer,
                region,
            },
        )
        .await
    }

    async fn get_image(&self, asset: &AssetPath) -> Result<ImageHandle> {
        self.get_json(&format!("assets/{}", asset.0.trim_start_matches('/')))
            .await
    }

    async fn query_availability(
        &self,
        source: &SourceRef,
        date: NaiveDate,
        region: &Region,
    ) -> Result<bool> {
        let availability: Availability = self
            .post_json(
                "availability",
                &AvailabilityBody {
                    source,
                    date,
                    region,
                },
            )
            .await?;
        Ok(availability.available)
    }

    async fn sample_field(&self, expression: &Expr, region: &Region) -> Result<Grid> {
        self.post_json("samples", &SampleBody { expression, region })
            .await
    }

    async fn ingest_raster(
        &self,
        asset: &AssetPath,
        raster: &Raster,
        region: &Region,
    ) -> Result<JobId> {
        let accepted: JobAccepted = self
            .post_json(
                "ingestions",
                &IngestBody {
                    asset,
                    raster,
                    region,
                },
            )
            .await?;
        Ok(accepted.id)
    }

    async fn job_state(&self, id: &JobId) -> Result<JobState> {
        let status: JobStatus = self.get_json(&format!("jobs/{id}")).await?;
        Ok(status.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_scoped_under_the_project() {
        let endpoint = Url::parse("https://compute.example.net/").unwrap();
        let client = HttpComputeClient::new(&endpoint, "reef-lab", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.url("jobs/active-count").unwrap().as_str(),
            "https://compute.example.net/v1/projects/reef-lab/jobs/active-count"
        );
    }
}
