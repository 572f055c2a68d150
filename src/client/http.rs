use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use super::ComputeClient;
use super::error::ApiError;
use super::types::{
    AllocationComparisonResult, AllocationRequest, AnnuityComparisonRequest,
    AnnuityComparisonResult, HouseholdRequest, HouseholdResult, LifeEventRequest,
    LifeEventResult, MortalityRates, Progress, SimulationRequest, SimulationResult,
    SsTimingComparisonResult, SsTimingRequest, StateComparisonRequest, StateComparisonResult,
    StreamEvent,
};
use crate::scenario::Gender;

#[derive(Debug, thiserror::Error)]
pub enum ClientConfigError {
    #[error("invalid compute service url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("could not build http client: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct HttpComputeClient {
    client: Client,
    base: Url,
}

impl HttpComputeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientConfigError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Network(format!("bad endpoint {path}: {e}")))
    }

    async fn send<Req>(&self, path: &str, body: &Req) -> Result<Response, ApiError>
    where
        Req: Serialize + Sync + ?Sized,
    {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "posting to compute service");
        self.dispatch(path, self.client.post(url).json(body)).await
    }

    async fn get_json<Resp>(&self, path: &str, query: &[(&str, String)]) -> Result<Resp, ApiError>
    where
        Resp: DeserializeOwned,
    {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        tracing::debug!(%url, "querying compute service");
        let response = self.dispatch(path, self.client.get(url)).await?;
        response
            .json::<Resp>()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))
    }

    async fn dispatch(&self, path: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            let err = ApiError::from_reqwest(&e);
            tracing::warn!(path, error = %err, "compute request failed in transport");
            err
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let err = ApiError::from_response(status.as_u16(), &text);
        tracing::warn!(path, status = status.as_u16(), error = %err, "compute request rejected");
        Err(err)
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, ApiError>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        let response = self.send(path, body).await?;
        response
            .json::<Resp>()
            .await
            .map_err(|e| ApiError::from_reqwest(&e))
    }
}

#[async_trait]
impl ComputeClient for HttpComputeClient {
    async fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, ApiError> {
        self.post_json("simulate", request).await
    }

    async fn simulate_streaming(
        &self,
        request: &SimulationRequest,
        on_progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<SimulationResult, ApiError> {
        let response = self.send("simulate/stream", request).await?;
        let mut body = response.bytes_stream();
        let mut decoder = StreamDecoder::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ApiError::from_reqwest(&e))?;
            for event in decoder.push(&chunk)? {
                if let Some(result) = settle(event, on_progress)? {
                    return Ok(result);
                }
            }
        }
        if let Some(event) = decoder.finish()? {
            if let Some(result) = settle(event, on_progress)? {
                return Ok(result);
            }
        }
        Err(ApiError::Simulation {
            status: None,
            message: "stream ended before the simulation completed".to_string(),
        })
    }

    async fn compare_states(
        &self,
        request: &StateComparisonRequest,
    ) -> Result<StateComparisonResult, ApiError> {
        self.post_json("compare-states", request).await
    }

    async fn compare_ss_timing(
        &self,
        request: &SsTimingRequest,
    ) -> Result<SsTimingComparisonResult, ApiError> {
        self.post_json("compare-ss-timing", request).await
    }

    async fn compare_allocations(
        &self,
        request: &AllocationRequest,
    ) -> Result<AllocationComparisonResult, ApiError> {
        self.post_json("compare-allocations", request).await
    }

    async fn compare_annuity(
        &self,
        request: &AnnuityComparisonRequest,
    ) -> Result<AnnuityComparisonResult, ApiError> {
        self.post_json("compare-annuity", request).await
    }

    async fn calculate_household(
        &self,
        request: &HouseholdRequest,
    ) -> Result<HouseholdResult, ApiError> {
        self.post_json("calculate-household", request).await
    }

    async fn compare_life_event(
        &self,
        request: &LifeEventRequest,
    ) -> Result<LifeEventResult, ApiError> {
        self.post_json("compare-life-event", request).await
    }

    async fn mortality(
        &self,
        gender: Gender,
        start_age: u32,
        end_age: u32,
    ) -> Result<MortalityRates, ApiError> {
        let path = format!("mortality/{}", gender.as_str());
        let query = [
            ("start_age", start_age.to_string()),
            ("end_age", end_age.to_string()),
        ];
        self.get_json(&path, &query).await
    }
}

fn settle(
    event: StreamEvent,
    on_progress: &mut (dyn FnMut(Progress) + Send),
) -> Result<Option<SimulationResult>, ApiError> {
    match event {
        StreamEvent::Progress(progress) => {
            on_progress(progress);
            Ok(None)
        }
        StreamEvent::Complete { result } => Ok(Some(*result)),
        StreamEvent::Error { message } => Err(ApiError::Simulation {
            status: None,
            message,
        }),
    }
}

/// Splits a streamed body into events. Accepts server-sent `data:` lines as well as bare
/// JSON lines; comments, `event:` lines and blank lines are skipped.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    buffer: Vec<u8>,
}

impl StreamDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, ApiError> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line))? {
                events.push(event);
            }
        }
        Ok(events)
    }

    pub fn finish(&mut self) -> Result<Option<StreamEvent>, ApiError> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_line(line: &str) -> Result<Option<StreamEvent>, ApiError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let payload = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None if line.starts_with('{') => line,
        None => return Ok(None),
    };
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| ApiError::Simulation {
            status: None,
            message: format!("malformed stream event: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_a_trailing_slash() {
        let client = HttpComputeClient::new("http://localhost:8000/api", Duration::from_secs(5))
            .expect("client should build");
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/api/");
        assert_eq!(
            client.endpoint("compare-states").expect("endpoint").as_str(),
            "http://localhost:8000/api/compare-states"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        assert!(matches!(
            HttpComputeClient::new("not a url", Duration::from_secs(1)),
            Err(ClientConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn decoder_handles_events_split_across_chunks() {
        let mut decoder = StreamDecoder::default();
        let first = decoder
            .push(b"data: {\"type\":\"progress\",\"ye")
            .expect("partial chunk");
        assert!(first.is_empty());

        let second = decoder
            .push(b"ar\":1,\"total_years\":30}\n\n: keep-alive\nevent: message\n")
            .expect("completed line");
        assert_eq!(
            second,
            vec![StreamEvent::Progress(Progress {
                year: 1,
                total_years: 30
            })]
        );
        assert_eq!(decoder.finish().expect("empty tail"), None);
    }

    #[test]
    fn decoder_accepts_bare_json_lines_and_flags_garbage() {
        let mut decoder = StreamDecoder::default();
        let events = decoder
            .push(b"{\"type\":\"error\",\"message\":\"boom\"}\n")
            .expect("bare json line");
        assert_eq!(
            events,
            vec![StreamEvent::Error {
                message: "boom".to_string()
            }]
        );
        assert!(decoder.push(b"data: {not json}\n").is_err());
    }
}
