use crate::core::config::Config;
use crate::services::catalog::{AvatarProfile, VoiceProfile};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::Duration;

/// Input handed to the generation backend.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct GenerationRequest {
    pub text: String,
    pub avatar: AvatarProfile,
    pub voice: VoiceProfile,
}

/// Successful backend response.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GenerationOutput {
    pub media_ref: String,
    pub created_at: DateTime<Utc>,
}

/// The finished record handed off to the results consumer. Written once,
/// read-only afterwards.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub avatar: AvatarProfile,
    pub voice: VoiceProfile,
    pub media_ref: String,
    pub created_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn from_request(request: GenerationRequest, output: GenerationOutput) -> Self {
        Self {
            text: request.text,
            avatar: request.avatar,
            voice: request.voice,
            media_ref: output.media_ref,
            created_at: output.created_at,
        }
    }
}

#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput>;
}

/// Outcome of racing a generation call against a cancellation signal.
#[derive(Debug)]
pub enum GenerationWait {
    Finished(GenerationOutput),
    Cancelled,
}

/// Runs the generation call, abandoning it if `cancel` resolves first.
pub async fn generate_cancellable(
    client: &dyn GenerationClient,
    request: &GenerationRequest,
    cancel: impl Future<Output = ()>,
) -> Result<GenerationWait> {
    tokio::select! {
        res = client.generate(request) => Ok(GenerationWait::Finished(res?)),
        _ = cancel => {
            debug!("Generation call cancelled");
            Ok(GenerationWait::Cancelled)
        }
    }
}

// --- Simulated backend ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SimulatedConfig {
    #[serde(default = "default_simulated_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_simulated_media_ref_prefix")]
    pub media_ref_prefix: String,
}

fn default_simulated_delay_ms() -> u64 {
    3000
}
fn default_simulated_media_ref_prefix() -> String {
    "placeholder/videos".to_string()
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_simulated_delay_ms(),
            media_ref_prefix: default_simulated_media_ref_prefix(),
        }
    }
}

/// Stands in for the real synthesis service: a fixed delay, then a
/// placeholder media reference.
pub struct SimulatedGenerationClient {
    delay: Duration,
    media_ref_prefix: String,
}

impl SimulatedGenerationClient {
    pub fn new(config: SimulatedConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.delay_ms),
            media_ref_prefix: config.media_ref_prefix,
        }
    }
}

#[async_trait]
impl GenerationClient for SimulatedGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        debug!(
            "Simulating generation: avatar {} / voice {} / {} chars",
            request.avatar.id,
            request.voice.id,
            request.text.len()
        );
        tokio::time::sleep(self.delay).await;

        // Unique ref per run so repeated generations do not collide
        let media_ref = format!("{}/{:08x}.mp4", self.media_ref_prefix, rand::random::<u32>());
        Ok(GenerationOutput {
            media_ref,
            created_at: Utc::now(),
        })
    }
}

// --- HTTP backend ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpGenerationConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct JobEvent {
    status: String,
    media_ref: Option<String>,
    created_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

/// Submits the job, then follows the server-sent event stream until the job
/// completes or fails.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGenerationClient {
    pub fn new(config: HttpGenerationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Parses one line of the event stream. Non-data lines and keep-alives
/// return `Ok(None)`.
fn parse_event_line(line: &str) -> Result<Option<JobEvent>> {
    if let Some(json_str) = line.strip_prefix("data: ") {
        if json_str.is_empty() || json_str == "null" {
            return Ok(None);
        }
        let event = serde_json::from_str(json_str)
            .with_context(|| format!("Bad job event: {}", json_str))?;
        return Ok(Some(event));
    }
    Ok(None)
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        debug!("Submitting generation job to {}", self.base_url);
        let submit: SubmitResponse = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await
            .context("Failed to submit generation request")?
            .error_for_status()
            .context("Generation submit rejected")?
            .json()
            .await
            .context("Failed to parse submit response")?;

        debug!("Job accepted: {}", submit.job_id);

        let mut stream = self
            .client
            .get(format!("{}/api/jobs/{}/events", self.base_url, submit.job_id))
            .send()
            .await
            .context("Failed to connect to job event stream")?
            .error_for_status()
            .context("Job event stream rejected")?
            .bytes_stream();

        while let Some(item) = stream.next().await {
            let chunk = item.context("Job event stream error")?;
            let chunk_text = String::from_utf8_lossy(&chunk);

            for line in chunk_text.lines() {
                let Some(event) = parse_event_line(line)? else {
                    continue;
                };
                match event.status.as_str() {
                    "completed" => {
                        let media_ref = event
                            .media_ref
                            .ok_or_else(|| anyhow!("Completed event without media_ref"))?;
                        debug!("Job {} completed: {}", submit.job_id, media_ref);
                        return Ok(GenerationOutput {
                            media_ref,
                            created_at: event.created_at.unwrap_or_else(Utc::now),
                        });
                    }
                    "failed" => {
                        bail!(
                            "Generation failed: {}",
                            event.error.unwrap_or_else(|| "unknown error".to_string())
                        );
                    }
                    other => debug!("Job {}: {}", submit.job_id, other),
                }
            }
        }

        bail!("Job event stream ended without completion")
    }
}

pub fn create_generation_client(config: &Config) -> Result<Box<dyn GenerationClient>> {
    info!(
        "Initializing generation client for provider: {}",
        config.generation.provider
    );
    match config.generation.provider.as_str() {
        "simulated" => {
            let simulated = config.generation.simulated.clone().unwrap_or_default();
            Ok(Box::new(SimulatedGenerationClient::new(simulated)))
        }
        "http" => {
            let http = config
                .generation
                .http
                .clone()
                .ok_or_else(|| anyhow!("HTTP generation config missing"))?;
            Ok(Box::new(HttpGenerationClient::new(http)))
        }
        other => Err(anyhow!("Unknown generation provider: {}", other)),
    }
}
