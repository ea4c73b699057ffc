//! Job-based transcription: upload, submit, then poll until done
//!
//! Polling is bounded both by attempt count and by an overall deadline.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::language::LanguageProfile;
use super::stt::TranscriptionProvider;
use crate::config::TranscriptionConfig;
use crate::{Error, Result};

const ASSEMBLYAI_URL: &str = "https://api.assemblyai.com/v2";

/// State of a remote transcription job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed(String),
    Failed(String),
}

/// Limits on waiting for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between status checks
    pub interval: Duration,
    /// Maximum number of status checks
    pub max_attempts: u32,
    /// Ceiling on the whole upload-submit-poll sequence
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
            deadline: Duration::from_secs(90),
        }
    }
}

/// Remote service operations behind a job-based transcriber
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Upload audio, returning a handle the job can reference
    async fn upload(&self, audio: &[u8]) -> Result<String>;

    /// Start a job for an uploaded handle, returning the job id
    async fn submit(&self, handle: &str, language: &LanguageProfile) -> Result<String>;

    /// Current job state
    async fn status(&self, job_id: &str) -> Result<JobStatus>;
}

/// Transcriber driving a `JobBackend` under a `PollPolicy`
pub struct JobTranscriber<B> {
    backend: B,
    policy: PollPolicy,
}

impl<B: JobBackend> JobTranscriber<B> {
    pub const fn new(backend: B, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    async fn run(&self, audio: &[u8], language: &LanguageProfile) -> Result<String> {
        let handle = self.backend.upload(audio).await?;
        let job_id = self.backend.submit(&handle, language).await?;
        tracing::debug!(job_id = %job_id, "transcription job submitted");

        for attempt in 1..=self.policy.max_attempts {
            match self.backend.status(&job_id).await? {
                JobStatus::Completed(text) => {
                    tracing::info!(job_id = %job_id, attempt, "transcription job completed");
                    return Ok(text);
                }
                JobStatus::Failed(reason) => {
                    tracing::warn!(job_id = %job_id, reason = %reason, "transcription job failed");
                    return Err(Error::Transcription(format!("job failed: {reason}")));
                }
                status @ (JobStatus::Queued | JobStatus::Processing) => {
                    tracing::trace!(job_id = %job_id, attempt, ?status, "job still running");
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.interval).await;
                    }
                }
            }
        }

        Err(Error::Transcription(format!(
            "job {job_id} unfinished after {} status checks",
            self.policy.max_attempts
        )))
    }
}

#[async_trait]
impl<B: JobBackend> TranscriptionProvider for JobTranscriber<B> {
    async fn transcribe(&self, audio: &[u8], language: &LanguageProfile) -> Result<String> {
        tokio::time::timeout(self.policy.deadline, self.run(audio, language))
            .await
            .map_err(|_| {
                Error::Transcription(format!(
                    "transcription exceeded {:?} deadline",
                    self.policy.deadline
                ))
            })?
    }
}

/// AssemblyAI upload/transcript API
pub struct AssemblyAiBackend {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
}

impl AssemblyAiBackend {
    /// Create a backend
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, config: &TranscriptionConfig) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            api_key,
            model: config.model.clone(),
        })
    }

    async fn checked<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "AssemblyAI API error");
            return Err(Error::Transcription(format!("AssemblyAI API error {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse AssemblyAI response: {e}")))
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Serialize)]
struct TranscriptRequest<'a> {
    audio_url: &'a str,
    language_code: &'a str,
    speech_model: &'a str,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl TranscriptResponse {
    fn job_status(self) -> JobStatus {
        match self.status.as_str() {
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed(self.text.unwrap_or_default()),
            _ => JobStatus::Failed(self.error.unwrap_or(self.status)),
        }
    }
}

#[async_trait]
impl JobBackend for AssemblyAiBackend {
    async fn upload(&self, audio: &[u8]) -> Result<String> {
        let response = self
            .client
            .post(format!("{ASSEMBLYAI_URL}/upload"))
            .header("authorization", self.api_key.expose_secret())
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("upload failed: {e}")))?;

        let uploaded: UploadResponse = Self::checked(response).await?;
        Ok(uploaded.upload_url)
    }

    async fn submit(&self, handle: &str, language: &LanguageProfile) -> Result<String> {
        let request = TranscriptRequest {
            audio_url: handle,
            language_code: &language.code,
            speech_model: &self.model,
        };

        let response = self
            .client
            .post(format!("{ASSEMBLYAI_URL}/transcript"))
            .header("authorization", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("job submission failed: {e}")))?;

        let job: TranscriptResponse = Self::checked(response).await?;
        Ok(job.id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let response = self
            .client
            .get(format!("{ASSEMBLYAI_URL}/transcript/{job_id}"))
            .header("authorization", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| Error::Transcription(format!("status check failed: {e}")))?;

        let job: TranscriptResponse = Self::checked(response).await?;
        Ok(job.job_status())
    }
}
