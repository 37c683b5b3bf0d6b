//! # Configuration Management
//!
//! Layered configuration: built-in defaults, then `config.toml` (optional),
//! then `APP_`-prefixed environment variables, then the bare `HOST`/`PORT`
//! variables deployment platforms set.

use crate::audio::DEFAULT_CEILING_BYTES;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub ai: AiConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Per-session audio limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Upper bound on buffered audio bytes per session; the buffer evicts
    /// oldest fragments to stay under it.
    pub buffer_ceiling_bytes: usize,

    /// Largest single chunk a connection may submit. Must not exceed the
    /// buffer ceiling.
    pub max_chunk_bytes: usize,

    /// Capacity of each session's broadcast channel, in events.
    pub broadcast_capacity: usize,
}

/// External transcription/summarization API settings. An empty `api_key`
/// selects the mock backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub transcription_model: String,
    pub summary_model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            audio: AudioConfig {
                buffer_ceiling_bytes: DEFAULT_CEILING_BYTES,
                max_chunk_bytes: DEFAULT_CEILING_BYTES,
                broadcast_capacity: 256,
            },
            ai: AiConfig {
                base_url: "https://api.openai.com".to_string(),
                api_key: String::new(),
                transcription_model: "whisper-1".to_string(),
                summary_model: "gpt-4o-mini".to_string(),
                request_timeout_secs: 60,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 10,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order (highest wins):
    /// `HOST`/`PORT` > `APP_*` environment variables > `config.toml` >
    /// defaults.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // APP_SERVER_HOST becomes server.host, etc.
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.audio.buffer_ceiling_bytes == 0 {
            return Err(anyhow::anyhow!("Audio buffer ceiling must be greater than 0"));
        }

        if self.audio.max_chunk_bytes == 0 || self.audio.max_chunk_bytes > self.audio.buffer_ceiling_bytes {
            return Err(anyhow::anyhow!(
                "Max chunk size must be between 1 and the buffer ceiling ({} bytes)",
                self.audio.buffer_ceiling_bytes
            ));
        }

        if self.audio.broadcast_capacity == 0 {
            return Err(anyhow::anyhow!("Broadcast capacity must be greater than 0"));
        }

        if self.ai.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("AI request timeout must be greater than 0"));
        }

        Ok(())
    }
}
