//! # Configuration Management
//!
//! This module handles loading and managing relay configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, plus a few deployment secrets)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **struct**: Custom data types that group related fields together
//! - **impl blocks**: Add methods to structs
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Dedicated secret variables (PROVIDER_API_KEY, DEVICE_TOKEN, HOST, PORT)
//! 2. Environment variables (APP_SERVER_HOST, APP_SERVER_PORT, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Main relay configuration that contains all settings.
///
/// ## Rust Concepts:
/// - **#[derive(...)]**: Automatically implements common traits:
///   - `Debug`: Allows printing with {:?} for debugging
///   - `Clone`: Allows making copies of the struct
///   - `Serialize`: Can convert this struct to JSON, TOML, etc.
///   - `Deserialize`: Can create this struct from JSON, TOML, etc.
/// - **pub struct**: Public struct that other modules can use
/// - **pub fields**: Public fields that can be accessed directly
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, provider, audio)
/// keeps the device-facing and provider-facing knobs apart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub audio: AudioConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (1-65535)
/// - `device_token`: shared secret the device sends as `?token=...`; an empty
///   string disables the check entirely (development mode)
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
    pub device_token: String,
}

/// Managed inference provider settings.
///
/// ## Fields:
/// - `base_url`: API root, e.g. "https://api.openai.com/v1" (no trailing slash)
/// - `api_key`: bearer token for the provider; set via PROVIDER_API_KEY
/// - `transcription_model`: speech-to-text model name (e.g. "whisper-1")
/// - `speech_model`: text-to-speech model name (e.g. "tts-1")
/// - `voice`: default synthesis voice when the device doesn't pick one
/// - `request_timeout_secs`: per-request deadline for provider calls
///
/// ## Why a configurable base_url:
/// Any OpenAI-compatible gateway works here, so staging environments can
/// point the relay at a mock provider without code changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    pub request_timeout_secs: u64,
}

/// Audio handling defaults and limits.
///
/// ## Fields:
/// - `sample_rate`: assumed sample rate when the device omits `?rate=`
/// - `bits_per_sample`: assumed bit depth when the device omits `?bits=`
/// - `channels`: assumed channel count when the device omits `?channels=`
/// - `max_payload_bytes`: upload cap for raw PCM bodies (10 MiB default;
///   roughly five minutes of 16kHz/16-bit mono audio)
///
/// ## Why these defaults:
/// The legacy device firmware records 16kHz 16-bit mono and usually doesn't
/// bother sending the query parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
    pub max_payload_bytes: usize,
}

/// Provides default configuration values.
///
/// ## Rust Concepts:
/// - **impl Default**: Implements the Default trait, which provides a `default()` method
/// - **Self**: Refers to the current type (AppConfig)
/// - **to_string()**: Converts string literals (&str) to owned String objects
///
/// ## Why defaults matter:
/// Default values ensure the relay can start even if no configuration file
/// exists. Only the provider API key has no usable default.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,                     // Common development port
                device_token: String::new(),    // Empty = auth disabled
            },
            provider: ProviderConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),                    // Must come from the environment
                transcription_model: "whisper-1".to_string(),
                speech_model: "tts-1".to_string(),
                voice: "alloy".to_string(),
                request_timeout_secs: 30,
            },
            audio: AudioConfig {
                sample_rate: 16000,             // Device firmware records at 16kHz
                bits_per_sample: 16,
                channels: 1,
                max_payload_bytes: 10 * 1024 * 1024,  // 10 MiB upload cap
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle the dedicated variables deployment platforms and secret
    ///    stores use (HOST, PORT, PROVIDER_API_KEY, DEVICE_TOKEN)
    ///
    /// ## Rust Concepts:
    /// - **Builder pattern**: Chain method calls to configure the config loader
    /// - **?**: Early return on error (if any step fails, return the error)
    /// - **env::var()**: Read environment variables, returns Result<String, VarError>
    /// - **if let Ok(...)**: Only execute if the environment variable exists
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: Override server host
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `PROVIDER_API_KEY=sk-...`: Provider bearer token (never goes in config.toml)
    /// - `DEVICE_TOKEN=...`: Shared secret for the device's `?token=` parameter
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_SERVER_HOST becomes server.host in the config
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Dedicated variables used by deployment platforms and secret stores.
        // These don't follow the APP_ prefix convention.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("PROVIDER_API_KEY") {
            settings = settings.set_override("provider.api_key", api_key)?;
        }

        if let Ok(token) = env::var("DEVICE_TOKEN") {
            settings = settings.set_override("server.device_token", token)?;
        }

        // Build the final configuration and convert it back to our AppConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0 (port 0 is reserved and can't be bound)
    /// - Provider base URL is present and speaks HTTP(S)
    /// - Provider timeout is greater than 0
    /// - Audio defaults are all non-zero (the HTTP layer relies on them as
    ///   fallbacks, so zeros here would produce nonsense container headers
    ///   for every request that omits the query parameters)
    /// - The upload cap is greater than 0
    ///
    /// ## Rust Concepts:
    /// - **&self**: Borrowed reference (read-only access to the struct)
    /// - **anyhow::anyhow!**: Creates an error with a custom message
    /// - **Early return**: Return immediately if validation fails
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.provider.base_url.is_empty() {
            return Err(anyhow::anyhow!("Provider base URL cannot be empty"));
        }

        if !self.provider.base_url.starts_with("http://") && !self.provider.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("Provider base URL must start with http:// or https://"));
        }

        if self.provider.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Provider request timeout must be greater than 0"));
        }

        if self.audio.sample_rate == 0 || self.audio.bits_per_sample == 0 || self.audio.channels == 0 {
            return Err(anyhow::anyhow!("Audio defaults must all be greater than 0"));
        }

        if self.audio.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("Max payload size must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## What this does:
    /// 1. Parse the JSON string into a generic value
    /// 2. Extract individual configuration fields if they exist
    /// 3. Update only the fields that were provided
    /// 4. Validate the updated configuration
    ///
    /// ## Credentials are deliberately not updatable here:
    /// `provider.api_key` and `server.device_token` only ever come from the
    /// environment. Accepting them over HTTP would let anyone who reaches the
    /// config endpoint rotate the relay's secrets.
    ///
    /// ## Rust Concepts:
    /// - **&mut self**: Mutable reference (allows modifying the struct)
    /// - **serde_json::Value**: Generic JSON value that can hold any JSON data
    /// - **if let Some(...)**: Only execute if the field exists in the JSON
    /// - **and_then()**: Chain operations that might fail
    /// - **as_str(), as_u64()**: Convert JSON values to specific types
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        // Parse the JSON string into a generic value
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        // Update server configuration if provided (never the device token)
        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;  // Convert u64 to u16 for port number
            }
        }

        // Update provider configuration if provided (never the API key)
        if let Some(provider) = partial_config.get("provider") {
            if let Some(base_url) = provider.get("base_url").and_then(|v| v.as_str()) {
                self.provider.base_url = base_url.to_string();
            }
            if let Some(model) = provider.get("transcription_model").and_then(|v| v.as_str()) {
                self.provider.transcription_model = model.to_string();
            }
            if let Some(model) = provider.get("speech_model").and_then(|v| v.as_str()) {
                self.provider.speech_model = model.to_string();
            }
            if let Some(voice) = provider.get("voice").and_then(|v| v.as_str()) {
                self.provider.voice = voice.to_string();
            }
            if let Some(timeout) = provider.get("request_timeout_secs").and_then(|v| v.as_u64()) {
                self.provider.request_timeout_secs = timeout;
            }
        }

        // Update audio defaults if provided
        if let Some(audio) = partial_config.get("audio") {
            if let Some(rate) = audio.get("sample_rate").and_then(|v| v.as_u64()) {
                self.audio.sample_rate = rate as u32;
            }
            if let Some(bits) = audio.get("bits_per_sample").and_then(|v| v.as_u64()) {
                self.audio.bits_per_sample = bits as u16;
            }
            if let Some(channels) = audio.get("channels").and_then(|v| v.as_u64()) {
                self.audio.channels = channels as u16;
            }
            if let Some(cap) = audio.get("max_payload_bytes").and_then(|v| v.as_u64()) {
                self.audio.max_payload_bytes = cap as usize;
            }
        }

        // Validate the updated configuration to ensure it's still valid
        self.validate()?;
        Ok(())
    }

    /// Produce a JSON view of the configuration safe to return over HTTP.
    ///
    /// Credentials are replaced by booleans saying whether they are set at
    /// all, so operators can tell "not configured" from "wrong value"
    /// without the relay ever echoing a secret.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "server": {
                "host": self.server.host,
                "port": self.server.port,
                "device_token_configured": !self.server.device_token.is_empty(),
            },
            "provider": {
                "base_url": self.provider.base_url,
                "api_key_configured": !self.provider.api_key.is_empty(),
                "transcription_model": self.provider.transcription_model,
                "speech_model": self.provider.speech_model,
                "voice": self.provider.voice,
                "request_timeout_secs": self.provider.request_timeout_secs,
            },
            "audio": {
                "sample_rate": self.audio.sample_rate,
                "bits_per_sample": self.audio.bits_per_sample,
                "channels": self.audio.channels,
                "max_payload_bytes": self.audio.max_payload_bytes,
            }
        })
    }
}

/// Tests for the configuration module.
///
/// ## Rust Concepts:
/// - **#[cfg(test)]**: Only compile this code when running tests
/// - **mod tests**: A module containing test functions
/// - **#[test]**: Marks a function as a test case
/// - **assert_eq!**: Checks that two values are equal
/// - **assert!**: Checks that a condition is true
/// - **is_ok(), is_err()**: Check if a Result is success or error
#[cfg(test)]
mod tests {
    use super::*;  // Import everything from the parent module

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.provider.base_url, "https://api.openai.com/v1");
        assert_eq!(config.provider.transcription_model, "whisper-1");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.bits_per_sample, 16);
        assert_eq!(config.audio.channels, 1);
        // Ensure the default config passes validation
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;  // Invalid port
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.provider.base_url = "ftp://example.com".to_string();  // Not HTTP
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.provider.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.channels = 0;  // Zero default would break every header
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.max_payload_bytes = 0;
        assert!(config.validate().is_err());
    }

    /// Test that runtime configuration updates work correctly.
    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"provider": {"voice": "nova"}, "audio": {"sample_rate": 24000}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.provider.voice, "nova");
        assert_eq!(config.audio.sample_rate, 24000);
        // Other fields should remain unchanged
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.provider.speech_model, "tts-1");
    }

    /// Test that updates which break validation are rejected.
    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"audio": {"sample_rate": 0}}"#;
        assert!(config.update_from_json(json).is_err());
    }

    /// Test that credentials cannot be changed through JSON updates.
    #[test]
    fn test_credentials_not_updatable() {
        let mut config = AppConfig::default();
        config.provider.api_key = "sk-original".to_string();
        config.server.device_token = "original-token".to_string();

        let json = r#"{"provider": {"api_key": "sk-injected"}, "server": {"device_token": "injected"}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.provider.api_key, "sk-original");
        assert_eq!(config.server.device_token, "original-token");
    }

    /// Test that the redacted view never contains secret values.
    #[test]
    fn test_redacted_view_hides_credentials() {
        let mut config = AppConfig::default();
        config.provider.api_key = "sk-supersecret".to_string();
        config.server.device_token = "hush".to_string();

        let view = config.redacted();
        let rendered = view.to_string();
        assert!(!rendered.contains("sk-supersecret"));
        assert!(!rendered.contains("hush"));
        assert_eq!(view["provider"]["api_key_configured"], true);
        assert_eq!(view["server"]["device_token_configured"], true);

        // Unset credentials report as not configured
        let empty_view = AppConfig::default().redacted();
        assert_eq!(empty_view["provider"]["api_key_configured"], false);
        assert_eq!(empty_view["server"]["device_token_configured"], false);
    }
}
