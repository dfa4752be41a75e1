//! # Inference Provider Module
//!
//! Handles all traffic to the managed inference provider: speech-to-text
//! uploads and text-to-speech requests. The provider speaks an
//! OpenAI-compatible audio API over HTTPS, so any gateway implementing that
//! surface works (the base URL is configuration).
//!
//! ## Key Components:
//! - **Provider Client**: One shared HTTP client with connection pooling
//! - **Transcription Call**: Multipart WAV upload returning the transcript
//! - **Synthesis Call**: JSON request returning WAV audio bytes
//!
//! ## Why no retries:
//! Each device request maps to at most one provider request. The device
//! firmware already retries on 5xx with its own backoff; stacking relay-side
//! retries on top of that would multiply load during provider incidents.

pub mod client;      // HTTP calls to the provider API

pub use client::ProviderClient;
