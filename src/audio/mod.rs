//! # Audio Container Module
//!
//! This module handles the container-format gap between the legacy device and
//! the inference provider. The device speaks raw PCM in both directions; the
//! provider speaks WAV in both directions.
//!
//! ## Key Components:
//! - **WAV Synthesis**: Builds the 44-byte RIFF/WAVE preamble around uploads
//! - **WAV Stripping**: Recovers bare samples from provider synthesis output
//! - **PcmFormat**: The out-of-band sample parameters the device reports
//!
//! ## Device Audio Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (1 channel)
//! - **Encoding**: Little-endian signed integers
//!
//! These are defaults only. The device may report other parameters per
//! request and they are containerized exactly as reported.

pub mod wav; // RIFF/WAVE preamble synthesis and removal
