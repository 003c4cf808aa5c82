//! scout-providers: language model provider implementations for scout
//!
//! This crate provides implementations of the Provider trait for model APIs.

pub mod gemini;

pub use gemini::GeminiProvider;
