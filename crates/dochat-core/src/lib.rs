//! Client-side session core for a streaming document chatbot.
//!
//! Owns the WebSocket connection, assembles streamed response fragments
//! into conversation turns, correlates document citations, and tracks
//! asynchronous document processing through an adaptive status poller.

pub mod config;
pub mod connection;
pub mod documents;
pub mod protocol;
pub mod session;
