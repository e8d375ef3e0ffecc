//! Generation pipeline core for turning raw material into learning content.
//!
//! Source material (text, URLs, documents, audio, images) is normalized into a
//! request payload, sent to a generative model service, and the responses are
//! sanitized, decoded and handed back as courses, articles, transcripts,
//! narrated audio, images or videos.

pub mod ai;
pub mod audio;
pub mod error;
pub mod input;
pub mod models;
pub mod pipeline;
pub mod poller;
pub mod prompts;
pub mod sanitize;

pub use error::{Error, Result};
