//! Out-of-band capability fetch.
//!
//! The fetch is abstracted behind [`CardFetcher`] so the session controller
//! can be driven by a scripted fetcher in tests.

mod client;

use a2a_inspector_protocol::{CardResponse, CustomHeaders};
use async_trait::async_trait;

pub use client::{HttpCardFetcher, merge_headers};

use crate::error::HandshakeResult;

/// One capability fetch: the agent URL, the channel session id the backend
/// binds the agent client to, and the operator's extra headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub sid: String,
    pub headers: CustomHeaders,
}

#[async_trait]
pub trait CardFetcher: Send + Sync {
    /// Endpoint the fetch is sent to, as recorded in the debug trace.
    fn endpoint(&self) -> String;

    async fn fetch_card(&self, request: FetchRequest) -> HandshakeResult<CardResponse>;
}
