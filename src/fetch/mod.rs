//! Media retrieval.
//!
//! Resolves a URL or search query to a downloaded audio file. The bot only
//! relies on the [`MediaFetcher`] contract; the production implementation
//! shells out to yt-dlp.

pub mod ytdlp;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use ytdlp::YtDlpFetcher;

/// A finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    /// Where the audio file ended up
    pub path: PathBuf,
    /// Title reported by the source
    pub title: String,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to start downloader: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("downloader exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("unexpected downloader output: {0}")]
    Output(String),
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Downloads `query` as audio next to `output_stem`.
    ///
    /// `output_stem` is a path without extension; the fetcher picks the
    /// extension of the normalized audio format.
    async fn fetch(&self, query: &str, output_stem: &Path) -> Result<FetchedMedia, FetchError>;
}
