//! Search-result collaborator model
//!
//! The search side of the application supplies these; the download
//! manager only ever consumes `preview_url` as the transfer key.

use serde::Deserialize;

/// One search result with a downloadable preview
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub name: String,
    pub artist: String,
    /// Absent when the result has nothing to download
    pub preview_url: Option<String>,
}

impl Track {
    pub fn new<S: Into<String>>(name: S, artist: S, preview_url: Option<String>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            preview_url,
        }
    }
}
