// src/services/media.rs
//
// Client for the external media storage service. Uploads are fatal to the
// calling operation when they fail; deletions are background cleanup and
// never block or fail a request.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::config::MediaConfig;
use crate::error::AppError;

/// Kind of stored asset; selects the provider endpoint and the folder its
/// keys live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    fn endpoint(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Video => "video",
        }
    }

    pub fn folder(self) -> &'static str {
        match self {
            AssetKind::Image => "images",
            AssetKind::Video => "videos",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
}

#[derive(Clone)]
pub struct MediaStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MediaStore {
    pub fn new(config: &MediaConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to build media storage client");

        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Uploads a staged file and returns its public asset record.
    pub async fn upload(&self, path: &Path, kind: AssetKind) -> Result<UploadedAsset, AppError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Upload(format!("failed to read staged file: {}", e)))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.bin".to_string());

        let form = reqwest::multipart::Form::new()
            .text("folder", kind.folder())
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(format!("{}/{}/upload", self.base_url, kind.endpoint()))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Upload(format!(
                "media store returned {}",
                response.status()
            )));
        }

        response
            .json::<UploadedAsset>()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))
    }

    pub async fn delete(&self, key: &str, kind: AssetKind) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/{}/destroy", self.base_url, kind.endpoint()))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await
            .map_err(|e| AppError::Upload(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Upload(format!(
                "media store returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Removes the asset behind `url` in the background. Cleanup is
/// best-effort: failures are logged and never reach the caller.
pub fn spawn_delete(store: MediaStore, url: String, kind: AssetKind) {
    tokio::spawn(async move {
        let Some(key) = asset_key_v1(&url, kind.folder()) else {
            log::error!("unrecognized media url shape, skipping cleanup: {}", url);
            return;
        };
        if let Err(e) = store.delete(&key, kind).await {
            log::error!("failed to delete media asset {}: {}", key, e);
        }
    });
}

/// Derives the storage key for an asset from its public URL.
///
/// Decoder v1 assumes the provider's URL layout,
/// `https://<host>/<cell>/<kind>/upload/<version>/<folder>/<file>`: when
/// the segment at index 7 names the expected folder, the key is
/// `<folder>/<file>`; otherwise it is that segment with its extension
/// stripped. URLs with too few segments yield `None` and the asset is left
/// in place.
pub fn asset_key_v1(url: &str, folder: &str) -> Option<String> {
    let segments: Vec<&str> = url.split('/').collect();
    let anchor = *segments.get(7)?;

    if anchor == folder {
        let file = *segments.get(8)?;
        Some(format!("{}/{}", folder, file))
    } else {
        Some(anchor.split('.').next().unwrap_or(anchor).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_folder_scoped_when_the_folder_segment_matches() {
        let url = "https://media.example.com/videotube/image/upload/v1722/images/thumb-1.png";
        assert_eq!(
            asset_key_v1(url, "images").as_deref(),
            Some("images/thumb-1.png")
        );
    }

    #[test]
    fn key_falls_back_to_the_bare_segment_with_extension_stripped() {
        let url = "https://media.example.com/videotube/video/upload/v1722/abc123.mp4";
        assert_eq!(asset_key_v1(url, "videos").as_deref(), Some("abc123"));
    }

    #[test]
    fn key_requires_a_file_segment_after_a_matching_folder() {
        let url = "https://media.example.com/videotube/image/upload/v1722/images";
        assert_eq!(asset_key_v1(url, "images"), None);
    }

    #[test]
    fn short_urls_are_rejected() {
        assert_eq!(asset_key_v1("https://media.example.com/a.png", "images"), None);
        assert_eq!(asset_key_v1("", "images"), None);
    }

    #[test]
    fn asset_kinds_map_to_their_folders() {
        assert_eq!(AssetKind::Image.folder(), "images");
        assert_eq!(AssetKind::Video.folder(), "videos");
        assert_eq!(AssetKind::Image.endpoint(), "image");
        assert_eq!(AssetKind::Video.endpoint(), "video");
    }
}
