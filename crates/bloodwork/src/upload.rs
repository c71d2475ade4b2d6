//! Optional copy of each imported PDF and record to object storage.

use crate::prelude::*;

/// Storage key for an imported file: `labs/<date>/<stem>.<extension>`.
pub fn storage_key(date: &str, stem: &str, extension: &str) -> String {
    let stem: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    f!("labs/{}/{}.{}", date, stem, extension)
}

/// HTTP PUT uploader. Any store that accepts `PUT <base>/<key>` works,
/// including pre-authorized bucket endpoints.
pub struct Uploader {
    client: reqwest::Client,
    base_url: String,
}

impl Uploader {
    /// `None` when uploads are skipped or no endpoint is configured.
    pub fn from_options(url: Option<&str>, skip: bool) -> Option<Self> {
        if skip {
            log::debug!("Upload skipped by request");
            return None;
        }
        let url = url.map(str::trim).filter(|u| !u.is_empty())?;
        Some(Self {
            client: reqwest::Client::new(),
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload `body` under `key` and return the key.
    pub async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<String> {
        let url = f!("{}/{}", self.base_url, key);
        let response = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| eyre!("Failed to upload {}: {}", key, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(eyre!("Upload of {} failed [{}]: {}", key, status, body));
        }

        log::info!("Uploaded {}", key);
        Ok(key.to_string())
    }

    /// Like [`Uploader::put`], but failures are only logged.
    pub async fn put_or_warn(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Option<String> {
        match self.put(key, body, content_type).await {
            Ok(key) => Some(key),
            Err(e) => {
                log::warn!("{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key() {
        assert_eq!(
            storage_key("2024-03-28", "Befund März 2024", "pdf"),
            "labs/2024-03-28/Befund-M-rz-2024.pdf"
        );
        assert_eq!(
            storage_key("2024-03-28", "report_1", "json"),
            "labs/2024-03-28/report_1.json"
        );
    }

    #[test]
    fn test_from_options() {
        assert!(Uploader::from_options(Some("https://store.example/bucket"), true).is_none());
        assert!(Uploader::from_options(None, false).is_none());
        assert!(Uploader::from_options(Some("  "), false).is_none());

        let uploader =
            Uploader::from_options(Some("https://store.example/bucket/"), false).unwrap();
        assert_eq!(uploader.base_url, "https://store.example/bucket");
    }

    #[tokio::test]
    async fn test_unreachable_store_is_not_fatal() {
        let uploader = Uploader::from_options(Some("http://127.0.0.1:9"), false).unwrap();
        let key = uploader
            .put_or_warn("labs/x/y.json", b"{}".to_vec(), "application/json")
            .await;
        assert!(key.is_none());
    }
}
