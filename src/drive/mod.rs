use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
const API_BASE_ENV: &str = "JOBTRAIL_DRIVE_API_BASE";
const LIST_PAGE_SIZE: usize = 1000;

pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PDF_MIME: &str = "application/pdf";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub web_view_link: Option<String>,
    pub modified_time: Option<String>,
}

/// A file's content, fetched by mime type: plain export for native docs,
/// raw bytes for binary formats.
#[derive(Debug, Clone, PartialEq)]
pub enum FileContent {
    Text(String),
    Binary { mime_type: String, bytes: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct DriveClient {
    client: Client,
    api_base: String,
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveClient {
    pub fn new() -> Self {
        let api_base = std::env::var(API_BASE_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DRIVE_API_BASE.to_string());
        Self {
            client: Client::new(),
            api_base,
        }
    }

    /// Non-folder, non-trashed files directly under a folder.
    pub async fn list_folder(
        &self,
        access_token: &str,
        folder_id: &str,
    ) -> Result<Vec<DriveFile>> {
        let query = format!(
            "'{folder_id}' in parents and mimeType != 'application/vnd.google-apps.folder' and trashed = false"
        );
        let url = format!(
            "{}/files?q={}&fields=files(id,name,mimeType,webViewLink,modifiedTime)&pageSize={LIST_PAGE_SIZE}",
            self.api_base,
            crate::mail::urlencode(&query)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("list drive folder")?;

        let status = response.status();
        let body = response.text().await.context("read drive listing body")?;
        if !status.is_success() {
            return Err(anyhow!("drive listing failed: status={status} body={body}"));
        }

        let payload: DriveFileList =
            serde_json::from_str(&body).context("decode drive file listing")?;
        Ok(payload.files)
    }

    /// Fetch a file's content. Google-native documents are exported as plain
    /// text; pdf/docx come back as raw bytes; anything else is read as text.
    pub async fn fetch_content(
        &self,
        access_token: &str,
        file: &DriveFile,
    ) -> Result<FileContent> {
        if file.mime_type == GOOGLE_DOC_MIME {
            let url = format!(
                "{}/files/{}/export?mimeType=text/plain",
                self.api_base, file.id
            );
            let text = self
                .get_text(access_token, &url)
                .await
                .with_context(|| format!("export drive document '{}'", file.name))?;
            return Ok(FileContent::Text(text));
        }

        let url = format!("{}/files/{}?alt=media", self.api_base, file.id);
        if file.mime_type == PDF_MIME || file.mime_type == DOCX_MIME {
            let bytes = self
                .get_bytes(access_token, &url)
                .await
                .with_context(|| format!("download drive file '{}'", file.name))?;
            return Ok(FileContent::Binary {
                mime_type: file.mime_type.clone(),
                bytes,
            });
        }

        let text = self
            .get_text(access_token, &url)
            .await
            .with_context(|| format!("download drive file '{}'", file.name))?;
        Ok(FileContent::Text(text))
    }

    async fn get_text(&self, access_token: &str, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("drive request")?;
        let status = response.status();
        let body = response.text().await.context("read drive response")?;
        if !status.is_success() {
            return Err(anyhow!("drive request failed: status={status} body={body}"));
        }
        Ok(body)
    }

    async fn get_bytes(&self, access_token: &str, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("drive request")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("drive request failed: status={status} body={body}"));
        }
        let bytes = response.bytes().await.context("read drive file bytes")?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[cfg(test)]
mod tests {
    use super::{DriveFile, DriveFileList, FileContent, DOCX_MIME};

    #[test]
    fn listing_decodes_camel_case_fields() {
        let raw = r#"{
            "files": [
                {
                    "id": "f1",
                    "name": "VP Sales JD.docx",
                    "mimeType": "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                    "webViewLink": "https://drive.example/f1",
                    "modifiedTime": "2026-01-04T10:00:00Z"
                }
            ]
        }"#;
        let payload: DriveFileList = serde_json::from_str(raw).expect("decode listing");
        assert_eq!(payload.files.len(), 1);
        assert_eq!(payload.files[0].mime_type, DOCX_MIME);
    }

    #[test]
    fn empty_listing_decodes() {
        let payload: DriveFileList = serde_json::from_str("{}").expect("decode listing");
        assert!(payload.files.is_empty());
    }

    #[test]
    fn file_content_variants_compare() {
        let file = DriveFile {
            id: "f1".to_string(),
            name: "jd.txt".to_string(),
            mime_type: "text/plain".to_string(),
            web_view_link: None,
            modified_time: None,
        };
        assert_eq!(file.mime_type, "text/plain");
        assert_ne!(
            FileContent::Text("a".to_string()),
            FileContent::Text("b".to_string())
        );
    }
}
