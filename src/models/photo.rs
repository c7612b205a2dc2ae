use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Longest file name kept when an upload is written to disk.
const MAX_FILE_NAME_LEN: usize = 64;

/// Uploaded photo materialized to a temporary file.
///
/// The file at `original_path` belongs to exactly one processing attempt and
/// is removed by the worker once the job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub id: Uuid,
    pub original_path: PathBuf,
    pub file_name: String,
    pub content_type: String,
}

impl ProfilePhoto {
    /// Write upload bytes into `dir` and return the reference to them.
    pub async fn materialize(
        dir: &Path,
        customer_id: &str,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        let id = Uuid::new_v4();
        let file_name = sanitize_file_name(file_name);
        let original_path = dir.join(format!(
            "profile-photo-{}-{}-{}",
            sanitize_file_name(customer_id),
            id,
            file_name
        ));

        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&original_path, bytes).await?;

        Ok(Self {
            id,
            original_path,
            file_name,
            content_type: content_type.to_string(),
        })
    }

    /// File extension used for the stored original.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.content_type)
    }

    /// Remove the temporary input; a file that is already gone is not an error.
    pub async fn discard(&self) -> std::io::Result<()> {
        match tokio::fs::remove_file(&self.original_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Image returned by the generation model.
#[derive(Debug, Clone)]
pub struct GeneratedPhoto {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl GeneratedPhoto {
    pub fn extension(&self) -> &'static str {
        extension_for(&self.content_type)
    }
}

/// Final association between a customer and their stored photo pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilePhotoRecord {
    pub photo_id: Uuid,
    pub original_url: String,
    pub generated_url: String,
}

fn extension_for(content_type: &str) -> &'static str {
    ImageFormat::from_mime_type(content_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .take(MAX_FILE_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}
