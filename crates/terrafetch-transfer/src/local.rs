use std::path::{Path, PathBuf};

use reqwest::Url;
use tracing::info;

use crate::error::TransferError;

/// `file://` transfers: verify in place when source and destination resolve
/// to the same path, otherwise copy.
pub(crate) async fn fetch_local(url: &Url, dest: &Path) -> Result<(), TransferError> {
    let src = file_url_path(url)?;

    let src_abs = std::path::absolute(&src)?;
    let dest_abs = std::path::absolute(dest)?;

    if src_abs == dest_abs {
        if tokio::fs::try_exists(&src_abs).await? {
            info!("verified local: {}", src_abs.display());
            Ok(())
        } else {
            Err(TransferError::MissingLocal(src_abs.display().to_string()))
        }
    } else {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&src, dest).await?;
        Ok(())
    }
}

fn file_url_path(url: &Url) -> Result<PathBuf, TransferError> {
    url.to_file_path().map_err(|_| TransferError::InvalidUrl {
        url: url.to_string(),
        reason: "not a local file path".to_string(),
    })
}
