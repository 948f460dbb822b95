use std::io;
use std::path::{Path, PathBuf};

use reqwest::Url;
use suppaftp::FtpStream;
use suppaftp::types::FileType;
use tracing::info;

use crate::error::TransferError;

/// Whole-file FTP retrieval in binary mode. No resume support; the protocol
/// is simpler and the payloads that still live on FTP servers are small.
/// A failed download removes the partial destination file.
pub(crate) async fn fetch_ftp(url: &Url, dest: &Path) -> Result<(), TransferError> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    info!("fetching remote ftp file: {url}");
    let url = url.clone();
    let dest: PathBuf = dest.to_path_buf();
    match tokio::task::spawn_blocking(move || fetch_ftp_blocking(&url, &dest)).await {
        Ok(result) => result,
        Err(join_err) => Err(TransferError::Io(io::Error::other(join_err.to_string()))),
    }
}

fn fetch_ftp_blocking(url: &Url, dest: &Path) -> Result<(), TransferError> {
    let host = url.host_str().ok_or_else(|| TransferError::InvalidUrl {
        url: url.to_string(),
        reason: "missing host".to_string(),
    })?;
    let port = url.port().unwrap_or(21);
    let user = match url.username() {
        "" => "anonymous",
        u => u,
    };
    let password = url.password().unwrap_or("anonymous@");

    let mut ftp = FtpStream::connect((host, port))?;
    ftp.login(user, password)?;
    ftp.transfer_type(FileType::Binary)?;

    let mut file = std::fs::File::create(dest)?;
    let result = retrieve(&mut ftp, url.path(), &mut file);
    let _ = ftp.quit();

    if result.is_err() {
        let _ = std::fs::remove_file(dest);
    }
    result
}

fn retrieve(
    ftp: &mut FtpStream,
    path: &str,
    file: &mut std::fs::File,
) -> Result<(), TransferError> {
    let mut reader = ftp.retr_as_stream(path)?;
    io::copy(&mut reader, file)?;
    ftp.finalize_retr_stream(reader)?;
    Ok(())
}
