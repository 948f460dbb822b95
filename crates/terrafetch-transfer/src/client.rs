use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{StatusCode, Url, header};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use terrafetch_core::{STATUS_CANCELLED, STATUS_FAILED, STATUS_OK, USER_AGENT};

use crate::error::TransferError;
use crate::options::TransferOptions;
use crate::{ftp, local, part_path};

/// Performs single resumable transfers over http(s), ftp and file schemes.
///
/// Holds two pre-built HTTP clients so that the per-producer TLS bypass does
/// not rebuild connection pools per task. Cheap to clone.
#[derive(Clone, Debug)]
pub struct TransferClient {
    verified: reqwest::Client,
    insecure: reqwest::Client,
}

impl TransferClient {
    pub fn new() -> Result<Self, TransferError> {
        let verified = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        let insecure = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self { verified, insecure })
    }

    fn http(&self, verify_tls: bool) -> &reqwest::Client {
        if verify_tls { &self.verified } else { &self.insecure }
    }

    /// Materialize `url` at `dest`. Returns `0` on success and a negative
    /// code on failure; all failure modes are logged, none are raised.
    pub async fn transfer(&self, url: &str, dest: &Path, opts: &TransferOptions) -> i32 {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                error!(url, "invalid URL: {e}");
                return STATUS_FAILED;
            }
        };

        let result = match parsed.scheme() {
            "http" | "https" => self.fetch_http(&parsed, dest, opts).await,
            "ftp" => ftp::fetch_ftp(&parsed, dest).await,
            "file" => local::fetch_local(&parsed, dest).await,
            other => Err(TransferError::UnsupportedScheme(other.to_string())),
        };

        match result {
            Ok(()) => {
                info!("fetched {url} -> {}", dest.display());
                STATUS_OK
            }
            Err(TransferError::Cancelled) => {
                warn!("download cancelled: {url}");
                STATUS_CANCELLED
            }
            Err(e) => {
                error!(url, dest = %dest.display(), "transfer failed: {e}");
                STATUS_FAILED
            }
        }
    }

    async fn fetch_http(
        &self,
        url: &Url,
        dest: &Path,
        opts: &TransferOptions,
    ) -> Result<(), TransferError> {
        if let Some(parent) = dest.parent() {
            // Best effort; a real problem resurfaces when the file opens.
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        let part = part_path(dest);

        if !opts.overwrite
            && let Ok(meta) = tokio::fs::metadata(dest).await
        {
            if !opts.check_size || meta.len() > 0 {
                debug!("exists, skipping: {}", dest.display());
                return Ok(());
            }
        }

        let tries = opts.effective_tries();
        let mut connect_timeout = opts.timeout;
        let mut read_timeout = opts.read_timeout;
        // Expected total recorded across attempts; a resumed response that
        // reports a different total means the remote changed underneath us.
        let mut known_total: Option<u64> = None;
        let mut last_err: Option<TransferError> = None;

        let mut attempt = 0;
        while attempt < tries {
            if opts.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let resume_from = tokio::fs::metadata(&part).await.map(|m| m.len()).unwrap_or(0);

            let mut request = self.http(opts.verify_tls).get(url.clone());
            if let Some(budget) = total_budget(connect_timeout, read_timeout) {
                request = request.timeout(budget);
            }
            if resume_from > 0 {
                request = request.header(header::RANGE, format!("bytes={resume_from}-"));
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    attempt += 1;
                    warn!("attempt {attempt}/{tries} failed for {url}: {e}");
                    last_err = Some(e.into());
                    if attempt < tries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }
            };

            match response.status() {
                StatusCode::NOT_MODIFIED => return Ok(()),
                StatusCode::GATEWAY_TIMEOUT => {
                    attempt += 1;
                    warn!("gateway timeout for {url}, retrying with longer timeouts");
                    connect_timeout = connect_timeout.map(|t| t + Duration::from_secs(1));
                    read_timeout = read_timeout.map(|t| t + Duration::from_secs(10));
                    last_err = Some(TransferError::HttpStatus(504));
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
                StatusCode::RANGE_NOT_SATISFIABLE => {
                    // Local .part is likely corrupt; restart from scratch.
                    attempt += 1;
                    warn!("invalid range for {}, restarting", dest.display());
                    let _ = tokio::fs::remove_file(&part).await;
                    known_total = None;
                    last_err = Some(TransferError::HttpStatus(416));
                    continue;
                }
                StatusCode::UNAUTHORIZED => return Err(TransferError::AuthFailed),
                StatusCode::OK | StatusCode::PARTIAL_CONTENT => {}
                status => {
                    attempt += 1;
                    error!("request for {url} returned {status}");
                    last_err = Some(TransferError::HttpStatus(status.as_u16()));
                    if attempt < tries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }
            }

            let partial = response.status() == StatusCode::PARTIAL_CONTENT;
            let total = if partial {
                content_range_total(&response)
                    .or_else(|| response.content_length().map(|n| resume_from + n))
            } else {
                response.content_length()
            };

            if let (Some(t), Some(k)) = (total, known_total)
                && t != k
            {
                // Remote content changed mid-resume; corruption case.
                attempt += 1;
                warn!("remote size changed for {url} ({k} -> {t}), restarting");
                let _ = tokio::fs::remove_file(&part).await;
                known_total = None;
                continue;
            }
            if total.is_some() {
                known_total = total;
            }

            // Whole file already staged: rename without reading the body.
            if opts.check_size
                && let Some(t) = total
                && t > 0
                && resume_from == t
            {
                tokio::fs::rename(&part, dest).await?;
                return Ok(());
            }

            // A 200 after a range request means the server restarted from
            // byte zero; appending would corrupt the file.
            let append = partial && resume_from > 0;

            match self.stream_body(response, &part, append, opts).await {
                Ok(_) => {}
                Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
                Err(e) => {
                    attempt += 1;
                    warn!("download failed for {url}: {e}");
                    last_err = Some(e);
                    if attempt < tries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                }
            }

            if opts.check_size
                && let Some(t) = known_total
                && t > 0
            {
                let final_size = tokio::fs::metadata(&part).await?.len();
                if final_size < t {
                    // Connection was most likely cut; the .part stays for resume.
                    attempt += 1;
                    last_err = Some(TransferError::Incomplete { got: final_size, expected: t });
                    warn!(
                        "incomplete download for {url}: {final_size}/{t} bytes, retrying"
                    );
                    if attempt < tries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                    continue;
                } else if final_size > t {
                    debug!(
                        "size {final_size} > header {t} for {url}; assuming transparent decompression"
                    );
                }
            }

            tokio::fs::rename(&part, dest).await?;
            return Ok(());
        }

        Err(last_err.unwrap_or(TransferError::MaxRetriesExceeded { tries }))
    }

    async fn stream_body(
        &self,
        response: reqwest::Response,
        part: &Path,
        append: bool,
        opts: &TransferOptions,
    ) -> Result<u64, TransferError> {
        let mut file = if append {
            tokio::fs::OpenOptions::new().append(true).open(part).await?
        } else {
            tokio::fs::File::create(part).await?
        };

        let mut written = 0u64;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            if opts.cancel.is_cancelled() {
                let _ = file.flush().await;
                return Err(TransferError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// Capped exponential backoff between attempts.
fn backoff_delay(attempt: u32) -> Duration {
    let secs = 2u64.saturating_mul(1 << attempt.min(4));
    Duration::from_secs(secs.min(30))
}

fn total_budget(connect: Option<Duration>, read: Option<Duration>) -> Option<Duration> {
    match (connect, read) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Total size from a `Content-Range: bytes start-end/total` header.
fn content_range_total(response: &reqwest::Response) -> Option<u64> {
    let raw = response.headers().get(header::CONTENT_RANGE)?.to_str().ok()?;
    raw.rsplit('/').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(4));
        assert_eq!(backoff_delay(2), Duration::from_secs(8));
        assert_eq!(backoff_delay(10), Duration::from_secs(30));
    }

    #[test]
    fn budget_combines_timeouts() {
        assert_eq!(
            total_budget(Some(Duration::from_secs(3)), Some(Duration::from_secs(7))),
            Some(Duration::from_secs(10))
        );
        assert_eq!(total_budget(None, None), None);
    }
}
