use std::time::Duration;

use terrafetch_core::CancelToken;

/// Per-transfer behavior knobs.
///
/// `timeout`/`read_timeout` mirror the connect/read split of the remote end;
/// both are bumped between attempts when a gateway timeout is observed.
#[derive(Clone, Debug)]
pub struct TransferOptions {
    /// Re-download even when the destination already exists.
    pub overwrite: bool,
    /// Attempt ceiling, minimum 1.
    pub tries: u32,
    /// Connect timeout.
    pub timeout: Option<Duration>,
    /// Read timeout.
    pub read_timeout: Option<Duration>,
    /// Verify the final size against Content-Length / Content-Range.
    pub check_size: bool,
    /// TLS certificate verification; certain producers bypass it.
    pub verify_tls: bool,
    /// Cooperative cancellation checked while streaming.
    pub cancel: CancelToken,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            tries: 5,
            timeout: Some(Duration::from_secs(30)),
            read_timeout: None,
            check_size: true,
            verify_tls: true,
            cancel: CancelToken::new(),
        }
    }
}

impl TransferOptions {
    pub fn effective_tries(&self) -> u32 {
        self.tries.max(1)
    }
}
