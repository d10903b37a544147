use thiserror::Error;

/// Error taxonomy from spec.md §7. Each variant names a policy in the
/// fetch/render state machines (§4.7/§4.8) — retry-with-backoff, drop, sink,
/// or terminate — rather than a raw transport failure shape.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("malformed URL: {0}")]
    MalformedUrl(String),

    #[error("no transport for scheme: {0}")]
    InvalidScheme(String),

    #[error("denied by filter gate: {0}")]
    Filtered(String),

    #[error("denied by robots.txt: {0}")]
    RobotsDenied(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}s")]
    Timeout(u64),

    #[error("render returned empty sentinel page")]
    EmptyRender,

    #[error("http status {0}")]
    HttpStatusError(u16),

    #[error("site hook signalled drop: {0}")]
    LinkNoReturn(String),

    #[error("lock busy for hash {0}")]
    LockBusy(String),

    #[error("inter-round hook requested stop")]
    WorkerBreak,

    #[error("submission failed: {0}")]
    SubmissionError(String),

    #[error("frontier store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CrawlError {
    /// Exit code per spec.md §6 "Exit codes": StoreUnavailable is the only
    /// unrecoverable-at-process-level error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CrawlError::StoreUnavailable(_) => 2,
            _ => 0,
        }
    }
}
