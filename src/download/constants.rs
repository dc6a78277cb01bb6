//! Constants for the download module (timeouts, buffer sizes, file names).

/// Default per-request timeout (connect and read), in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Capacity of the buffered writer used while streaming a response body.
///
/// Chunks read from the network are written through this buffer and flushed at
/// every pause, cancel, error and end-of-body boundary.
pub const WRITE_CHUNK_SIZE: usize = 8192;

/// Journal file kept next to the downloaded files of one page.
pub const JOURNAL_FILE_NAME: &str = ".page-downloader-journal.json";
