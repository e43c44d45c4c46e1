//! Download pipeline: queue state machine, worker pool, media fetching.

pub mod fetch;
pub mod queue;
pub(crate) mod worker;

pub use fetch::{FetchedMedia, MediaDownloader, YtDlpDownloader};
pub use queue::QueueManager;
