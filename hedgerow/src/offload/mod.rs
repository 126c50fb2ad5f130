//! Background execution of work that outlives a hedged call.
//!
//! Losing attempts are cancelled but not awaited on the caller's path. Their
//! slots are drained by a cleanup task handed to the [`OffloadManager`].
//!
//! ```ignore
//! use hedgerow::offload::OffloadManager;
//!
//! let manager = OffloadManager::new();
//! manager.spawn("hedging_cleanup", async { /* ... */ });
//! manager.wait_all().await;
//! ```

mod manager;

pub use manager::{OffloadKey, OffloadManager};
