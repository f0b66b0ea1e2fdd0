//! Async filesystem operations.
//!
//! Re-exports Tokio's `fs` module. Each call runs on the blocking pool, so
//! moving or copying large files never stalls a runtime worker.
//!
//! ```rust
//! use core_async::fs;
//!
//! async fn example(dir: &std::path::Path) -> std::io::Result<()> {
//!     fs::create_dir_all(dir).await?;
//!     fs::write(dir.join("note.txt"), b"kept").await?;
//!     fs::rename(dir.join("note.txt"), dir.join("kept.txt")).await
//! }
//! ```

pub use tokio::fs::{
    copy, create_dir_all, metadata, read, read_dir, remove_file, rename, write, File,
    OpenOptions,
};
