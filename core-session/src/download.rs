//! Relocation of downloaded files.
//!
//! Transports hand download completions an ephemeral file that they delete
//! once the callback returns. Inside the callback the session only renames
//! that file within the transport's staging directory, which claims it
//! without copying data. The move into the download directory happens
//! afterwards, on the async file API, before the caller is resumed.

use bridge_traits::{BridgeError, Response};
use core_async::fs;
use core_bridge::{Error, Result};
use core_runtime::logging::strip_path;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Take the file of a finished download away from the transport.
///
/// Runs inside the completion callback. The rename stays inside the staging
/// directory, so it is a metadata update on one filesystem.
pub(crate) fn claim_download(
    outcome: std::result::Result<(PathBuf, Response), BridgeError>,
) -> Result<(PathBuf, Response)> {
    let (ephemeral, response) = outcome?;
    let claimed = ephemeral.with_file_name(format!("{}.claimed", Uuid::new_v4()));
    std::fs::rename(&ephemeral, &claimed)
        .map_err(|e| Error::post_processing("claiming finished download", e))?;
    Ok((claimed, response))
}

/// Move `file` into `dir` under a fresh `<uuid>.tmp` name.
///
/// Falls back to copy-and-delete when the file cannot be renamed (for
/// example across filesystems).
pub async fn persist_download(file: &Path, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let destination = dir.join(format!("{}.tmp", Uuid::new_v4()));

    if let Err(e) = fs::rename(file, &destination).await {
        debug!(error = %e, "Rename failed, copying download instead");
        fs::copy(file, &destination).await?;
        if let Err(e) = fs::remove_file(file).await {
            warn!(
                file = strip_path(&file.to_string_lossy()),
                error = %e,
                "Failed to remove claimed download after copy"
            );
        }
    }

    debug!(
        file = strip_path(&destination.to_string_lossy()),
        "Persisted download"
    );
    Ok(destination)
}

/// Move a claimed download into `dir`, deleting it if that fails.
pub(crate) async fn preserve_download(claimed: PathBuf, dir: &Path) -> Result<PathBuf> {
    match persist_download(&claimed, dir).await {
        Ok(path) => Ok(path),
        Err(e) => {
            if let Err(remove) = fs::remove_file(&claimed).await {
                if remove.kind() != io::ErrorKind::NotFound {
                    warn!(error = %remove, "Failed to remove claimed download");
                }
            }
            Err(Error::post_processing(
                format!("moving download into {}", dir.display()),
                e,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("core-session-download-tests")
            .join(format!("{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn response() -> Response {
        Response::new("https://example.com/file", 200)
    }

    #[core_async::test]
    async fn test_persist_moves_file_under_uuid_name() {
        let dir = scratch("persist");
        let ephemeral = dir.join("ephemeral.part");
        std::fs::write(&ephemeral, b"payload").unwrap();

        let target = dir.join("kept");
        let path = persist_download(&ephemeral, &target).await.unwrap();

        assert!(!ephemeral.exists());
        assert_eq!(path.parent(), Some(target.as_path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("tmp"));
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[test]
    fn test_claim_renames_within_staging_dir() {
        let dir = scratch("claim");
        let ephemeral = dir.join("7.part");
        std::fs::write(&ephemeral, b"body").unwrap();

        let (claimed, response) = claim_download(Ok((ephemeral.clone(), response()))).unwrap();

        assert!(!ephemeral.exists());
        assert_eq!(claimed.parent(), Some(dir.as_path()));
        assert_eq!(claimed.extension().and_then(|e| e.to_str()), Some("claimed"));
        assert_eq!(std::fs::read(&claimed).unwrap(), b"body");
        assert_eq!(response.status, 200);
    }

    #[test]
    fn test_claim_passes_upstream_errors_through() {
        let err = claim_download(Err(BridgeError::Timeout)).unwrap_err();
        assert!(matches!(err, Error::Upstream(BridgeError::Timeout)));

        let err = claim_download(Err(BridgeError::cancelled())).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_missing_ephemeral_file_is_post_processing_failure() {
        let dir = scratch("missing");
        let outcome = Ok((dir.join("never-written.part"), response()));

        let err = claim_download(outcome).unwrap_err();
        assert!(matches!(err, Error::PostProcessing { .. }));
    }

    #[core_async::test]
    async fn test_failed_move_removes_claimed_file() {
        let dir = scratch("failed-move");
        let claimed = dir.join("abc.claimed");
        std::fs::write(&claimed, b"body").unwrap();
        let blocker = dir.join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = preserve_download(claimed.clone(), &blocker).await.unwrap_err();

        assert!(matches!(err, Error::PostProcessing { .. }));
        assert!(!claimed.exists());
    }
}
