//! Quarantine of infected documents.

use kyc_common::StorageBackend;

/// Moves infected files under a prefix on the disk they were stored on.
#[derive(Debug, Clone)]
pub struct QuarantineManager {
    prefix: String,
}

impl QuarantineManager {
    #[must_use]
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Path a file at `path` is moved to.
    #[must_use]
    pub fn quarantine_path(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.is_quarantined(path) {
            return path.to_string();
        }
        format!("{}/{path}", self.prefix)
    }

    /// Whether `path` already lies under the quarantine prefix.
    #[must_use]
    pub fn is_quarantined(&self, path: &str) -> bool {
        path.trim_start_matches('/')
            .strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Move the file at `path` into quarantine on `disk`.
    ///
    /// Returns the path the bytes live at afterwards: the quarantine path on
    /// success, the original path when the move failed.
    pub async fn isolate(
        &self,
        disk: &dyn StorageBackend,
        document_id: &str,
        path: &str,
    ) -> String {
        let target = self.quarantine_path(path);
        if target == path {
            return target;
        }

        match disk.move_to(path, &target).await {
            Ok(()) => {
                tracing::info!(
                    target: "kyc::audit",
                    document_id = %document_id,
                    from = %path,
                    to = %target,
                    "Moved infected document to quarantine"
                );
                target
            }
            Err(e) => {
                tracing::error!(
                    target: "kyc::audit",
                    document_id = %document_id,
                    path = %path,
                    error = %e,
                    "Failed to quarantine infected document, keeping original path"
                );
                path.to_string()
            }
        }
    }
}
