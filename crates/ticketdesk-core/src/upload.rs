//! Upload screening against the profile's file policy.
//!
//! Type checks look at the extension only; content is never sniffed.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ticketdesk_config::Configuration;
use tracing::debug;

use crate::error::UploadError;

/// One uploaded file awaiting validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCandidate {
    /// Client-supplied file name.
    pub name: String,
    /// Temporary handle written by the transport.
    pub tmp_path: PathBuf,
    /// Declared size in bytes.
    pub size: u64,
    /// Client-supplied MIME type; recorded, never trusted.
    pub mime_type: Option<String>,
    /// First rejection reason, if any.
    pub error: Option<UploadError>,
}

impl UploadCandidate {
    /// Candidate without a transport error.
    #[must_use]
    pub fn new(name: impl Into<String>, tmp_path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            name: name.into(),
            tmp_path: tmp_path.into(),
            size,
            mime_type: None,
            error: None,
        }
    }

    /// Attach the client-supplied MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Attach a failure reported by the transport before validation.
    #[must_use]
    pub fn with_transport_error(mut self, reason: impl Into<String>) -> Self {
        self.error = Some(UploadError::Transport {
            reason: reason.into(),
        });
        self
    }

    /// Whether the candidate was rejected.
    #[must_use]
    pub const fn is_rejected(&self) -> bool {
        self.error.is_some()
    }
}

/// Confirms a temporary handle belongs to a completed upload of this request.
pub trait TransferVerifier: Send + Sync {
    /// Whether `handle` is a genuine, completed upload.
    fn is_completed_upload(&self, handle: &Path) -> bool;
}

/// Accepts regular files located inside the upload staging directory.
#[derive(Debug, Clone)]
pub struct TempDirVerifier {
    root: PathBuf,
}

impl TempDirVerifier {
    /// Verifier rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TransferVerifier for TempDirVerifier {
    fn is_completed_upload(&self, handle: &Path) -> bool {
        let (Ok(root), Ok(resolved)) = (fs::canonicalize(&self.root), fs::canonicalize(handle))
        else {
            return false;
        };
        resolved.starts_with(&root) && resolved.is_file()
    }
}

/// File type and size rules from one configuration profile.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    config: Arc<Configuration>,
}

impl UploadPolicy {
    /// Policy backed by `config`.
    #[must_use]
    pub const fn new(config: Arc<Configuration>) -> Self {
        Self { config }
    }

    /// Whether the extension of `name` is allowed.
    ///
    /// No policy allows nothing; `.*` allows everything.
    #[must_use]
    pub fn is_file_type_allowed(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let Some(allowed) = self.config.allowed_file_types() else {
            return true;
        };
        extension(name).is_some_and(|ext| {
            let dotted = format!(".{}", ext.to_lowercase());
            allowed.iter().any(|entry| *entry == dotted)
        })
    }

    /// First rule `candidate` breaks, ignoring transport state.
    #[must_use]
    pub fn check(&self, candidate: &UploadCandidate, verifier: &dyn TransferVerifier) -> Option<UploadError> {
        if !self.is_file_type_allowed(&candidate.name) {
            return Some(UploadError::BadType {
                name: candidate.name.clone(),
            });
        }
        if candidate.size > self.config.max_file_size {
            return Some(UploadError::TooLarge {
                name: candidate.name.clone(),
                limit: format_file_size(self.config.max_file_size),
            });
        }
        if candidate.error.is_none() && !verifier.is_completed_upload(&candidate.tmp_path) {
            return Some(UploadError::BadTransfer);
        }
        None
    }

    /// Annotate every candidate with its first failure. Returns `true` when none failed.
    pub fn validate_batch(
        &self,
        candidates: &mut [UploadCandidate],
        verifier: &dyn TransferVerifier,
    ) -> bool {
        let mut rejected = 0_usize;
        for candidate in candidates.iter_mut() {
            if let Some(error) = self.check(candidate, verifier) {
                candidate.error = Some(error);
            }
            if candidate.is_rejected() {
                rejected += 1;
            }
        }
        if rejected > 0 {
            debug!(rejected, total = candidates.len(), "upload batch rejected");
        }
        rejected == 0
    }
}

/// Suffix after the last dot when it is three or four characters long.
///
/// A three character suffix wins when both readings are possible.
fn extension(name: &str) -> Option<&str> {
    let boundaries: Vec<usize> = name.char_indices().map(|(index, _)| index).collect();
    let count = boundaries.len();
    [3_usize, 4].into_iter().find_map(|width| {
        let dot = boundaries.get(count.checked_sub(width + 1)?)?;
        name[*dot..].starts_with('.').then(|| &name[dot + 1..])
    })
}

/// Human-readable size used in rejection messages.
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} bytes");
    }
    if bytes < 102_400 {
        return format!("{} kb", one_decimal(bytes, 1024));
    }
    format!("{} mb", one_decimal(bytes, 1_024_000))
}

fn one_decimal(bytes: u64, unit: u64) -> String {
    let tenths = (u128::from(bytes) * 10 + u128::from(unit) / 2) / u128::from(unit);
    if tenths % 10 == 0 {
        format!("{}", tenths / 10)
    } else {
        format!("{}.{}", tenths / 10, tenths % 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_config;
    use std::io::Write;

    struct Always(bool);

    impl TransferVerifier for Always {
        fn is_completed_upload(&self, _handle: &Path) -> bool {
            self.0
        }
    }

    fn policy(types: Option<&str>) -> UploadPolicy {
        let mut config = sample_config();
        config.allowed_file_types = types.map(str::to_string);
        UploadPolicy::new(Arc::new(config))
    }

    #[test]
    fn wildcard_allows_anything() {
        let policy = policy(Some("  .*  "));
        assert!(policy.is_file_type_allowed("archive.tar.gz"));
        assert!(policy.is_file_type_allowed("README"));
    }

    #[test]
    fn missing_or_blank_policy_allows_nothing() {
        assert!(!policy(None).is_file_type_allowed("notes.txt"));
        assert!(!policy(Some("   ")).is_file_type_allowed("notes.txt"));
        assert!(!policy(Some(".txt")).is_file_type_allowed(""));
    }

    #[test]
    fn matching_ignores_case_on_both_sides() {
        let policy = policy(Some("JPG, .png"));
        assert!(!policy.is_file_type_allowed("photo.GIF"));
        assert!(policy.is_file_type_allowed("scan.PNG"));

        let dotted = self::policy(Some(".JPG, .png"));
        assert!(dotted.is_file_type_allowed("photo.jpg"));
    }

    #[test]
    fn only_three_or_four_character_extensions_count() {
        let policy = policy(Some(".pdf, .jpeg, .gz"));
        assert!(policy.is_file_type_allowed("manual.pdf"));
        assert!(policy.is_file_type_allowed("holiday.jpeg"));
        assert!(!policy.is_file_type_allowed("bundle.gz"));
        assert!(!policy.is_file_type_allowed("pdf"));
        assert_eq!(extension("résumé.docx"), Some("docx"));
        assert_eq!(extension(".pdf"), Some("pdf"));
        assert_eq!(extension("noext"), None);
    }

    #[test]
    fn type_rejection_uses_user_message() {
        let mut batch = vec![UploadCandidate::new("photo.GIF", "/tmp/a", 10)];
        assert!(!policy(Some("jpg, png")).validate_batch(&mut batch, &Always(true)));
        assert_eq!(
            batch[0].error.as_ref().map(ToString::to_string).as_deref(),
            Some("Invalid file type for photo.GIF")
        );
    }

    #[test]
    fn rules_apply_in_order_with_one_error_each() {
        let policy = policy(Some(".pdf"));
        let mut batch = vec![
            UploadCandidate::new("huge.exe", "/tmp/a", 10_000_000),
            UploadCandidate::new("huge.pdf", "/tmp/b", 10_000_000),
            UploadCandidate::new("forged.pdf", "/etc/passwd", 10),
        ];
        assert!(!policy.validate_batch(&mut batch, &Always(false)));
        assert!(matches!(batch[0].error, Some(UploadError::BadType { .. })));
        assert_eq!(
            batch[1].error,
            Some(UploadError::TooLarge {
                name: "huge.pdf".to_string(),
                limit: "1 mb".to_string(),
            })
        );
        assert_eq!(batch[2].error, Some(UploadError::BadTransfer));
    }

    #[test]
    fn transport_errors_are_kept_and_fail_the_batch() {
        let policy = policy(Some(".pdf"));
        let mut batch = vec![
            UploadCandidate::new("ok.pdf", "/tmp/a", 10),
            UploadCandidate::new("partial.pdf", "/tmp/b", 10)
                .with_transport_error("The file was only partially uploaded"),
        ];
        assert!(!policy.validate_batch(&mut batch, &Always(false)));
        assert_eq!(batch[0].error, Some(UploadError::BadTransfer));
        assert_eq!(
            batch[1].error,
            Some(UploadError::Transport {
                reason: "The file was only partially uploaded".to_string()
            })
        );
    }

    #[test]
    fn clean_batch_passes() {
        let policy = policy(Some(".pdf, .png"));
        let mut batch = vec![
            UploadCandidate::new("a.pdf", "/tmp/a", 10).with_mime_type("application/pdf"),
            UploadCandidate::new("b.png", "/tmp/b", 1_048_576),
        ];
        assert!(policy.validate_batch(&mut batch, &Always(true)));
        assert!(batch.iter().all(|candidate| !candidate.is_rejected()));
        assert!(policy.validate_batch(&mut [], &Always(true)));
    }

    #[test]
    fn temp_dir_verifier_accepts_only_staged_files() -> std::io::Result<()> {
        let staging = tempfile::tempdir()?;
        let outside = tempfile::tempdir()?;
        let verifier = TempDirVerifier::new(staging.path());

        let staged = staging.path().join("upload-1");
        fs::File::create(&staged)?.write_all(b"%PDF")?;
        let foreign = outside.path().join("upload-2");
        fs::File::create(&foreign)?.write_all(b"%PDF")?;

        assert!(verifier.is_completed_upload(&staged));
        assert!(!verifier.is_completed_upload(&foreign));
        assert!(!verifier.is_completed_upload(staging.path()));
        assert!(!verifier.is_completed_upload(&staging.path().join("missing")));
        assert!(!verifier.is_completed_upload(&staging.path().join("..").join("upload-2")));
        Ok(())
    }

    #[test]
    fn file_sizes_render_like_the_admin_panel() {
        assert_eq!(format_file_size(512), "512 bytes");
        assert_eq!(format_file_size(2048), "2 kb");
        assert_eq!(format_file_size(1536), "1.5 kb");
        assert_eq!(format_file_size(1_048_576), "1 mb");
        assert_eq!(format_file_size(2_560_000), "2.5 mb");
    }
}
