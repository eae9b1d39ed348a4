//! Reading a backup location back as an ordered chain of captures.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use emberdb_storage::journal::{scan_segment, TxId};

use super::error::{BackupError, BackupResult};
use super::manifest::{
    BackupManifest, CaptureKind, TxRange, DATA_FILE_NAME, INCREMENTAL_PREFIX, JOURNAL_DIR,
};

/// One capture directory and its manifest.
#[derive(Debug, Clone)]
pub struct Capture {
    /// The capture directory.
    pub dir: PathBuf,
    /// Its manifest.
    pub manifest: BackupManifest,
}

impl Capture {
    /// Paths of the capture's journal segments, oldest first.
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        let journal = self.dir.join(JOURNAL_DIR);
        self.manifest.segments.iter().map(|s| journal.join(&s.file)).collect()
    }

    /// Path of the capture's data file (full captures only).
    pub fn data_file_path(&self) -> Option<PathBuf> {
        self.manifest.data_file.as_ref().map(|f| self.dir.join(f))
    }

    /// Check that every file the manifest names is present and intact.
    fn verify_files(&self) -> BackupResult<()> {
        if let Some(data) = self.data_file_path() {
            if !data.is_file() {
                return Err(BackupError::discontinuity(format!(
                    "{} is missing",
                    data.display()
                )));
            }
        }
        for (entry, path) in self.manifest.segments.iter().zip(self.segment_paths()) {
            let summary = scan_segment(&path).map_err(|e| {
                BackupError::discontinuity(format!("{}: {e}", path.display()))
            })?;
            let len = fs::metadata(&path)?.len();
            if summary.torn
                || len != entry.bytes
                || summary.first_txid != Some(entry.first_txid)
                || summary.last_txid != Some(entry.last_txid)
            {
                return Err(BackupError::discontinuity(format!(
                    "{} does not match its manifest entry",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// A validated chain: one full capture followed by contiguous incrementals.
#[derive(Debug, Clone)]
pub struct BackupChain {
    root: PathBuf,
    full: Capture,
    incrementals: Vec<Capture>,
}

impl BackupChain {
    /// Load and validate the chain rooted at `root`.
    ///
    /// Incremental directories without a manifest are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::ChainDiscontinuity`] if there is no full capture
    /// or the incrementals have gaps, overlaps, or out-of-order ordinals, and
    /// [`BackupError::Manifest`] if a manifest is unreadable.
    pub fn load(root: &Path) -> BackupResult<Self> {
        let Some(manifest) = BackupManifest::load(root)? else {
            return Err(BackupError::discontinuity(format!(
                "no full capture at {}",
                root.display()
            )));
        };
        if manifest.kind != CaptureKind::Full || manifest.covers.start != 0 || manifest.ordinal != 0
        {
            return Err(BackupError::discontinuity(format!(
                "{} does not hold a full capture",
                root.display()
            )));
        }
        let full = Capture { dir: root.to_path_buf(), manifest };

        let mut incrementals = Vec::new();
        for entry in fs::read_dir(root)? {
            let entry = entry?;
            let name = entry.file_name();
            let is_capture_dir = entry.file_type()?.is_dir()
                && name.to_str().is_some_and(|n| n.starts_with(INCREMENTAL_PREFIX));
            if !is_capture_dir {
                continue;
            }
            let dir = entry.path();
            match BackupManifest::load(&dir)? {
                Some(manifest) if manifest.kind == CaptureKind::Incremental => {
                    incrementals.push(Capture { dir, manifest });
                }
                Some(_) => {
                    return Err(BackupError::discontinuity(format!(
                        "{} holds a second full capture",
                        dir.display()
                    )));
                }
                None => warn!(dir = %dir.display(), "skipping capture without a manifest"),
            }
        }
        incrementals.sort_by_key(|c| (c.manifest.timestamp_ms, c.manifest.ordinal));

        let mut previous = &full.manifest;
        for capture in &incrementals {
            let manifest = &capture.manifest;
            if manifest.ordinal != previous.ordinal + 1 {
                return Err(BackupError::discontinuity(format!(
                    "{} has ordinal {}, expected {}",
                    capture.dir.display(),
                    manifest.ordinal,
                    previous.ordinal + 1
                )));
            }
            if manifest.covers.start != previous.covers.end {
                return Err(BackupError::discontinuity(format!(
                    "{} covers {}, expected to start at {}",
                    capture.dir.display(),
                    manifest.covers,
                    previous.covers.end
                )));
            }
            previous = manifest;
        }

        debug!(
            root = %root.display(),
            incrementals = incrementals.len(),
            tip = previous.covers.end,
            "loaded backup chain"
        );
        Ok(Self { root: root.to_path_buf(), full, incrementals })
    }

    /// The backup location.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The full capture.
    pub const fn full(&self) -> &Capture {
        &self.full
    }

    /// Incremental captures in application order.
    pub fn incrementals(&self) -> &[Capture] {
        &self.incrementals
    }

    /// All captures in application order.
    pub fn captures(&self) -> impl Iterator<Item = &Capture> {
        std::iter::once(&self.full).chain(self.incrementals.iter())
    }

    /// Manifest of the newest capture.
    pub fn tip(&self) -> &BackupManifest {
        self.incrementals.last().map_or(&self.full.manifest, |c| &c.manifest)
    }

    /// Transactions a restore of the whole chain ends up holding.
    pub fn covers(&self) -> TxRange {
        TxRange::new(0, self.tip().covers.end)
    }

    /// Last transaction in the chain.
    pub fn tip_txid(&self) -> TxId {
        self.tip().covers.end
    }

    /// Ordinal the next incremental capture gets.
    pub fn next_ordinal(&self) -> u64 {
        self.tip().ordinal + 1
    }

    /// Check every file the chain references against its manifest.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::ChainDiscontinuity`] on a missing or damaged file.
    pub fn verify_files(&self) -> BackupResult<()> {
        for capture in self.captures() {
            capture.verify_files()?;
        }
        Ok(())
    }
}

/// Summary line of one capture, as reported by [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Capture directory.
    pub dir: PathBuf,
    /// Capture kind.
    pub kind: CaptureKind,
    /// Chain position.
    pub ordinal: u64,
    /// Covered transactions.
    pub covers: TxRange,
    /// Number of journal segments.
    pub segments: usize,
    /// Total bytes of segments and data file.
    pub bytes: u64,
}

/// Load the chain at `location` and check every file it references.
///
/// # Errors
///
/// Returns [`BackupError::ChainDiscontinuity`] if the chain is broken or a
/// file is missing or damaged.
pub fn verify(location: &Path) -> BackupResult<Vec<CaptureSummary>> {
    let chain = BackupChain::load(location)?;
    chain.verify_files()?;
    chain
        .captures()
        .map(|capture| -> BackupResult<CaptureSummary> {
            let mut bytes: u64 = capture.manifest.segments.iter().map(|s| s.bytes).sum();
            if capture.manifest.data_file.is_some() {
                bytes += fs::metadata(capture.dir.join(DATA_FILE_NAME))?.len();
            }
            Ok(CaptureSummary {
                dir: capture.dir.clone(),
                kind: capture.manifest.kind,
                ordinal: capture.manifest.ordinal,
                covers: capture.manifest.covers,
                segments: capture.manifest.segments.len(),
                bytes,
            })
        })
        .collect()
}
