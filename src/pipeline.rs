//! The ingestion pipeline.
//!
//! One call to [`run`] performs a complete synchronization pass:
//!
//! ```text
//! ResolveDirs → Traverse → { ClassifyAndExtract → StageFile → BufferDocument }* → FinalFlush → Done
//!      └──────────────┴───────────────┴──────────────┴───────────────┴──────────→ Aborted
//! ```
//!
//! ## Ordering
//!
//! The source tree is collected up front (siblings sorted by name at every
//! level, depth-first) and only then processed. Collecting first means
//! deleting a rejected file cannot disturb the walk, and a fixed order means
//! an unchanged tree always yields the same names, the same documents and
//! the same batches.
//!
//! ## Failure policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | bad source/destination | abort before any side effect |
//! | one file fails to copy/move/delete | reported, file skipped, run continues |
//! | store drop or insert fails | abort; batches already flushed stay committed |
//! | destination replacement fails | abort; destination restored, staging removed, nothing inserted |
//! | cancel token or deadline | checked between files; staged documents flushed, then abort |
//!
//! When the destination is being replaced, staged files sit in a protected
//! subdirectory until the final swap. Their documents are held in the
//! writer (past `batch_size` if need be) and only flushed, in `batch_size`
//! chunks, once the swap has succeeded. A failed swap or a cancellation
//! therefore writes nothing for this run.
//!
//! Concurrent runs against the same destination or collection are not
//! supported and must be serialized by the caller.

use crate::config::ConfigError;
use crate::fs::FileSystem;
use crate::metadata::year_options;
use crate::naming::{NameDecision, Namer, NamingStrategy, SkipReason};
use crate::stage::{
    self, DocumentPolicy, Rejection, STAGING_DIR, StageError, StageMode, build_document,
    occupant_richness,
};
use crate::store::{DocumentStore, StoreError};
use crate::writer::BatchWriter;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("directory unavailable: {}: {source}", .path.display())]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Staging(#[from] StageError),
    #[error("destination replacement failed: {0}")]
    Replace(#[source] StageError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("run cancelled after {processed} of {total} files")]
    Cancelled { processed: usize, total: usize },
}

impl From<ConfigError> for IngestError {
    fn from(e: ConfigError) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// Plain, validated values the pipeline runs with.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub batch_size: NonZeroUsize,
    /// Empty the collection before inserting; otherwise append.
    pub drop_existing: bool,
    pub collection: String,
    pub naming: NamingStrategy,
    pub stage_mode: StageMode,
    pub replace_destination: bool,
    pub delete_rejected: bool,
    pub documents: DocumentPolicy,
    /// Append mode only: consult names already in the collection.
    pub skip_existing_names: bool,
    pub year_options: Option<YearOptions>,
}

impl PipelineOptions {
    /// Copy, preserve-name, append, strict metadata policy.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>, collection: &str) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            batch_size: NonZeroUsize::new(crate::writer::DEFAULT_BATCH_SIZE)
                .unwrap_or(NonZeroUsize::MIN),
            drop_existing: false,
            collection: collection.to_string(),
            naming: NamingStrategy::default(),
            stage_mode: StageMode::default(),
            replace_destination: false,
            delete_rejected: false,
            documents: DocumentPolicy::default(),
            skip_existing_names: false,
            year_options: None,
        }
    }
}

/// Settings for attaching `yearOptions` to documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearOptions {
    pub seed: Option<u64>,
}

/// Shared flag for stopping a run between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation and deadline checked between files.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl RunControl {
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancelToken::default(),
            deadline: Some(deadline),
        }
    }

    fn should_stop(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    ResolveDirs,
    Traverse,
    ClassifyAndExtract,
    StageFile,
    BufferDocument,
    FinalFlush,
    Done,
    Aborted,
}

/// Why a traversed file produced no document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    NotImage,
    NoMetadata,
    Name(SkipReason),
}

/// Progress reported while a run executes.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    Started {
        source: PathBuf,
        destination: PathBuf,
        collection: String,
        batch_size: usize,
        drop_existing: bool,
        files: usize,
    },
    CollectionDropped {
        collection: String,
    },
    Staged {
        source: PathBuf,
        name: String,
        overwrote: bool,
    },
    Skipped {
        source: PathBuf,
        cause: SkipCause,
    },
    Deleted {
        source: PathBuf,
    },
    StagingFailed {
        source: PathBuf,
        error: String,
    },
    Flushed {
        count: usize,
        total: usize,
    },
    DestinationReplaced {
        entries: usize,
    },
}

/// Everything a run did, produced once per invocation.
#[derive(Debug)]
pub struct RunOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub collection: String,
    pub batch_size: NonZeroUsize,
    pub drop_existing: bool,
    /// Regular files found below the source root.
    pub files: usize,
    /// Files classified as images.
    pub scanned: usize,
    pub staged: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub staging_failures: usize,
    pub inserted: usize,
    pub state: RunState,
    /// First fatal error, if the run aborted.
    pub error: Option<IngestError>,
}

impl RunOutcome {
    fn new(options: &PipelineOptions) -> Self {
        Self {
            source: options.source.clone(),
            destination: options.destination.clone(),
            collection: options.collection.clone(),
            batch_size: options.batch_size,
            drop_existing: options.drop_existing,
            files: 0,
            scanned: 0,
            staged: 0,
            skipped: 0,
            deleted: 0,
            staging_failures: 0,
            inserted: 0,
            state: RunState::Init,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Process exit code: 0 on success (including an empty source), 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }
}

/// Run one ingestion pass.
///
/// Never panics on I/O or store failures; the outcome carries the first
/// fatal error instead.
pub fn run<F, S>(
    fs: &F,
    store: &mut S,
    options: &PipelineOptions,
    control: &RunControl,
    events: Option<Sender<IngestEvent>>,
) -> RunOutcome
where
    F: FileSystem,
    S: DocumentStore + ?Sized,
{
    let mut run = Run {
        fs,
        store,
        options,
        control,
        events,
        outcome: RunOutcome::new(options),
    };
    match run.execute() {
        Ok(()) => run.transition(RunState::Done),
        Err(e) => {
            error!(error = %e, "ingestion aborted");
            run.transition(RunState::Aborted);
            run.outcome.error = Some(e);
        }
    }
    run.outcome
}

struct Run<'a, F: FileSystem, S: DocumentStore + ?Sized> {
    fs: &'a F,
    store: &'a mut S,
    options: &'a PipelineOptions,
    control: &'a RunControl,
    events: Option<Sender<IngestEvent>>,
    outcome: RunOutcome,
}

impl<F: FileSystem, S: DocumentStore + ?Sized> Run<'_, F, S> {
    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.outcome.state, to = ?next, "state");
        self.outcome.state = next;
    }

    fn emit(&self, event: IngestEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    fn execute(&mut self) -> Result<(), IngestError> {
        self.transition(RunState::ResolveDirs);
        let (source, destination) = resolve_dirs(self.fs, &self.options.source, &self.options.destination)?;
        self.outcome.source = source.clone();
        self.outcome.destination = destination.clone();

        self.transition(RunState::Traverse);
        let files = self
            .fs
            .walk_files_sorted(&source)
            .map_err(unavailable(&source))?;
        self.outcome.files = files.len();
        if files.is_empty() {
            info!(source = %source.display(), "no files found");
            return Ok(());
        }
        self.emit(IngestEvent::Started {
            source: source.clone(),
            destination: destination.clone(),
            collection: self.options.collection.clone(),
            batch_size: self.options.batch_size.get(),
            drop_existing: self.options.drop_existing,
            files: files.len(),
        });

        let mut writer = BatchWriter::new(&self.options.collection, self.options.batch_size);
        let mut namer = Namer::new(self.options.naming);
        if self.options.drop_existing {
            writer.drop_existing(self.store)?;
            self.emit(IngestEvent::CollectionDropped {
                collection: self.options.collection.clone(),
            });
        } else if self.options.skip_existing_names {
            let recorded = self.store.existing_names(&self.options.collection)?;
            debug!(count = recorded.len(), "reserved recorded names");
            namer.reserve_recorded(recorded);
        }

        let staging_dir = self.prepare_staging_dir(&destination)?;
        let mut rng = self.options.year_options.map(|opts| match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });

        for (processed, path) in files.iter().enumerate() {
            if self.control.should_stop() {
                return Err(self.cancel(&mut writer, &staging_dir, processed, files.len()));
            }
            self.ingest_file(path, &source, &staging_dir, &mut namer, &mut writer, rng.as_mut())?;
        }

        if staging_dir != destination {
            let entries = stage::replace_directory_atomically(self.fs, &destination, &staging_dir)
                .map_err(IngestError::Replace)?;
            info!(entries, destination = %destination.display(), "destination replaced");
            self.emit(IngestEvent::DestinationReplaced { entries });
        }

        self.transition(RunState::FinalFlush);
        self.flush(&mut writer)?;
        info!(
            inserted = self.outcome.inserted,
            collection = %self.options.collection,
            "ingestion complete"
        );
        Ok(())
    }

    /// Directory files are staged into: the destination itself, or a fresh
    /// protected subdirectory when the destination is being replaced.
    fn prepare_staging_dir(&self, destination: &Path) -> Result<PathBuf, IngestError> {
        if !self.options.replace_destination {
            return Ok(destination.to_path_buf());
        }
        let staging_dir = destination.join(STAGING_DIR);
        if self.fs.exists(&staging_dir) {
            warn!(path = %staging_dir.display(), "removing leftover staging directory");
            self.fs
                .remove_dir_all(&staging_dir)
                .map_err(unavailable(&staging_dir))?;
        }
        self.fs
            .create_dir_all(&staging_dir)
            .map_err(unavailable(&staging_dir))?;
        Ok(staging_dir)
    }

    fn ingest_file(
        &mut self,
        path: &Path,
        source_root: &Path,
        staging_dir: &Path,
        namer: &mut Namer,
        writer: &mut BatchWriter,
        rng: Option<&mut StdRng>,
    ) -> Result<(), IngestError> {
        self.transition(RunState::ClassifyAndExtract);
        let mut document = match build_document(path, source_root, &self.options.documents) {
            Ok(doc) => doc,
            Err(Rejection::NotImage) => {
                self.reject_non_image(path);
                return Ok(());
            }
            Err(Rejection::NoMetadata) => {
                self.outcome.scanned += 1;
                self.skip(path, SkipCause::NoMetadata);
                return Ok(());
            }
        };
        self.outcome.scanned += 1;

        self.transition(RunState::StageFile);
        let years = self.options.documents.years;
        let decision = namer.assign(&document, |name| {
            occupant_richness(self.fs, staging_dir, name, &years)
        });
        let overwrote = matches!(decision, NameDecision::Overwrite(_));
        document.name = match decision {
            NameDecision::Fresh(name) | NameDecision::Overwrite(name) => name,
            NameDecision::Skip { reason, .. } => {
                self.skip(path, SkipCause::Name(reason));
                return Ok(());
            }
        };

        if let Err(e) = stage::stage(self.fs, path, &document, staging_dir, self.options.stage_mode) {
            warn!(source = %path.display(), error = %e, "staging failed, skipping file");
            self.outcome.staging_failures += 1;
            self.emit(IngestEvent::StagingFailed {
                source: path.to_path_buf(),
                error: e.to_string(),
            });
            return Ok(());
        }
        self.outcome.staged += 1;
        self.emit(IngestEvent::Staged {
            source: path.to_path_buf(),
            name: document.name.clone(),
            overwrote,
        });

        self.transition(RunState::BufferDocument);
        if let (Some(rng), Some(year)) = (rng, document.year) {
            document.year_options = Some(year_options(year, rng));
        }
        if self.options.replace_destination {
            // Staged files are not in the destination until the swap.
            writer.hold(document);
            return Ok(());
        }
        let flushed = writer.append(document, self.store)?;
        if flushed > 0 {
            self.outcome.inserted = writer.inserted();
            self.emit(IngestEvent::Flushed {
                count: flushed,
                total: writer.inserted(),
            });
        }
        Ok(())
    }

    fn reject_non_image(&mut self, path: &Path) {
        if !self.options.delete_rejected {
            self.skip(path, SkipCause::NotImage);
            return;
        }
        match stage::discard(self.fs, path) {
            Ok(()) => {
                self.outcome.deleted += 1;
                self.emit(IngestEvent::Deleted {
                    source: path.to_path_buf(),
                });
            }
            Err(e) => {
                warn!(source = %path.display(), error = %e, "could not delete rejected file");
                self.outcome.staging_failures += 1;
                self.emit(IngestEvent::StagingFailed {
                    source: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    fn skip(&mut self, path: &Path, cause: SkipCause) {
        debug!(source = %path.display(), ?cause, "skipped");
        self.outcome.skipped += 1;
        self.emit(IngestEvent::Skipped {
            source: path.to_path_buf(),
            cause,
        });
    }

    fn flush(&mut self, writer: &mut BatchWriter) -> Result<(), IngestError> {
        let flushed = writer.flush(self.store)?;
        self.outcome.inserted = writer.inserted();
        if flushed > 0 {
            self.emit(IngestEvent::Flushed {
                count: flushed,
                total: writer.inserted(),
            });
        }
        Ok(())
    }

    /// Stop between files. Documents for files already in the destination
    /// are flushed; a half-built replacement is discarded together with the
    /// documents held for it.
    fn cancel(
        &mut self,
        writer: &mut BatchWriter,
        staging_dir: &Path,
        processed: usize,
        total: usize,
    ) -> IngestError {
        warn!(processed, total, "run cancelled");
        if self.options.replace_destination {
            debug!(discarded = writer.pending(), "dropping held documents");
            if let Err(e) = self.fs.remove_dir_all(staging_dir) {
                warn!(path = %staging_dir.display(), error = %e, "could not remove staging directory");
            }
        } else if let Err(e) = self.flush(writer) {
            return e;
        }
        IngestError::Cancelled { processed, total }
    }
}

/// Validate and normalize the source and destination directories.
///
/// The source must be an existing directory. The destination is created if
/// missing. Identical or nested directories are rejected before anything
/// is created.
pub fn resolve_dirs(
    fs: &impl FileSystem,
    source: &Path,
    destination: &Path,
) -> Result<(PathBuf, PathBuf), IngestError> {
    if !fs.is_dir(source) {
        let kind = if fs.exists(source) {
            io::ErrorKind::NotADirectory
        } else {
            io::ErrorKind::NotFound
        };
        return Err(IngestError::DirectoryUnavailable {
            path: source.to_path_buf(),
            source: io::Error::new(kind, "source is not a directory"),
        });
    }
    let source = fs.canonicalize(source).map_err(unavailable(source))?;
    let destination_abs = normalize(fs, destination).map_err(unavailable(destination))?;

    if destination_abs == source {
        return Err(IngestError::Configuration(format!(
            "source and destination are the same directory: {}",
            source.display()
        )));
    }
    if destination_abs.starts_with(&source) || source.starts_with(&destination_abs) {
        return Err(IngestError::Configuration(format!(
            "source {} and destination {} must not be nested inside one another",
            source.display(),
            destination_abs.display()
        )));
    }

    if fs.exists(&destination_abs) && !fs.is_dir(&destination_abs) {
        return Err(IngestError::DirectoryUnavailable {
            path: destination_abs,
            source: io::Error::new(io::ErrorKind::NotADirectory, "destination is not a directory"),
        });
    }
    fs.create_dir_all(&destination_abs)
        .map_err(unavailable(&destination_abs))?;
    Ok((source, destination_abs))
}

fn unavailable(path: &Path) -> impl FnOnce(io::Error) -> IngestError + '_ {
    move |source| IngestError::DirectoryUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

/// Absolute form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the missing tail appended.
fn normalize(fs: &impl FileSystem, path: &Path) -> io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut cursor = path;
    loop {
        let existing = if cursor.as_os_str().is_empty() {
            Path::new(".")
        } else {
            cursor
        };
        match fs.canonicalize(existing) {
            Ok(base) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(base, |acc: PathBuf, part| acc.join(part)));
            }
            Err(e) => match (cursor.parent(), cursor.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    cursor = parent;
                }
                _ => return Err(e),
            },
        }
    }
}
