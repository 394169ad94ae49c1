use crate::compose::{RenderedDocument, Renderer};
use crate::config::RenderConfig;
use crate::data::{BackgroundSet, DataRow};
use crate::debug::DebugLogger;
use crate::error::ScrawlError;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Receives batch notifications on the worker thread.
pub trait ProgressSink: Send {
    fn progress(&mut self, _completed: usize, _total: usize) {}
    fn complete(&mut self, _message: &str) {}
}

impl ProgressSink for () {}

#[derive(Debug)]
pub enum RowOutcome {
    Saved { index: usize, path: PathBuf },
    Failed { index: usize, error: ScrawlError },
}

impl RowOutcome {
    pub fn index(&self) -> usize {
        match self {
            RowOutcome::Saved { index, .. } | RowOutcome::Failed { index, .. } => *index,
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub processed: usize,
    pub saved: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub outcomes: Vec<RowOutcome>,
}

impl BatchSummary {
    fn message(&self) -> String {
        if self.cancelled {
            format!(
                "Generation stopped: {} of {} documents saved",
                self.saved, self.total
            )
        } else {
            format!(
                "Generation finished: {} of {} documents saved",
                self.saved, self.total
            )
        }
    }
}

/// Cloneable cancellation token for one batch run.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    /// Takes effect at the next row boundary.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct BatchHandle {
    thread: JoinHandle<BatchSummary>,
    stop: StopHandle,
}

impl BatchHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> Result<BatchSummary, ScrawlError> {
        self.thread.join().map_err(|_| ScrawlError::WorkerPanicked)
    }
}

/// Drives previews and batch runs over one shared render slot.
#[derive(Debug)]
pub struct BatchController {
    renderer: Arc<Mutex<Renderer>>,
    busy: Arc<AtomicBool>,
    current: Mutex<Option<StopHandle>>,
    output_dir: PathBuf,
    jpeg_quality: u8,
    journal: Option<DebugLogger>,
}

impl BatchController {
    pub fn new(renderer: Renderer, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer: Arc::new(Mutex::new(renderer)),
            busy: Arc::new(AtomicBool::new(false)),
            current: Mutex::new(None),
            output_dir: output_dir.into(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            journal: None,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_journal(mut self, journal: DebugLogger) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    /// True from `run_batch` until its worker has finished cleanup.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Stops the most recently started batch, if any.
    pub fn stop(&self) {
        if let Some(handle) = self.stop_handle() {
            handle.stop();
        }
    }

    /// Cancellation token of the most recently started batch.
    pub fn stop_handle(&self) -> Option<StopHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Renders one document with row index 0. Without a sample row, a
    /// placeholder row echoing each zone's column name is used.
    pub fn preview(
        &self,
        background: &Path,
        config: &RenderConfig,
        sample: Option<&DataRow>,
    ) -> Result<RenderedDocument, ScrawlError> {
        let placeholder;
        let row = match sample {
            Some(row) => row,
            None => {
                placeholder = DataRow::placeholder(&config.zones);
                &placeholder
            }
        };
        lock_renderer(&self.renderer).render(background, row, config, 0)
    }

    /// Starts a batch on a worker thread. Document `i` uses background
    /// `i mod len` and is saved as `doc_{i+1}.jpg`.
    pub fn run_batch(
        &self,
        backgrounds: BackgroundSet,
        rows: Vec<DataRow>,
        config: RenderConfig,
        sink: impl ProgressSink + 'static,
    ) -> Result<BatchHandle, ScrawlError> {
        if backgrounds.is_empty() {
            return Err(ScrawlError::EmptyBackgroundSet);
        }
        fs::create_dir_all(&self.output_dir)?;
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ScrawlError::BatchAlreadyRunning);
        }
        let stop = StopHandle {
            running: Arc::new(AtomicBool::new(true)),
        };
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(stop.clone());

        let worker = BatchWorker {
            renderer: self.renderer.clone(),
            running: stop.running.clone(),
            busy: self.busy.clone(),
            output_dir: self.output_dir.clone(),
            jpeg_quality: self.jpeg_quality,
            journal: self.journal.clone(),
        };
        let spawned = thread::Builder::new()
            .name("scrawl-batch".to_string())
            .spawn(move || worker.run(backgrounds, rows, config, sink));
        let thread = match spawned {
            Ok(thread) => thread,
            Err(err) => {
                stop.stop();
                self.busy.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };
        Ok(BatchHandle { thread, stop })
    }
}

fn lock_renderer(renderer: &Mutex<Renderer>) -> MutexGuard<'_, Renderer> {
    renderer.lock().unwrap_or_else(PoisonError::into_inner)
}

struct BatchWorker {
    renderer: Arc<Mutex<Renderer>>,
    running: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    output_dir: PathBuf,
    jpeg_quality: u8,
    journal: Option<DebugLogger>,
}

/// Clears both flags even if the worker unwinds.
struct RunGuard {
    running: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl BatchWorker {
    fn run(
        self,
        backgrounds: BackgroundSet,
        rows: Vec<DataRow>,
        config: RenderConfig,
        mut sink: impl ProgressSink,
    ) -> BatchSummary {
        let _guard = RunGuard {
            running: self.running.clone(),
            busy: self.busy.clone(),
        };
        let total = rows.len();
        log::info!(
            "batch started: {total} rows over {} backgrounds into {}",
            backgrounds.len(),
            self.output_dir.display()
        );
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };

        for (index, row) in rows.iter().enumerate() {
            if !self.running.load(Ordering::SeqCst) {
                summary.cancelled = true;
                break;
            }
            let outcome = match backgrounds.for_index(index) {
                Some(background) => self.process_row(index, background, row, &config),
                None => RowOutcome::Failed {
                    index,
                    error: ScrawlError::EmptyBackgroundSet,
                },
            };
            match &outcome {
                RowOutcome::Saved { .. } => summary.saved += 1,
                RowOutcome::Failed { .. } => summary.failed += 1,
            }
            summary.outcomes.push(outcome);
            summary.processed += 1;
            sink.progress(summary.processed, total);
        }

        lock_renderer(&self.renderer).clear_font_cache();
        if let Some(journal) = &self.journal {
            journal.increment("rows.total", total as u64);
            if summary.cancelled {
                journal.increment("batch.cancelled", 1);
            }
            journal.emit_summary("batch");
            journal.flush();
        }
        log::info!(
            "batch {}: {} saved, {} failed, {} of {total} processed",
            if summary.cancelled { "stopped" } else { "finished" },
            summary.saved,
            summary.failed,
            summary.processed
        );
        self.running.store(false, Ordering::SeqCst);
        sink.complete(&summary.message());
        summary
    }

    fn process_row(
        &self,
        index: usize,
        background: &Path,
        row: &DataRow,
        config: &RenderConfig,
    ) -> RowOutcome {
        let started = Instant::now();
        let path = self.output_dir.join(format!("doc_{}.jpg", index + 1));
        let rendered = lock_renderer(&self.renderer).render(background, row, config, index);
        let result = rendered.and_then(|doc| {
            doc.save_jpeg(&path, self.jpeg_quality)?;
            Ok(doc)
        });
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match result {
            Ok(doc) => {
                if let Some(journal) = &self.journal {
                    journal.increment("rows.saved", 1);
                    journal.increment("zones.drawn", doc.drawn_zones() as u64);
                    journal.increment("zones.skipped", doc.skipped_zones() as u64);
                    journal.log_event(
                        "row.rendered",
                        json!({
                            "row": index,
                            "seed": doc.seed(),
                            "background": background.display().to_string(),
                            "path": path.display().to_string(),
                            "ms": elapsed_ms,
                            "zones_drawn": doc.drawn_zones(),
                            "zones_skipped": doc.skipped_zones(),
                        }),
                    );
                }
                RowOutcome::Saved { index, path }
            }
            Err(error) => {
                log::warn!("row {index} failed: {error}");
                if let Some(journal) = &self.journal {
                    journal.increment("rows.failed", 1);
                    journal.log_event(
                        "row.failed",
                        json!({
                            "row": index,
                            "background": background.display().to_string(),
                            "ms": elapsed_ms,
                            "error": error.to_string(),
                        }),
                    );
                }
                RowOutcome::Failed { index, error }
            }
        }
    }
}
