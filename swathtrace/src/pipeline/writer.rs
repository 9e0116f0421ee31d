//! Background image persistence.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::PipelineError;
use crate::cache::{CacheError, OutputStore};
use crate::compositor::SwathImage;

/// Fixed pool of threads writing finished images to an [`OutputStore`].
///
/// Images are handed over through a bounded channel; [`submit`](Self::submit)
/// blocks while the queue is full. Dropping the sender in
/// [`finish`](Self::finish) lets the workers drain the queue and exit.
pub struct ImageWriterPool {
    sender: Option<mpsc::Sender<SwathImage>>,
    workers: Vec<JoinHandle<()>>,
    failed: Arc<AtomicBool>,
    written: Arc<AtomicUsize>,
    first_error: Arc<Mutex<Option<CacheError>>>,
}

impl ImageWriterPool {
    pub fn spawn(store: Arc<OutputStore>, threads: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<SwathImage>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let failed = Arc::new(AtomicBool::new(false));
        let written = Arc::new(AtomicUsize::new(0));
        let first_error = Arc::new(Mutex::new(None));

        let workers = (0..threads.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let store = Arc::clone(&store);
                let failed = Arc::clone(&failed);
                let written = Arc::clone(&written);
                let first_error = Arc::clone(&first_error);
                thread::spawn(move || loop {
                    let next = receiver.lock().blocking_recv();
                    let Some(image) = next else {
                        debug!(worker, "Image writer exiting");
                        break;
                    };
                    match store.write(&image.sample_id, &image.raster) {
                        Ok(path) => {
                            written.fetch_add(1, Ordering::Relaxed);
                            debug!(sample_id = %image.sample_id, path = %path.display(), "Image written");
                        }
                        Err(e) => {
                            error!(sample_id = %image.sample_id, error = %e, "Failed to write image");
                            failed.store(true, Ordering::SeqCst);
                            first_error.lock().get_or_insert(e);
                        }
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
            failed,
            written,
            first_error,
        }
    }

    /// Queues an image, blocking while the queue is full.
    pub fn submit(&self, image: SwathImage) -> Result<(), PipelineError> {
        let sender = self.sender.as_ref().ok_or(PipelineError::WriterClosed)?;
        sender
            .blocking_send(image)
            .map_err(|_| PipelineError::WriterClosed)
    }

    /// Whether any worker failed to write an image.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Closes the queue, waits for queued images to be written, and returns
    /// the number written.
    pub fn finish(mut self) -> Result<usize, PipelineError> {
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                self.failed.store(true, Ordering::SeqCst);
            }
        }
        if let Some(e) = self.first_error.lock().take() {
            return Err(PipelineError::Writer(e));
        }
        if self.has_failed() {
            return Err(PipelineError::WriterClosed);
        }
        Ok(self.written.load(Ordering::Relaxed))
    }
}
