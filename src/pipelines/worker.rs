// SPDX-License-Identifier: GPL-3.0-only
//! Dedicated processing thread
//!
//! `EffectsPipeline::process` blocks for the duration of the engine's
//! transform, so frames should be pulled and processed off the capture
//! thread. The worker calls a frame source, runs each frame through the
//! pipeline and hands the result to a sink until either side stops it.

use crate::errors::PipelineResult;
use crate::frame::OwnedFrame;
use crate::pipelines::effects::{EffectsPipeline, OutputSurfaceView};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by the sink to control the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Keep processing frames
    Continue,
    /// Stop the loop gracefully
    Stop,
}

#[derive(Default)]
struct WorkerCounters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Frame counts observed by a worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
}

/// Runs frames through an [`EffectsPipeline`] on its own thread
///
/// ```ignore
/// let mut worker = ProcessingWorker::start(
///     "effects",
///     Arc::clone(&pipeline),
///     move || camera.next_frame(),
///     |result| {
///         if let Ok(view) = result {
///             present(&view.pixels());
///         }
///         LoopAction::Continue
///     },
/// )?;
///
/// // Later
/// worker.stop();
/// ```
pub struct ProcessingWorker {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    counters: Arc<WorkerCounters>,
    name: String,
}

impl ProcessingWorker {
    /// Spawn the worker thread, named `name`
    ///
    /// `source` returning `None` ends the loop, as does the sink returning
    /// [`LoopAction::Stop`] or a call to [`ProcessingWorker::stop`]. Failed
    /// frames are passed to the sink like successful ones; the pipeline
    /// stays usable after a per-frame error.
    pub fn start<S, K>(
        name: &str,
        pipeline: Arc<EffectsPipeline>,
        mut source: S,
        mut sink: K,
    ) -> PipelineResult<Self>
    where
        S: FnMut() -> Option<OwnedFrame> + Send + 'static,
        K: FnMut(PipelineResult<OutputSurfaceView>) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let counters = Arc::new(WorkerCounters::default());
        let counters_clone = Arc::clone(&counters);
        let name_clone = name.to_string();

        info!(name = %name, "Starting processing worker");

        let thread_handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            debug!(name = %name_clone, "Processing thread started");

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                let Some(frame) = source() else {
                    debug!(name = %name_clone, "Frame source exhausted");
                    break;
                };

                let result = pipeline.process(frame.as_view());
                match &result {
                    Ok(_) => counters_clone.processed.fetch_add(1, Ordering::Relaxed),
                    Err(_) => counters_clone.failed.fetch_add(1, Ordering::Relaxed),
                };

                if sink(result) == LoopAction::Stop {
                    debug!(name = %name_clone, "Sink requested stop");
                    break;
                }
            }

            info!(
                name = %name_clone,
                processed = counters_clone.processed.load(Ordering::Relaxed),
                failed = counters_clone.failed.load(Ordering::Relaxed),
                "Processing thread exiting"
            );
        })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            counters,
            name: name.to_string(),
        })
    }

    /// Check if the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Clone of the stop flag, e.g. for a signal handler
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting processing worker stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for processing thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Processing thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Processing thread finished");
            }
        }
    }
}

impl Drop for ProcessingWorker {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "ProcessingWorker dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use std::sync::Mutex;
    use std::time::Duration;

    fn pipeline() -> Arc<EffectsPipeline> {
        Arc::new(EffectsPipeline::new(4, 2).unwrap())
    }

    #[test]
    fn test_runs_until_source_is_exhausted() {
        let mut frames = (0u8..5).map(|v| OwnedFrame::solid_bgra(4, 2, [v, v, v, 255]));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let mut worker = ProcessingWorker::start(
            "test-exhaust",
            pipeline(),
            move || frames.next(),
            move |result| {
                let view = result.unwrap();
                seen_clone.lock().unwrap().push(view.to_vec()[0]);
                LoopAction::Continue
            },
        )
        .unwrap();
        worker.join();

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(
            worker.stats(),
            WorkerStats {
                processed: 5,
                failed: 0
            }
        );
    }

    #[test]
    fn test_sink_stop() {
        let mut count = 0;
        let mut worker = ProcessingWorker::start(
            "test-sink-stop",
            pipeline(),
            || Some(OwnedFrame::solid_bgra(4, 2, [0; 4])),
            move |_| {
                count += 1;
                if count == 3 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            },
        )
        .unwrap();
        worker.join();
        assert_eq!(worker.stats().processed, 3);
    }

    #[test]
    fn test_failures_do_not_stop_the_loop() {
        let mut n = 0u32;
        // Every other frame has the wrong size
        let source = move || {
            n += 1;
            (n <= 4).then(|| {
                if n % 2 == 0 {
                    OwnedFrame::solid_bgra(2, 2, [0; 4])
                } else {
                    OwnedFrame::solid_bgra(4, 2, [0; 4])
                }
            })
        };
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = Arc::clone(&errors);

        let mut worker = ProcessingWorker::start("test-failures", pipeline(), source, move |result| {
            if let Err(e) = result {
                errors_clone.lock().unwrap().push(e);
            }
            LoopAction::Continue
        })
        .unwrap();
        worker.join();

        assert_eq!(
            worker.stats(),
            WorkerStats {
                processed: 2,
                failed: 2
            }
        );
        assert!(
            errors
                .lock()
                .unwrap()
                .iter()
                .all(|e| matches!(e, PipelineError::FrameIngestFailure(_)))
        );
    }

    #[test]
    fn test_stop_signal() {
        let mut worker = ProcessingWorker::start(
            "test-stop",
            pipeline(),
            || {
                thread::sleep(Duration::from_millis(5));
                Some(OwnedFrame::solid_bgra(4, 2, [0; 4]))
            },
            |_| LoopAction::Continue,
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(worker.is_running());

        worker.stop();
        assert!(!worker.is_running());
        assert!(worker.stats().processed > 0);
    }

    #[test]
    fn test_pipeline_outlives_worker() {
        let pipeline = pipeline();
        pipeline.set_blur(0.5).unwrap();

        let mut frames = std::iter::once(OwnedFrame::solid_bgra(4, 2, [9; 4]));
        let worker = ProcessingWorker::start(
            "test-shared",
            Arc::clone(&pipeline),
            move || frames.next(),
            |_| LoopAction::Continue,
        )
        .unwrap();
        drop(worker);

        assert!(pipeline.any_effect_active());
        assert_eq!(Arc::strong_count(&pipeline), 1);
    }

    #[test]
    fn test_thread_carries_worker_name() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let names_clone = Arc::clone(&names);
        let mut remaining = 2;

        let mut worker = ProcessingWorker::start(
            "effects-named",
            pipeline(),
            move || {
                let name = thread::current().name().map(str::to_string);
                names_clone.lock().unwrap().push(name);
                remaining -= 1;
                (remaining >= 0).then(|| OwnedFrame::solid_bgra(4, 2, [0; 4]))
            },
            |_| LoopAction::Continue,
        )
        .unwrap();
        worker.join();

        let names = names.lock().unwrap();
        assert!(!names.is_empty());
        assert!(names.iter().all(|n| n.as_deref() == Some("effects-named")));
        assert_ne!(thread::current().name(), Some("effects-named"));
    }
}
