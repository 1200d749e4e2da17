use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};

use super::{EstimateDriver, Generation, PitchModel};
use crate::core::analyzer::SampleRing;
use crate::messaging::ControlMessage;

/// Builds a fresh model for each loop; called on the worker thread
pub type ModelFactory = Arc<dyn Fn() -> Box<dyn PitchModel> + Send + Sync>;

const POLL_INTERVAL: Duration = Duration::from_millis(2);

struct Worker {
    generation: Generation,
    rearm: Sender<()>,
    cancel: Arc<AtomicBool>,
}

/// Drives the pitch loop on a background thread, one window per cycle.
/// Estimates are posted to the control bus; the next window is only
/// analysed once the controller calls [`EstimateDriver::advance`].
pub struct ThreadedDriver {
    ring: SampleRing,
    bus: Sender<ControlMessage>,
    factory: ModelFactory,
    window_size: usize,
    hop_size: usize,
    worker: Option<Worker>,
}

impl ThreadedDriver {
    pub fn new(
        ring: SampleRing,
        bus: Sender<ControlMessage>,
        factory: ModelFactory,
        window_size: usize,
        hop_size: usize,
    ) -> Self {
        Self {
            ring,
            bus,
            factory,
            window_size,
            hop_size: hop_size.max(1),
            worker: None,
        }
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.store(true, Ordering::SeqCst);
            // dropping `rearm` wakes a worker blocked waiting for it
            debug!("pitch loop {} stopped", worker.generation);
        }
    }
}

impl EstimateDriver for ThreadedDriver {
    fn start(&mut self, generation: Generation) {
        self.shutdown();

        let (rearm_tx, rearm_rx) = bounded(1);
        let cancel = Arc::new(AtomicBool::new(false));
        let context = LoopContext {
            generation,
            // only audio arriving after this point is analysed
            start_at: self.ring.total_written(),
            ring: self.ring.clone(),
            bus: self.bus.clone(),
            factory: Arc::clone(&self.factory),
            window_size: self.window_size,
            hop_size: self.hop_size,
            rearm: rearm_rx,
            cancel: Arc::clone(&cancel),
        };

        let spawned = thread::Builder::new()
            .name(format!("pitch-loop-{}", generation.0))
            .spawn(move || context.run());

        match spawned {
            Ok(_) => {
                self.worker = Some(Worker { generation, rearm: rearm_tx, cancel });
            },
            Err(err) => warn!("could not spawn pitch loop {}: {}", generation, err),
        }
    }

    fn advance(&mut self, generation: Generation) {
        if let Some(worker) = &self.worker {
            if worker.generation == generation {
                let _ = worker.rearm.try_send(());
            }
        }
    }

    fn stop(&mut self, generation: Generation) {
        if self.worker.as_ref().map(|w| w.generation) == Some(generation) {
            self.shutdown();
        }
    }
}

impl Drop for ThreadedDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct LoopContext {
    generation: Generation,
    start_at: u64,
    ring: SampleRing,
    bus: Sender<ControlMessage>,
    factory: ModelFactory,
    window_size: usize,
    hop_size: usize,
    rearm: Receiver<()>,
    cancel: Arc<AtomicBool>,
}

impl LoopContext {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Block until `needed` new samples have arrived. False when cancelled.
    fn wait_for_samples(&self, last_seen: &mut u64, needed: usize) -> bool {
        loop {
            if self.cancelled() {
                return false;
            }
            let total = self.ring.total_written();
            if total < *last_seen {
                // ring was cleared by a device change
                *last_seen = 0;
            }
            if total - *last_seen >= needed as u64 {
                return true;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn run(self) {
        let mut model = (self.factory)();
        info!("pitch model loaded for loop {}", self.generation);

        let mut window = vec![0.0f32; self.window_size];
        let mut last_seen = self.start_at;
        // the first window must be entirely fresh audio
        let mut needed = self.window_size.max(self.hop_size);

        loop {
            if !self.wait_for_samples(&mut last_seen, needed) {
                return;
            }
            needed = self.hop_size;
            last_seen = self.ring.snapshot(&mut window);

            let result = model.estimate(&window, self.ring.sample_rate());
            if self.cancelled() {
                return;
            }
            let message = ControlMessage::Estimate { generation: self.generation, result };
            if self.bus.send(message).is_err() {
                return;
            }
            // one estimate in flight: wait for the controller before the next cycle
            if self.rearm.recv().is_err() {
                return;
            }
        }
    }
}
