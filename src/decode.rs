// ============================================================================
// ASYNC IMAGE DECODING — rayon jobs, results polled on the editor thread
// ============================================================================
//
// Each request gets a generation number.  A layer id only ever accepts the
// result of its most recent request; anything older is dropped on arrival,
// so a slow decode can never overwrite a newer one.
// ============================================================================

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;

use image::RgbaImage;

use crate::io::decode_source;
use crate::layer::{ImageSource, LayerContent, LayerId, LayerStack};
use crate::{log_info, log_warn};

#[derive(Clone, Debug, PartialEq)]
pub enum DecodeState {
    Pending,
    Ready(Arc<RgbaImage>),
    Failed(String),
}

/// Result delivered from a background decode job.
struct DecodeResult {
    id: LayerId,
    generation: u64,
    result: Result<RgbaImage, String>,
}

struct Entry {
    generation: u64,
    source: ImageSource,
    state: DecodeState,
}

pub struct ImageCache {
    entries: HashMap<LayerId, Entry>,
    sender: mpsc::Sender<DecodeResult>,
    receiver: mpsc::Receiver<DecodeResult>,
    next_generation: u64,
    /// Jobs spawned whose result has not been received yet (stale ones included).
    in_flight: usize,
}

impl Default for ImageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCache {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            entries: HashMap::new(),
            sender,
            receiver,
            next_generation: 1,
            in_flight: 0,
        }
    }

    /// Ensure `id` holds (or is decoding) `source`.  A changed source starts a
    /// new decode that supersedes whatever was in flight for that id.
    pub fn request(&mut self, id: &LayerId, source: &ImageSource) {
        if let Some(entry) = self.entries.get(id)
            && &entry.source == source
        {
            return;
        }

        let generation = self.next_generation;
        self.next_generation += 1;

        if let ImageSource::Raster(img) = source {
            self.entries.insert(
                id.clone(),
                Entry { generation, source: source.clone(), state: DecodeState::Ready(img.clone()) },
            );
            return;
        }

        self.entries.insert(
            id.clone(),
            Entry { generation, source: source.clone(), state: DecodeState::Pending },
        );
        self.in_flight += 1;

        let sender = self.sender.clone();
        let job_id = id.clone();
        let job_source = source.clone();
        rayon::spawn(move || {
            let result = match catch_unwind(AssertUnwindSafe(|| decode_source(&job_source))) {
                Ok(decoded) => decoded.map_err(|e| e.to_string()),
                Err(_) => Err("decoder panicked".to_string()),
            };
            let _ = sender.send(DecodeResult { id: job_id, generation, result });
        });
    }

    /// Request every image layer in `stack` and forget ids no longer present.
    pub fn sync(&mut self, stack: &LayerStack) {
        for layer in stack.iter() {
            if let LayerContent::Image(payload) = &layer.content {
                self.request(&layer.id, &payload.source);
            }
        }
        self.entries.retain(|id, _| stack.position(id).is_some());
    }

    /// Install finished decodes without blocking.  Returns how many results
    /// changed a layer's state.
    pub fn poll(&mut self) -> usize {
        let mut installed = 0;
        while let Ok(result) = self.receiver.try_recv() {
            if self.install(result) {
                installed += 1;
            }
        }
        installed
    }

    /// Block until every outstanding decode has reported back.
    pub fn wait(&mut self) -> usize {
        let mut installed = self.poll();
        while self.in_flight > 0 {
            match self.receiver.recv() {
                Ok(result) => {
                    if self.install(result) {
                        installed += 1;
                    }
                }
                Err(_) => break,
            }
        }
        installed
    }

    fn install(&mut self, result: DecodeResult) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let Some(entry) = self.entries.get_mut(&result.id) else {
            return false;
        };
        if entry.generation != result.generation {
            log_info!(
                "Discarding stale decode for layer {} (generation {} < {})",
                result.id, result.generation, entry.generation
            );
            return false;
        }
        entry.state = match result.result {
            Ok(img) => DecodeState::Ready(Arc::new(img)),
            Err(reason) => {
                log_warn!("Layer {}: image decode failed: {}", result.id, reason);
                DecodeState::Failed(reason)
            }
        };
        true
    }

    pub fn state(&self, id: &LayerId) -> Option<&DecodeState> {
        self.entries.get(id).map(|e| &e.state)
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }
}
