//! Mock construction helpers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncrec_rs::session::PlaybackRenderer;

/// Renderer that remembers every event, shareable with the test thread
#[derive(Clone, Default)]
pub struct CollectingRenderer {
    frames: Arc<Mutex<Vec<usize>>>,
    ticks: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    last_media: Arc<Mutex<Option<Duration>>>,
}

impl CollectingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices passed to `on_frame`, in order
    pub fn frames(&self) -> Vec<usize> {
        self.frames.lock().unwrap().clone()
    }

    pub fn tick_count(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn finished_count(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn last_media_time(&self) -> Option<Duration> {
        *self.last_media.lock().unwrap()
    }

    pub fn boxed(&self) -> Box<dyn PlaybackRenderer> {
        Box::new(self.clone())
    }
}

impl PlaybackRenderer for CollectingRenderer {
    fn on_frame(&mut self, index: usize) {
        self.frames.lock().unwrap().push(index);
    }

    fn on_tick(&mut self, media_time: Duration) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        *self.last_media.lock().unwrap() = Some(media_time);
    }

    fn on_finished(&mut self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}
