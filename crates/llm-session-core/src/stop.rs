use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Session-scoped cooperative stop flag.
///
/// Clones share the same flag, so a clone handed to another thread can
/// request a stop that the generation loop observes before its next step.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::StopSignal;

    #[test]
    fn clones_share_the_flag() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        assert!(!signal.is_requested());

        remote.request();
        assert!(signal.is_requested());

        signal.reset();
        assert!(!remote.is_requested());
    }

    #[test]
    fn request_is_visible_across_threads() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        std::thread::spawn(move || remote.request())
            .join()
            .expect("thread should finish");
        assert!(signal.is_requested());
    }
}
