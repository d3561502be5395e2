//! User-visible notifications
//!
//! Only unplayable content, terminal streaming errors and autoplay
//! rejection reach the user; everything else stays in the log.

use log::info;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default display time
pub const DEFAULT_TOAST_DURATION_MS: u64 = 3000;

/// Engine brand name scrubbed from messages
const ENGINE_BRAND: &str = "shaka";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub kind: ToastKind,
    pub duration_ms: u64,
}

/// Active toasts, newest last
#[derive(Debug, Default)]
pub struct ToastStore {
    next_id: AtomicU64,
    toasts: Mutex<Vec<Toast>>,
}

impl ToastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, message: &str, kind: ToastKind) -> u64 {
        self.add_with_duration(message, kind, DEFAULT_TOAST_DURATION_MS)
    }

    pub fn info(&self, message: &str) -> u64 {
        self.add(message, ToastKind::Info)
    }

    pub fn error(&self, message: &str) -> u64 {
        self.add(message, ToastKind::Error)
    }

    pub fn add_with_duration(&self, message: &str, kind: ToastKind, duration_ms: u64) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = scrub_brand(message);
        info!("Toast {} ({:?}): {}", id, kind, message);

        self.toasts.lock().push(Toast {
            id,
            message,
            kind,
            duration_ms,
        });
        id
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut toasts = self.toasts.lock();
        let before = toasts.len();
        toasts.retain(|t| t.id != id);
        toasts.len() != before
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    pub fn clear(&self) {
        self.toasts.lock().clear();
    }
}

/// Remove every case-insensitive occurrence of the engine brand
fn scrub_brand(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    let mut out = String::with_capacity(message.len());
    let mut rest = 0;
    for (start, _) in lower.match_indices(ENGINE_BRAND) {
        out.push_str(&message[rest..start]);
        rest = start + ENGINE_BRAND.len();
    }
    out.push_str(&message[rest..]);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
