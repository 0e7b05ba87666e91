//! Records panics as error events.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eventlog_core::{ErrorInput, ErrorPayload};
use serde_json::json;

use crate::config::FeatureConfig;
use crate::features::{ErrorObserver, FeatureError, FeatureModule, Ingest};

thread_local! {
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// Whether this thread is currently recording a panic.
pub(crate) fn is_capturing() -> bool {
    CAPTURING.with(Cell::get)
}

/// Runs `f` with panic recording switched off on this thread.
///
/// Used around code whose panics are caught and reported by the caller.
/// `f` must not unwind; wrap it in `catch_unwind` first.
pub(crate) fn suppressed<T>(f: impl FnOnce() -> T) -> T {
    let previous = SUPPRESSED.with(|flag| flag.replace(true));
    let result = f();
    SUPPRESSED.with(|flag| flag.set(previous));
    result
}

/// Chains a process-wide panic hook that records each panic, then hands it
/// to the previously installed hook.
///
/// A panic on the thread named `main` is marked fatal. Panics raised while a
/// panic is already being recorded on the same thread, or inside a custom
/// sanitizer, are passed through without recording.
#[derive(Debug, Default)]
pub struct PanicCapture {
    installed: AtomicBool,
}

impl PanicCapture {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

fn panic_payload(info: &PanicHookInfo<'_>) -> ErrorPayload {
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");

    let mut stack = info
        .location()
        .map(|l| format!("at {}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_default();
    let backtrace = Backtrace::capture();
    if backtrace.status() == BacktraceStatus::Captured {
        if !stack.is_empty() {
            stack.push('\n');
        }
        stack.push_str(&backtrace.to_string());
    }

    let mut input = ErrorInput::message(panic_message(info.payload()));
    if !stack.is_empty() {
        input = input.with_stack(stack);
    }
    let context = json!({ "origin": "panic_hook", "thread": thread_name });
    ErrorPayload::new(input, Some(context)).fatal(thread_name == "main")
}

/// Records `info` unless this thread is already recording a panic or has
/// recording suppressed.
fn capture(observer: &dyn ErrorObserver, info: &PanicHookInfo<'_>) {
    if SUPPRESSED.with(Cell::get) || CAPTURING.with(|flag| flag.replace(true)) {
        return;
    }
    if let Err(e) = observer.observe_error(panic_payload(info)) {
        tracing::debug!(error = %e, "panic not recorded");
    }
    CAPTURING.with(|flag| flag.set(false));
}

impl FeatureModule for PanicCapture {
    fn name(&self) -> &'static str {
        "global_errors"
    }

    fn is_enabled(&self, features: &FeatureConfig) -> bool {
        features.global_errors.enabled
    }

    fn install(&self, ingest: Ingest, _features: &FeatureConfig) -> Result<(), FeatureError> {
        if self.installed.swap(true, Ordering::SeqCst) {
            return Err(FeatureError::AlreadyInstalled { name: self.name() });
        }
        if std::thread::panicking() {
            self.installed.store(false, Ordering::SeqCst);
            return Err(FeatureError::Unavailable {
                name: self.name(),
                reason: "cannot replace the panic hook while panicking".to_string(),
            });
        }

        let observer: Arc<dyn ErrorObserver> = Arc::new(ingest);
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            capture(observer.as_ref(), info);
            previous(info);
        }));
        Ok(())
    }
}
