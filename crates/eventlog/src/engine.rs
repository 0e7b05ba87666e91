//! The event log engine.
//!
//! [`EventLog`] is a cheap `Clone` handle over shared internals. All mutable
//! state lives in one slot behind a `std::sync::Mutex`; the slot is replaced
//! piecewise with new immutable values (ring buffer, session, context) and the
//! lock is never held across an `.await` or while the custom sanitizer runs.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use eventlog_core::{
    ActionPayload, Clock, ErrorInput, ErrorPayload, Event, EventCategory, EventContext,
    EventQuery, ExportMode, LogLevel, LogPayload, NetworkEventPayload, RingBuffer, ScreenPayload,
    Session, SystemClock, export_jsonl, query_events, sanitize_event, to_payload,
};
use eventlog_store::{MemoryStore, StorageAdapter};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::config::{ConfigOverrides, EventLogConfig};
use crate::device::{DeviceInfoProvider, PlatformInfo};
use crate::error::EventLogError;
use crate::features::{FeatureModule, Ingest};
use crate::network::NetworkRecorder;
use crate::panic_capture::{self, PanicCapture, panic_message};
use crate::persist::Persistence;
use crate::scheduler::{Debouncer, Scheduler, TokioScheduler, lock};

/// A custom transform applied to every event after mandatory sanitization.
pub type Sanitizer = Arc<dyn Fn(Event) -> Event + Send + Sync>;

/// A logging call made before the engine was ready.
#[derive(Debug)]
struct QueuedEvent {
    category: EventCategory,
    payload: Value,
}

#[derive(Debug)]
struct State {
    session: Session,
    buffer: RingBuffer,
    context: EventContext,
}

#[derive(Debug)]
enum Phase {
    Pending(VecDeque<QueuedEvent>),
    Ready(State),
}

pub(crate) struct Inner {
    config: Mutex<EventLogConfig>,
    persistence: Persistence,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    sanitizer: Option<Sanitizer>,
    device_info: Arc<dyn DeviceInfoProvider>,
    network: NetworkRecorder,
    modules: Vec<Arc<dyn FeatureModule>>,
    init: OnceCell<Result<(), EventLogError>>,
    debouncer: OnceLock<Debouncer>,
    phase: Mutex<Phase>,
}

impl Inner {
    /// Runs `f` against the ready state.
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, EventLogError> {
        match &mut *lock(&self.phase) {
            Phase::Ready(state) => Ok(f(state)),
            Phase::Pending(_) => Err(EventLogError::NotInitialized),
        }
    }

    fn events(&self) -> Result<Vec<Arc<Event>>, EventLogError> {
        self.with_state(|state| state.buffer.to_vec())
    }

    async fn save_events(&self) {
        let Ok(events) = self.events() else { return };
        if let Err(e) = self.persistence.save_events(&events).await {
            tracing::warn!(error = %e, "failed to save events");
        }
    }

    async fn save_session(&self) {
        let Ok(session) = self.with_state(|state| state.session.clone()) else {
            return;
        };
        if let Err(e) = self.persistence.save_session(&session).await {
            tracing::warn!(error = %e, "failed to save session");
        }
    }
}

/// Client-side event log with bounded retention and debounced persistence.
///
/// # Lifecycle
///
/// A new instance is uninitialized. Logging calls made before [`init`]
/// completes are queued (up to `max_events`, oldest dropped first) and
/// replayed once the engine is ready. Reads such as [`get_events`] and
/// [`export`] return [`EventLogError::NotInitialized`] until then.
///
/// [`init`]: EventLog::init
/// [`get_events`]: EventLog::get_events
/// [`export`]: EventLog::export
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EventLog {
    pub fn builder() -> EventLogBuilder {
        EventLogBuilder::default()
    }

    /// Creates an engine with `config` and in-memory storage.
    pub fn new(config: EventLogConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub(crate) const fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Loads persisted state and makes the engine ready.
    ///
    /// `overrides` are merged into the configuration first. Concurrent callers
    /// share one initialization, and its outcome (success or failure) is
    /// returned to every later caller as well. Overrides passed once the
    /// engine is ready are recorded but do not reconfigure it.
    pub async fn init(&self, overrides: Option<ConfigOverrides>) -> Result<(), EventLogError> {
        if let Some(overrides) = overrides {
            let mut config = lock(&self.inner.config);
            *config = config.merged(&overrides)?;
        }

        self.inner
            .init
            .get_or_init(|| self.initialize())
            .await
            .clone()
    }

    async fn initialize(&self) -> Result<(), EventLogError> {
        let config = lock(&self.inner.config).clone();
        let capacity = config.capacity()?;
        let now = self.inner.clock.now_millis();

        let persisted = self.inner.persistence.load_session().await;
        let session = Session::resume_or_create(persisted, now, config.session_timeout_ms());

        let max_age = config.max_age_ms();
        let buffer = self
            .inner
            .persistence
            .load_events()
            .await
            .into_iter()
            .filter(|event| now.saturating_sub(event.timestamp) < max_age)
            .fold(RingBuffer::new(capacity), |buffer, event| buffer.push(event));

        let context = match self.inner.device_info.device_info() {
            Ok(info) => EventContext::new().with_device_info(info),
            Err(e) => {
                tracing::warn!(error = %e, "device info unavailable");
                EventContext::new()
            }
        };

        if let Err(e) = self.inner.persistence.save_session(&session).await {
            tracing::warn!(error = %e, "failed to save session");
        }

        self.inner.scheduler.bind();
        let _ = self.inner.debouncer.set(Debouncer::new(
            Arc::clone(&self.inner.scheduler),
            config.batch_write_delay(),
        ));

        tracing::info!(
            session_id = %session.session_id,
            start_type = %session.start_type.as_str(),
            restored = buffer.len(),
            "event log ready"
        );

        let queued = {
            let mut phase = lock(&self.inner.phase);
            let ready = Phase::Ready(State {
                session,
                buffer,
                context,
            });
            match std::mem::replace(&mut *phase, ready) {
                Phase::Pending(queued) => queued,
                Phase::Ready(_) => VecDeque::new(),
            }
        };

        if !queued.is_empty() {
            tracing::debug!(count = queued.len(), "flushing events logged before init");
        }
        for QueuedEvent { category, payload } in queued {
            if let Err(e) = self.record(category, payload) {
                tracing::warn!(error = %e, %category, "failed to record queued event");
            }
        }

        self.install_features(&config);
        Ok(())
    }

    fn install_features(&self, config: &EventLogConfig) {
        for module in &self.inner.modules {
            if !module.is_enabled(&config.features) {
                tracing::debug!(module = module.name(), "feature disabled");
                continue;
            }
            match module.install(self.ingest(), &config.features) {
                Ok(()) => tracing::debug!(module = module.name(), "feature installed"),
                Err(e) => tracing::warn!(error = %e, module = module.name(), "feature not installed"),
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*lock(&self.inner.phase), Phase::Ready(_))
    }

    /// Records a screen view.
    pub fn screen(&self, name: impl Into<String>, params: Option<Value>) -> Result<(), EventLogError> {
        let payload = to_payload(&ScreenPayload::new(name, params))?;
        self.record(EventCategory::Screen, payload)
    }

    /// Records a user action.
    pub fn action(&self, name: impl Into<String>, data: Option<Value>) -> Result<(), EventLogError> {
        let payload = to_payload(&ActionPayload::new(name, data))?;
        self.record(EventCategory::Action, payload)
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Result<(), EventLogError> {
        let payload = to_payload(&LogPayload::new(level, message, data))?;
        self.record(EventCategory::Log, payload)
    }

    /// Records an error.
    ///
    /// Accepts anything convertible to [`ErrorInput`]: strings, JSON values,
    /// or `ErrorInput::from_error(&err)` for a Rust error and its sources.
    pub fn error(
        &self,
        error: impl Into<ErrorInput>,
        context: Option<Value>,
    ) -> Result<(), EventLogError> {
        self.record_error(ErrorPayload::new(error, context))
    }

    pub(crate) fn record_error(&self, payload: ErrorPayload) -> Result<(), EventLogError> {
        let payload = to_payload(&payload)?;
        self.record(EventCategory::Error, payload)
    }

    pub fn network(&self, payload: NetworkEventPayload) -> Result<(), EventLogError> {
        let payload = to_payload(&payload)?;
        self.record(EventCategory::Network, payload)
    }

    /// The logging pipeline shared by every category.
    ///
    /// The event is built and sanitized from a snapshot of the session and
    /// context so the sanitizer runs without the state lock. The sequence
    /// number is stamped, the event pushed and the session advanced in one
    /// locked step, so buffer order matches sequence order across threads and
    /// a rejected event leaves the session untouched.
    fn record(&self, category: EventCategory, payload: Value) -> Result<(), EventLogError> {
        let now = self.inner.clock.now_millis();
        let (session, context) = {
            let mut phase = lock(&self.inner.phase);
            match &mut *phase {
                Phase::Pending(queue) => {
                    let limit = lock(&self.inner.config).max_events.max(1);
                    while queue.len() >= limit {
                        queue.pop_front();
                    }
                    queue.push_back(QueuedEvent { category, payload });
                    return Ok(());
                }
                Phase::Ready(state) => (state.session.clone(), state.context.clone()),
            }
        };

        let event = Event::create(&session, &context, category, payload, &*self.inner.clock);
        let mut event = self.sanitize(event)?;

        self.inner.with_state(|state| {
            event.seq = state.session.seq;
            state.buffer = state.buffer.push(event);
            state.session = state.session.incremented().with_activity(now);
        })?;
        self.schedule_persist();
        Ok(())
    }

    fn sanitize(&self, event: Event) -> Result<Event, EventLogError> {
        let event = sanitize_event(&event)?;
        let Some(hook) = &self.inner.sanitizer else {
            return Ok(event);
        };
        // A second panic inside a panic hook aborts the process.
        if panic_capture::is_capturing() {
            return Ok(event);
        }
        let customized =
            panic_capture::suppressed(|| panic::catch_unwind(AssertUnwindSafe(|| hook(event))))
                .map_err(|payload| EventLogError::Sanitizer(panic_message(payload.as_ref())))?;
        Ok(sanitize_event(&customized)?)
    }

    /// Debounces a full events write and schedules an immediate session write.
    fn schedule_persist(&self) {
        if let Some(debouncer) = self.inner.debouncer.get() {
            let weak = Arc::downgrade(&self.inner);
            debouncer.call(Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.save_events().await;
                }
            }));
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.schedule(
            Duration::ZERO,
            Box::pin(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.save_session().await;
                }
            }),
        );
    }

    /// Replaces the `user` context attribute. No-op before init.
    pub fn set_user(&self, user: Map<String, Value>) {
        self.update_context(|context| context.with_user(user));
    }

    /// Sets one context attribute. No-op before init.
    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        self.update_context(|context| context.with_entry(key, value));
    }

    /// Replaces the `deviceInfo` context attribute. No-op before init.
    pub fn set_device_info(&self, info: Map<String, Value>) {
        self.update_context(|context| context.with_device_info(info));
    }

    fn update_context(&self, f: impl FnOnce(&EventContext) -> EventContext) {
        if self
            .inner
            .with_state(|state| state.context = f(&state.context))
            .is_err()
        {
            tracing::debug!("context update ignored before init");
        }
    }

    /// Writes the buffer to storage, then renders it as JSONL.
    pub async fn export(&self, mode: ExportMode) -> Result<String, EventLogError> {
        let events = self.inner.events()?;
        if let Err(e) = self.inner.persistence.save_events(&events).await {
            tracing::warn!(error = %e, "failed to save events before export");
        }
        Ok(export_jsonl(&events, mode)?)
    }

    /// Drops every retained event and the context, and deletes the persisted
    /// events record. The session is kept.
    pub async fn clear(&self) -> Result<(), EventLogError> {
        self.inner.with_state(|state| {
            state.buffer = state.buffer.cleared();
            state.context = EventContext::new();
        })?;
        if let Some(debouncer) = self.inner.debouncer.get() {
            debouncer.cancel();
        }
        self.inner.persistence.remove_events().await?;
        tracing::info!("event log cleared");
        Ok(())
    }

    /// Retained events, oldest first.
    pub fn get_events(&self) -> Result<Vec<Arc<Event>>, EventLogError> {
        self.inner.events()
    }

    pub fn query(&self, query: &EventQuery) -> Result<Vec<Arc<Event>>, EventLogError> {
        let events = self.inner.events()?;
        Ok(query_events(&events, query))
    }

    /// Cancels the pending debounced write and persists both records now.
    ///
    /// Unlike background writes, failures are returned.
    pub async fn flush(&self) -> Result<(), EventLogError> {
        let (events, session) = self
            .inner
            .with_state(|state| (state.buffer.to_vec(), state.session.clone()))?;
        if let Some(debouncer) = self.inner.debouncer.get() {
            debouncer.cancel();
        }
        self.inner.persistence.save_events(&events).await?;
        self.inner.persistence.save_session(&session).await?;
        Ok(())
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Result<Session, EventLogError> {
        self.inner.with_state(|state| state.session.clone())
    }

    /// Recording handle for feature modules.
    pub fn ingest(&self) -> Ingest {
        Ingest::new(&self.inner)
    }

    /// The built-in network capture module.
    pub fn network_recorder(&self) -> NetworkRecorder {
        self.inner.network.clone()
    }
}

/// Assembles an [`EventLog`] with its collaborators.
pub struct EventLogBuilder {
    config: EventLogConfig,
    storage: Option<Arc<dyn StorageAdapter>>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
    sanitizer: Option<Sanitizer>,
    device_info: Arc<dyn DeviceInfoProvider>,
    modules: Vec<Arc<dyn FeatureModule>>,
}

impl fmt::Debug for EventLogBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLogBuilder")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("scheduler", &self.scheduler)
            .field("sanitizer", &self.sanitizer.is_some())
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}

impl Default for EventLogBuilder {
    fn default() -> Self {
        Self {
            config: EventLogConfig::default(),
            storage: None,
            clock: Arc::new(SystemClock),
            scheduler: Arc::new(TokioScheduler::new()),
            sanitizer: None,
            device_info: Arc::new(PlatformInfo),
            modules: Vec::new(),
        }
    }
}

impl EventLogBuilder {
    #[must_use]
    pub fn config(mut self, config: EventLogConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage backend. Defaults to a [`MemoryStore`].
    #[must_use]
    pub fn storage(mut self, storage: impl StorageAdapter + 'static) -> Self {
        self.storage = Some(Arc::new(storage));
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Custom transform run after mandatory sanitization.
    ///
    /// Its output is sanitized again, so it cannot reintroduce redacted values.
    #[must_use]
    pub fn sanitizer(mut self, sanitizer: impl Fn(Event) -> Event + Send + Sync + 'static) -> Self {
        self.sanitizer = Some(Arc::new(sanitizer));
        self
    }

    #[must_use]
    pub fn device_info(mut self, provider: impl DeviceInfoProvider + 'static) -> Self {
        self.device_info = Arc::new(provider);
        self
    }

    /// Adds a feature module alongside the built-in network and panic capture.
    #[must_use]
    pub fn module(mut self, module: impl FeatureModule + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    pub fn build(self) -> EventLog {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let network = NetworkRecorder::new();

        let mut modules: Vec<Arc<dyn FeatureModule>> = vec![
            Arc::new(network.clone()),
            Arc::new(PanicCapture::new()),
        ];
        modules.extend(self.modules);

        EventLog::from_inner(Arc::new(Inner {
            config: Mutex::new(self.config),
            persistence: Persistence::new(storage),
            clock: self.clock,
            scheduler: self.scheduler,
            sanitizer: self.sanitizer,
            device_info: self.device_info,
            network,
            modules,
            init: OnceCell::new(),
            debouncer: OnceLock::new(),
            phase: Mutex::new(Phase::Pending(VecDeque::new())),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use eventlog_core::sanitize::REDACTED;
    use eventlog_core::{ManualClock, StartType};
    use eventlog_store::StoreError;
    use serde_json::json;

    use super::*;
    use crate::config::FeatureConfig;
    use crate::device::StaticDeviceInfo;
    use crate::features::FeatureError;
    use crate::network::HttpExchange;
    use crate::persist::{EVENTS_KEY, SESSION_KEY};
    use crate::scheduler::ManualScheduler;

    const T0: i64 = 1_738_152_000_000;
    const MINUTE: i64 = 60 * 1000;

    struct Harness {
        log: EventLog,
        store: Arc<MemoryStore>,
        clock: ManualClock,
        scheduler: ManualScheduler,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_store(Arc::new(MemoryStore::new()))
        }

        fn with_store(store: Arc<MemoryStore>) -> Self {
            Self::build(store, |b| b)
        }

        fn build(
            store: Arc<MemoryStore>,
            customize: impl FnOnce(EventLogBuilder) -> EventLogBuilder,
        ) -> Self {
            let clock = ManualClock::new(T0).with_timezone("Europe/Berlin");
            let scheduler = ManualScheduler::new();
            let builder = EventLog::builder()
                .storage(Arc::clone(&store))
                .clock(clock.clone())
                .scheduler(scheduler.clone())
                .device_info(StaticDeviceInfo(Map::new()));
            let log = customize(builder).build();
            Self {
                log,
                store,
                clock,
                scheduler,
            }
        }

        async fn init(&self) {
            self.log
                .init(Some(ConfigOverrides::new().global_errors_enabled(false)))
                .await
                .unwrap();
        }

        fn persisted_events(&self) -> Vec<Event> {
            self.store
                .peek(EVENTS_KEY)
                .map(|raw| serde_json::from_str(&raw).unwrap())
                .unwrap_or_default()
        }

        fn persisted_session(&self) -> Option<Session> {
            self.store
                .peek(SESSION_KEY)
                .map(|raw| serde_json::from_str(&raw).unwrap())
        }
    }

    fn payloads(events: &[Arc<Event>]) -> Vec<Value> {
        events.iter().map(|e| e.payload.clone()).collect()
    }

    #[tokio::test]
    async fn fresh_init_then_screen_exports_one_line() {
        let h = Harness::new();
        h.init().await;

        assert!(h.log.is_ready());
        assert!(h.log.get_events().unwrap().is_empty());

        h.log.screen("Home", None).unwrap();
        let jsonl = h.log.export(ExportMode::Full).await.unwrap();

        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 1);
        let line: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(line["category"], json!("screen"));
        assert_eq!(line["payload"], json!({"name": "Home"}));
        assert_eq!(line["timezone"], json!("Europe/Berlin"));
        assert_eq!(line["timestampISO"], json!("2025-01-29T12:00:00.000Z"));
    }

    #[tokio::test]
    async fn exported_line_shape_is_stable() {
        let h = Harness::new();
        h.init().await;
        h.log
            .action("checkout", Some(json!({"items": 2, "token": "t"})))
            .unwrap();

        let event = &h.log.get_events().unwrap()[0];
        let mut line: Value = serde_json::to_value(event.as_ref()).unwrap();
        line["eventId"] = json!("[event-id]");
        line["sessionId"] = json!("[session-id]");
        insta::assert_snapshot!(serde_json::to_string(&line).unwrap(), @r#"{"category":"action","context":{"deviceInfo":{}},"eventId":"[event-id]","payload":{"data":{"items":2,"token":"***REDACTED***"},"name":"checkout"},"seq":0,"sessionId":"[session-id]","timestamp":1738152000000,"timestampISO":"2025-01-29T12:00:00.000Z","timezone":"Europe/Berlin"}"#);
    }

    #[tokio::test]
    async fn reads_before_init_are_rejected() {
        let h = Harness::new();

        assert!(!h.log.is_ready());
        assert_eq!(h.log.get_events(), Err(EventLogError::NotInitialized));
        assert_eq!(
            h.log.query(&EventQuery::new()),
            Err(EventLogError::NotInitialized)
        );
        assert_eq!(h.log.session(), Err(EventLogError::NotInitialized));
        assert_eq!(
            h.log.export(ExportMode::Full).await,
            Err(EventLogError::NotInitialized)
        );
        assert_eq!(h.log.clear().await, Err(EventLogError::NotInitialized));
        assert_eq!(h.log.flush().await, Err(EventLogError::NotInitialized));
    }

    #[tokio::test]
    async fn logging_before_init_is_replayed_in_order() {
        let h = Harness::new();
        h.log.screen("Splash", None).unwrap();
        h.log.log(LogLevel::Info, "booting", None).unwrap();
        h.log.set_user(Map::new());

        h.init().await;

        let events = h.log.get_events().unwrap();
        assert_eq!(
            payloads(&events),
            vec![
                json!({"name": "Splash"}),
                json!({"level": "info", "message": "booting"}),
            ]
        );
        assert_eq!(events[0].seq, 0);
        assert_eq!(events[1].seq, 1);
        assert!(events[0].context.user().is_none());
    }

    #[tokio::test]
    async fn pre_init_queue_keeps_the_newest_entries() {
        let h = Harness::build(Arc::new(MemoryStore::new()), |b| {
            b.config(EventLogConfig {
                max_events: 3,
                ..EventLogConfig::default()
            })
        });
        for i in 0..5 {
            h.log.action(format!("a{i}"), None).unwrap();
        }
        h.init().await;

        let names: Vec<Value> = h
            .log
            .get_events()
            .unwrap()
            .iter()
            .map(|e| e.payload["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("a2"), json!("a3"), json!("a4")]);
    }

    #[tokio::test]
    async fn concurrent_init_calls_share_one_outcome() {
        let h = Harness::new();
        let overrides = ConfigOverrides::new().global_errors_enabled(false);
        let (a, b) = tokio::join!(
            h.log.init(Some(overrides.clone())),
            h.log.init(Some(overrides))
        );
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert!(h.log.init(None).await.is_ok());
        assert!(h.log.is_ready());
    }

    #[tokio::test]
    async fn failed_init_is_remembered() {
        let h = Harness::new();
        let first = h.log.init(Some(ConfigOverrides::new().max_events(0))).await;
        assert!(matches!(first, Err(EventLogError::InvalidConfig { .. })));

        let second = h.log.init(Some(ConfigOverrides::new().max_events(10))).await;
        assert_eq!(second, first);
        assert!(!h.log.is_ready());
    }

    #[tokio::test]
    async fn events_carry_session_sequence_numbers() {
        let h = Harness::new();
        h.init().await;

        h.log.screen("A", None).unwrap();
        h.clock.advance(5);
        h.log.screen("B", None).unwrap();
        h.log.screen("C", None).unwrap();

        let seqs: Vec<u64> = h.log.get_events().unwrap().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        let session = h.log.session().unwrap();
        assert_eq!(session.seq, 3);
        assert_eq!(session.last_activity_time, T0 + 5);
        assert_eq!(session.start_type, StartType::Cold);
    }

    #[tokio::test]
    async fn restart_within_timeout_resumes_warm_with_events() {
        let store = Arc::new(MemoryStore::new());
        let first = Harness::with_store(Arc::clone(&store));
        first.init().await;
        first.log.screen("Home", None).unwrap();
        first.log.flush().await.unwrap();
        let original = first.log.session().unwrap();

        let second = Harness::with_store(store);
        second.clock.set(T0 + 29 * MINUTE);
        second.init().await;

        let resumed = second.log.session().unwrap();
        assert_eq!(resumed.session_id, original.session_id);
        assert_eq!(resumed.start_type, StartType::Warm);
        assert_eq!(resumed.seq, 1);
        assert_eq!(second.log.get_events().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn restart_at_timeout_boundary_starts_cold() {
        let store = Arc::new(MemoryStore::new());
        let first = Harness::with_store(Arc::clone(&store));
        first.init().await;
        first.log.screen("Home", None).unwrap();
        first.log.flush().await.unwrap();
        let original = first.log.session().unwrap();

        let second = Harness::with_store(store);
        second.clock.set(T0 + 30 * MINUTE);
        second.init().await;

        let fresh = second.log.session().unwrap();
        assert_ne!(fresh.session_id, original.session_id);
        assert_eq!(fresh.start_type, StartType::Cold);
        assert_eq!(fresh.seq, 0);
        assert_eq!(second.persisted_session(), Some(fresh));
    }

    #[tokio::test]
    async fn events_older_than_max_age_are_not_restored() {
        let store = Arc::new(MemoryStore::new());
        let first = Harness::with_store(Arc::clone(&store));
        first.init().await;
        first.log.screen("Old", None).unwrap();
        first.clock.advance(2 * 24 * 60 * MINUTE);
        first.log.screen("Recent", None).unwrap();
        first.log.flush().await.unwrap();

        let second = Harness::with_store(store);
        second.clock.set(T0 + 7 * 24 * 60 * MINUTE);
        second.init().await;

        assert_eq!(
            payloads(&second.log.get_events().unwrap()),
            vec![json!({"name": "Recent"})]
        );
    }

    #[tokio::test]
    async fn restored_events_are_capped_to_capacity() {
        let store = Arc::new(MemoryStore::new());
        let first = Harness::with_store(Arc::clone(&store));
        first.init().await;
        for i in 0..5 {
            first.log.action(format!("a{i}"), None).unwrap();
        }
        first.log.flush().await.unwrap();

        let second = Harness::with_store(store);
        second
            .log
            .init(Some(
                ConfigOverrides::new()
                    .max_events(2)
                    .global_errors_enabled(false),
            ))
            .await
            .unwrap();

        let events = second.log.get_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload["name"], json!("a4"));
    }

    #[tokio::test]
    async fn bursts_are_persisted_once_after_the_quiet_period() {
        let h = Harness::new();
        h.init().await;
        h.scheduler.run_due().await;

        for i in 0..3 {
            h.log.action(format!("a{i}"), None).unwrap();
        }
        h.scheduler.run_due().await;
        assert!(h.persisted_events().is_empty());
        assert_eq!(h.persisted_session().unwrap().seq, 3);

        h.scheduler.advance(Duration::from_millis(99)).await;
        assert!(h.persisted_events().is_empty());

        h.scheduler.advance(Duration::from_millis(1)).await;
        assert_eq!(h.persisted_events().len(), 3);
        assert_eq!(h.scheduler.pending(), 0);
    }

    #[tokio::test]
    async fn sensitive_fields_are_redacted() {
        let h = Harness::new();
        h.init().await;
        h.log.set_context("apiKey", json!("k-123"));
        h.log
            .log(
                LogLevel::Debug,
                "login",
                Some(json!({"token": "abc", "nested": {"password": "x", "name": "n"}})),
            )
            .unwrap();

        let event = &h.log.get_events().unwrap()[0];
        assert_eq!(
            event.payload["data"],
            json!({"token": REDACTED, "nested": {"password": REDACTED, "name": "n"}})
        );
        assert_eq!(event.context.get("apiKey"), Some(&json!(REDACTED)));
    }

    #[tokio::test]
    async fn custom_sanitizer_cannot_unredact() {
        let h = Harness::build(Arc::new(MemoryStore::new()), |b| {
            b.sanitizer(|event| {
                let mut payload = event.payload.clone();
                payload["extra"] = json!("added");
                payload["data"]["secret"] = json!("leaked");
                event.with_payload(payload)
            })
        });
        h.init().await;
        h.log.action("go", Some(json!({"secret": "s"}))).unwrap();

        let event = &h.log.get_events().unwrap()[0];
        assert_eq!(event.payload["extra"], json!("added"));
        assert_eq!(event.payload["data"]["secret"], json!(REDACTED));
    }

    #[tokio::test]
    async fn panicking_sanitizer_is_reported() {
        let h = Harness::build(Arc::new(MemoryStore::new()), |b| {
            b.sanitizer(|event| {
                if event.payload["name"] == json!("bad") {
                    panic!("sanitizer exploded");
                }
                event
            })
        });
        h.init().await;

        h.clock.advance(10);
        assert_eq!(
            h.log.screen("bad", None),
            Err(EventLogError::Sanitizer("sanitizer exploded".into()))
        );
        let session = h.log.session().unwrap();
        assert_eq!(session.seq, 0);
        assert_eq!(session.last_activity_time, T0);

        h.log.screen("good", None).unwrap();

        let events = h.log.get_events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 0);
        assert_eq!(h.log.session().unwrap().seq, 1);
    }

    #[tokio::test]
    async fn panicking_sanitizer_with_panic_capture_enabled() {
        let h = Harness::build(Arc::new(MemoryStore::new()), |b| {
            b.sanitizer(|_| panic!("hook always fails"))
        });
        h.log.init(None).await.unwrap();

        assert_eq!(
            h.log.screen("Home", None),
            Err(EventLogError::Sanitizer("hook always fails".into()))
        );
        let events = h.log.get_events().unwrap();
        assert!(
            events
                .iter()
                .all(|e| e.payload["message"] != json!("hook always fails"))
        );

        // Panics recorded from the panic hook skip the custom sanitizer.
        let result = std::thread::Builder::new()
            .name("worker".into())
            .spawn(|| panic!("worker failed under a broken sanitizer"))
            .unwrap()
            .join();
        assert!(result.is_err());

        let recorded = h.log.get_events().unwrap();
        let panic_event = recorded
            .iter()
            .find(|e| e.payload["message"] == json!("worker failed under a broken sanitizer"))
            .unwrap();
        assert_eq!(panic_event.category, EventCategory::Error);
    }

    #[tokio::test]
    async fn buffer_order_follows_sequence_across_threads() {
        use std::sync::Barrier;

        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let h = {
            let entered = Arc::clone(&entered);
            let release = Arc::clone(&release);
            Harness::build(Arc::new(MemoryStore::new()), move |b| {
                b.sanitizer(move |event| {
                    if event.payload["name"] == json!("slow") {
                        entered.wait();
                        release.wait();
                    }
                    event
                })
            })
        };
        h.init().await;

        let slow = {
            let log = h.log.clone();
            std::thread::spawn(move || log.screen("slow", None))
        };
        entered.wait();
        h.log.screen("fast", None).unwrap();
        release.wait();
        slow.join().unwrap().unwrap();

        let order: Vec<(Value, u64)> = h
            .log
            .get_events()
            .unwrap()
            .iter()
            .map(|e| (e.payload["name"].clone(), e.seq))
            .collect();
        assert_eq!(order, vec![(json!("fast"), 0), (json!("slow"), 1)]);
        assert_eq!(h.log.session().unwrap().seq, 2);
    }

    #[tokio::test]
    async fn context_setters_apply_to_later_events() {
        let mut device = Map::new();
        device.insert("model".into(), json!("Pixel"));
        let h = Harness::build(Arc::new(MemoryStore::new()), |b| {
            b.device_info(StaticDeviceInfo(device))
        });
        h.init().await;

        h.log.screen("Before", None).unwrap();
        let mut user = Map::new();
        user.insert("id".into(), json!("u1"));
        h.log.set_user(user);
        h.log.set_context("locale", json!("de-DE"));
        h.log.screen("After", None).unwrap();

        let events = h.log.get_events().unwrap();
        assert_eq!(events[0].context.device_info(), Some(&json!({"model": "Pixel"})));
        assert!(events[0].context.user().is_none());
        assert_eq!(events[1].context.user(), Some(&json!({"id": "u1"})));
        assert_eq!(events[1].context.get("locale"), Some(&json!("de-DE")));

        let mut replaced = Map::new();
        replaced.insert("model".into(), json!("Pixel 9"));
        h.log.set_device_info(replaced);
        h.log.screen("Later", None).unwrap();
        let events = h.log.get_events().unwrap();
        assert_eq!(events[2].context.device_info(), Some(&json!({"model": "Pixel 9"})));
    }

    #[tokio::test]
    async fn clear_drops_events_and_context_but_keeps_session() {
        let h = Harness::new();
        h.init().await;
        h.log.set_context("tenant", json!("acme"));
        h.log.screen("Home", None).unwrap();
        h.log.flush().await.unwrap();
        h.log.screen("Pending", None).unwrap();

        h.log.clear().await.unwrap();

        assert!(h.log.get_events().unwrap().is_empty());
        assert_eq!(h.store.peek(EVENTS_KEY), None);
        assert!(h.store.peek(SESSION_KEY).is_some());
        assert_eq!(h.log.session().unwrap().seq, 2);

        h.scheduler.advance(Duration::from_secs(1)).await;
        assert_eq!(h.store.peek(EVENTS_KEY), None);

        h.log.screen("Fresh", None).unwrap();
        let events = h.log.get_events().unwrap();
        assert!(events[0].context.is_empty());
    }

    #[tokio::test]
    async fn query_filters_retained_events() {
        let h = Harness::new();
        h.init().await;
        for i in 0..5 {
            h.clock.advance(10);
            h.log.error(format!("e{i}"), None).unwrap();
            h.log.screen(format!("s{i}"), None).unwrap();
        }

        let found = h
            .log
            .query(&EventQuery::new().categories([EventCategory::Error]).limit(2))
            .unwrap();
        assert_eq!(
            payloads(&found),
            vec![json!({"message": "e3"}), json!({"message": "e4"})]
        );
    }

    #[tokio::test]
    async fn repro_export_keeps_current_session() {
        let store = Arc::new(MemoryStore::new());
        let first = Harness::with_store(Arc::clone(&store));
        first.init().await;
        first.log.screen("A", None).unwrap();
        first.log.flush().await.unwrap();

        let second = Harness::with_store(store);
        second.clock.set(T0 + 60 * MINUTE);
        second.init().await;
        second.log.screen("B", None).unwrap();

        let jsonl = second.log.export(ExportMode::Repro).await.unwrap();
        assert_eq!(jsonl.lines().count(), 2);
        let full = second.log.export(ExportMode::Full).await.unwrap();
        assert_eq!(full.lines().count(), 2);
    }

    #[derive(Debug, Default)]
    struct FailingStore {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl StorageAdapter for FailingStore {
        async fn get_item(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("read failed")))
        }

        async fn set_item(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }

        async fn remove_item(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    #[tokio::test]
    async fn storage_failures_do_not_break_logging() {
        let store = Arc::new(FailingStore::default());
        let scheduler = ManualScheduler::new();
        let log = EventLog::builder()
            .storage(Arc::clone(&store))
            .scheduler(scheduler.clone())
            .build();

        log.init(Some(ConfigOverrides::new().global_errors_enabled(false)))
            .await
            .unwrap();
        log.screen("Home", None).unwrap();
        scheduler.advance(Duration::from_secs(1)).await;

        assert!(store.writes.load(Ordering::SeqCst) >= 3);
        assert_eq!(log.get_events().unwrap().len(), 1);
        assert!(log.export(ExportMode::Full).await.is_ok());
        assert!(matches!(log.flush().await, Err(EventLogError::Storage(_))));
        assert!(matches!(log.clear().await, Err(EventLogError::Storage(_))));
    }

    #[tokio::test]
    async fn ingest_records_through_the_pipeline_and_detaches() {
        let h = Harness::new();
        h.init().await;
        let ingest = h.log.ingest();

        ingest.log(LogLevel::Warn, "from module", None).unwrap();
        ingest.error("module failure", None).unwrap();
        assert_eq!(h.log.get_events().unwrap().len(), 2);

        drop(h);
        assert_eq!(
            ingest.log(LogLevel::Info, "late", None),
            Err(EventLogError::Detached)
        );
    }

    #[tokio::test]
    async fn network_recorder_is_wired_at_init() {
        let h = Harness::new();
        let recorder = h.log.network_recorder();
        assert!(!recorder.is_installed());

        h.init().await;
        assert!(recorder.is_installed());

        recorder
            .record(HttpExchange::new("get", "https://api.test/me").response(200))
            .unwrap();
        recorder
            .record(HttpExchange::new("get", "https://api.test/down").failed("timeout"))
            .unwrap();

        let events = h.log.get_events().unwrap();
        assert_eq!(events[0].category, EventCategory::Network);
        assert_eq!(events[0].payload["status"], json!(200));
        assert_eq!(events[1].category, EventCategory::Error);
        assert_eq!(events[1].payload["context"]["category"], json!("network"));
    }

    #[tokio::test]
    async fn disabled_network_capture_is_not_wired() {
        let h = Harness::new();
        h.log
            .init(Some(
                ConfigOverrides::new()
                    .network_enabled(false)
                    .global_errors_enabled(false),
            ))
            .await
            .unwrap();
        assert!(!h.log.network_recorder().is_installed());
    }

    #[derive(Debug, Default)]
    struct CountingModule {
        installs: Arc<AtomicUsize>,
    }

    impl FeatureModule for CountingModule {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn is_enabled(&self, _features: &FeatureConfig) -> bool {
            true
        }

        fn install(&self, ingest: Ingest, _features: &FeatureConfig) -> Result<(), FeatureError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            ingest
                .log(LogLevel::Debug, "module installed", None)
                .map_err(|e| FeatureError::Unavailable {
                    name: self.name(),
                    reason: e.to_string(),
                })
        }
    }

    #[tokio::test]
    async fn custom_modules_install_once() {
        let installs = Arc::new(AtomicUsize::new(0));
        let h = Harness::build(Arc::new(MemoryStore::new()), |b| {
            b.module(CountingModule {
                installs: Arc::clone(&installs),
            })
        });
        h.init().await;
        h.init().await;

        assert_eq!(installs.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.log.get_events().unwrap()[0].payload["message"],
            json!("module installed")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_thread_panic_is_persisted() {
        let store = Arc::new(MemoryStore::new());
        let log = EventLog::builder()
            .config(EventLogConfig {
                batch_write_delay_ms: 20,
                ..EventLogConfig::default()
            })
            .storage(Arc::clone(&store))
            .device_info(StaticDeviceInfo(Map::new()))
            .build();
        log.init(None).await.unwrap();
        log.screen("Home", None).unwrap();

        let result = std::thread::Builder::new()
            .name("worker".into())
            .spawn(|| panic!("worker crashed before flush"))
            .unwrap()
            .join();
        assert!(result.is_err());

        let mut persisted: Vec<Event> = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            persisted = store
                .peek(EVENTS_KEY)
                .map(|raw| serde_json::from_str(&raw).unwrap())
                .unwrap_or_default();
            if persisted
                .iter()
                .any(|e| e.payload["message"] == json!("worker crashed before flush"))
            {
                break;
            }
        }

        assert!(
            persisted
                .iter()
                .any(|e| e.payload == json!({"name": "Home"}))
        );
        assert!(
            persisted
                .iter()
                .any(|e| e.payload["message"] == json!("worker crashed before flush"))
        );
    }

    #[test]
    fn panics_on_worker_threads_are_recorded_as_non_fatal() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let h = Harness::new();
        runtime.block_on(h.log.init(None)).unwrap();

        let result = std::thread::Builder::new()
            .name("worker".into())
            .spawn(|| panic!("worker blew up"))
            .unwrap()
            .join();
        assert!(result.is_err());

        let errors = h
            .log
            .query(&EventQuery::new().categories([EventCategory::Error]))
            .unwrap();
        let panic_event = errors
            .iter()
            .find(|e| e.payload["message"] == json!("worker blew up"))
            .unwrap();
        assert_eq!(panic_event.payload["isFatal"], json!(false));
        assert_eq!(
            panic_event.payload["context"],
            json!({"origin": "panic_hook", "thread": "worker"})
        );
    }
}
