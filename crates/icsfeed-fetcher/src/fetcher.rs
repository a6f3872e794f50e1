//! The per-feed orchestrator.
//!
//! A [`Fetcher`] polls one feed on a background task. Each cycle retrieves
//! the body, runs it through the [`EventPipeline`] and, when at least one
//! event survives, replaces the published list and calls the receive
//! listener. The [`Scheduler`] then decides when the next cycle runs.
//!
//! ```ignore
//! let fetcher = Fetcher::new(FetcherConfig::new("https://example.com/cal.ics")?)?;
//! fetcher.on_receive(|f| println!("{} events", f.events().len()));
//! fetcher.start_fetch();
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, Utc};
use icsfeed_core::{CalendarEvent, ExclusionSet};
use icsfeed_providers::{FeedRequest, FeedTransport, HttpTransport, ProviderError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::FetcherConfig;
use crate::error::FetcherResult;
use crate::pipeline::EventPipeline;
use crate::scheduler::{FetchOutcome, RetryPolicy, Scheduler};

type ReceiveListener = Arc<dyn Fn(&Fetcher) + Send + Sync>;
type ErrorListener = Arc<dyn Fn(&Fetcher, &ProviderError) + Send + Sync>;

/// Snapshot of the published events.
pub type EventList = Arc<Vec<CalendarEvent>>;

#[derive(Debug, Clone, Copy)]
enum Command {
    FetchNow,
}

struct Inner {
    config: FetcherConfig,
    pipeline: EventPipeline,
    request: FeedRequest,
    transport: Arc<dyn FeedTransport>,
    events: watch::Sender<EventList>,
    failed_retrievals: Arc<AtomicU32>,
    on_receive: Mutex<Option<ReceiveListener>>,
    on_error: Mutex<Option<ErrorListener>>,
    commands: mpsc::Sender<Command>,
    command_rx: Mutex<Option<mpsc::Receiver<Command>>>,
}

/// Polls one feed and publishes its upcoming events.
///
/// Cloning is cheap and every clone drives the same feed.
#[derive(Clone)]
pub struct Fetcher {
    inner: Arc<Inner>,
}

impl Fetcher {
    /// Creates a fetcher using the HTTP transport.
    ///
    /// # Errors
    ///
    /// Fails if an exclusion rule does not compile or the HTTP client
    /// cannot be built.
    pub fn new(config: FetcherConfig) -> FetcherResult<Self> {
        let transport = HttpTransport::with_timeout(config.timeout)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a fetcher on top of an arbitrary transport.
    ///
    /// # Errors
    ///
    /// Fails if an exclusion rule does not compile.
    pub fn with_transport(
        config: FetcherConfig,
        transport: Arc<dyn FeedTransport>,
    ) -> FetcherResult<Self> {
        let pipeline = EventPipeline {
            exclusions: ExclusionSet::compile(&config.excluded_events)?,
            maximum_entries: config.maximum_entries,
            maximum_number_of_days: config.maximum_number_of_days,
        };
        let (events, _) = watch::channel(EventList::default());
        let (commands, command_rx) = mpsc::channel(1);

        Ok(Self {
            inner: Arc::new(Inner {
                request: config.request(),
                config,
                pipeline,
                transport,
                events,
                failed_retrievals: Arc::new(AtomicU32::new(0)),
                on_receive: Mutex::new(None),
                on_error: Mutex::new(None),
                commands,
                command_rx: Mutex::new(Some(command_rx)),
            }),
        })
    }

    /// Runs a cycle now, cancelling the pending timer.
    ///
    /// The first call spawns the polling task. Later calls made while a
    /// retrieval is in flight are coalesced into one follow-up cycle.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_fetch(&self) {
        let receiver = lock(&self.inner.command_rx).take();
        match receiver {
            Some(commands) => {
                info!(url = %self.url(), "Starting fetcher");
                tokio::spawn(self.clone().run(commands));
            }
            None => match self.inner.commands.try_send(Command::FetchNow) {
                Ok(()) => debug!(url = %self.url(), "Fetch requested"),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(url = %self.url(), "Fetch already pending")
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(url = %self.url(), "Polling task is gone")
                }
            },
        }
    }

    /// Registers the listener called after each published update.
    /// Replaces any previous one.
    pub fn on_receive<F>(&self, listener: F)
    where
        F: Fn(&Fetcher) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_receive) = Some(Arc::new(listener));
    }

    /// Registers the listener called when retrieval has failed
    /// [`MAX_FAILED_RETRIEVALS`](crate::scheduler::MAX_FAILED_RETRIEVALS)
    /// times in a row. Replaces any previous one.
    pub fn on_error<F>(&self, listener: F)
    where
        F: Fn(&Fetcher, &ProviderError) + Send + Sync + 'static,
    {
        *lock(&self.inner.on_error) = Some(Arc::new(listener));
    }

    pub fn url(&self) -> &Url {
        &self.inner.config.url
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.inner.config
    }

    /// The last published list. Empty until the first successful cycle.
    pub fn events(&self) -> EventList {
        self.inner.events.borrow().clone()
    }

    /// A channel yielding every published list.
    pub fn subscribe(&self) -> watch::Receiver<EventList> {
        self.inner.events.subscribe()
    }

    /// Consecutive failed retrievals, between 0 and 2 between cycles.
    pub fn failed_retrievals(&self) -> u32 {
        self.inner.failed_retrievals.load(Ordering::Acquire)
    }

    async fn run(self, mut commands: mpsc::Receiver<Command>) {
        let policy = RetryPolicy::new(self.inner.config.reload_interval);
        let mut scheduler = Scheduler::new(policy, self.inner.failed_retrievals.clone());

        loop {
            let result = self.cycle().await;
            let outcome = match result {
                Ok(0) => FetchOutcome::Empty,
                Ok(count) => FetchOutcome::Received(count),
                Err(_) => FetchOutcome::Failed,
            };
            let decision = scheduler.record(outcome);

            if let Err(ref e) = result {
                warn!(
                    url = %self.url(),
                    error = %e,
                    failures = decision.failed_retrievals,
                    "Feed retrieval failed"
                );
                if decision.threshold_reached {
                    self.notify_error(e);
                }
            }
            self.wait(&mut scheduler, &mut commands).await;
        }
    }

    async fn wait(&self, scheduler: &mut Scheduler, commands: &mut mpsc::Receiver<Command>) {
        tokio::select! {
            _ = scheduler.wait() => {}
            command = commands.recv() => match command {
                Some(Command::FetchNow) => scheduler.cancel(),
                // Unreachable while `self` holds the sender.
                None => scheduler.wait().await,
            },
        }
    }

    /// One retrieval. Returns the number of published events.
    async fn cycle(&self) -> Result<usize, ProviderError> {
        debug!(url = %self.url(), "Fetching feed");
        let response = self.inner.transport.fetch(&self.inner.request).await?;
        let body = response.into_body()?;

        let now = Utc::now();
        let events = match self.inner.config.timezone {
            Some(tz) => self.inner.pipeline.build(&body, now, &tz),
            None => self.inner.pipeline.build(&body, now, &Local),
        };
        if events.is_empty() {
            info!(url = %self.url(), "No upcoming events, keeping previous list");
            return Ok(0);
        }

        let count = events.len();
        self.inner.events.send_replace(Arc::new(events));
        info!(url = %self.url(), count, "Published events");
        self.notify_receive();
        Ok(count)
    }

    fn notify_receive(&self) {
        let listener = lock(&self.inner.on_receive).clone();
        if let Some(listener) = listener {
            listener(self);
        }
    }

    fn notify_error(&self, error: &ProviderError) {
        let listener = lock(&self.inner.on_error).clone();
        if let Some(listener) = listener {
            listener(self, error);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use chrono::{DateTime, TimeDelta};
    use icsfeed_providers::{BoxFuture, FeedResponse, ProviderErrorCode, ProviderResult};
    use tokio::time::Instant;

    use crate::scheduler::RETRY_DELAY;

    const RELOAD: Duration = Duration::from_secs(300);

    /// Replays scripted responses and records when each call happened.
    struct ScriptedTransport {
        replies: Mutex<VecDeque<ProviderResult<FeedResponse>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<ProviderResult<FeedResponse>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FeedTransport for ScriptedTransport {
        fn fetch<'a>(&'a self, _request: &'a FeedRequest) -> BoxFuture<'a, ProviderResult<FeedResponse>> {
            self.calls.lock().unwrap().push(Instant::now());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(FeedResponse::new(200, calendar(&[]))));
            Box::pin(async move { reply })
        }
    }

    fn calendar(events: &[(&str, DateTime<Utc>)]) -> String {
        let mut body = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n");
        for (i, (title, start)) in events.iter().enumerate() {
            let end = *start + TimeDelta::hours(1);
            body.push_str(&format!(
                "BEGIN:VEVENT\r\nUID:{}\r\nSUMMARY:{}\r\nDTSTART:{}\r\nDTEND:{}\r\nEND:VEVENT\r\n",
                i,
                title,
                start.format("%Y%m%dT%H%M%SZ"),
                end.format("%Y%m%dT%H%M%SZ"),
            ));
        }
        body.push_str("END:VCALENDAR\r\n");
        body
    }

    fn ok(events: &[(&str, DateTime<Utc>)]) -> ProviderResult<FeedResponse> {
        Ok(FeedResponse::new(200, calendar(events)))
    }

    fn soon(hours: i64) -> DateTime<Utc> {
        Utc::now() + TimeDelta::hours(hours)
    }

    fn fetcher(transport: Arc<ScriptedTransport>) -> Fetcher {
        let config = FetcherConfig::new("https://example.com/cal.ics")
            .unwrap()
            .with_reload_interval(RELOAD)
            .with_maximum_number_of_days(30)
            .with_timezone(chrono_tz::UTC);
        Fetcher::with_transport(config, transport).unwrap()
    }

    fn assert_gap(from: Instant, to: Instant, expected: Duration) {
        let gap = to - from;
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(50),
            "expected {:?}, got {:?}",
            expected,
            gap
        );
    }

    /// Lets the polling task run without moving past any real timer.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_and_notifies() {
        let transport = ScriptedTransport::new(vec![ok(&[("Later", soon(5)), ("Sooner", soon(2))])]);
        let fetcher = fetcher(transport.clone());
        let notified = Arc::new(AtomicUsize::new(0));
        let seen = notified.clone();
        fetcher.on_receive(move |f| {
            assert_eq!(f.events().len(), 2);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        assert!(fetcher.events().is_empty());
        fetcher.start_fetch();
        settle().await;

        assert_eq!(notified.load(Ordering::SeqCst), 1);
        let titles: Vec<_> = fetcher.events().iter().map(|e| e.title.clone()).collect();
        assert_eq!(titles, ["Sooner", "Later"]);
        assert_eq!(fetcher.failed_retrievals(), 0);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_result_keeps_previous_list() {
        let transport = ScriptedTransport::new(vec![
            ok(&[("Review", soon(2))]),
            ok(&[]),
            Ok(FeedResponse::new(200, "not a calendar")),
        ]);
        let fetcher = fetcher(transport.clone());
        let notified = Arc::new(AtomicUsize::new(0));
        let seen = notified.clone();
        fetcher.on_receive(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        fetcher.start_fetch();
        settle().await;
        let first = fetcher.events();

        fetcher.start_fetch();
        settle().await;
        fetcher.start_fetch();
        settle().await;

        assert_eq!(transport.calls().len(), 3);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &fetcher.events()));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_falls_back_to_reload_interval() {
        let transport = ScriptedTransport::new(vec![
            Ok(FeedResponse::new(503, "")),
            Ok(FeedResponse::new(503, "")),
            Ok(FeedResponse::new(503, "")),
            ok(&[("Recovered", soon(48))]),
        ]);
        let fetcher = fetcher(transport.clone());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = errors.clone();
        fetcher.on_error(move |f, e| {
            seen.lock().unwrap().push((e.status(), f.failed_retrievals()));
        });

        fetcher.start_fetch();
        settle().await;
        assert_eq!(fetcher.failed_retrievals(), 1);

        tokio::time::sleep(RETRY_DELAY).await;
        assert_eq!(fetcher.failed_retrievals(), 2);

        tokio::time::sleep(RETRY_DELAY).await;
        assert_eq!(fetcher.failed_retrievals(), 0);

        tokio::time::sleep(RELOAD + Duration::from_secs(1)).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        assert_gap(calls[0], calls[1], Duration::from_secs(10));
        assert_gap(calls[1], calls[2], Duration::from_secs(10));
        assert_gap(calls[2], calls[3], RELOAD);
        assert_eq!(*errors.lock().unwrap(), [(Some(503), 0)]);
        assert_eq!(fetcher.events()[0].title, "Recovered");
        assert_eq!(fetcher.failed_retrievals(), 0);

        // Next cycle after a success is one reload interval later.
        tokio::time::sleep(RELOAD).await;
        let calls = transport.calls();
        assert_eq!(calls.len(), 5);
        assert_gap(calls[3], calls[4], RELOAD);
    }

    #[tokio::test(start_paused = true)]
    async fn start_fetch_is_coalesced() {
        let transport = ScriptedTransport::new(Vec::new());
        let fetcher = fetcher(transport.clone());

        fetcher.start_fetch();
        fetcher.start_fetch();
        fetcher.start_fetch();
        settle().await;

        // The first call runs a cycle, the others collapse into one.
        assert_eq!(transport.calls().len(), 2);

        tokio::time::sleep(RELOAD - Duration::from_secs(1)).await;
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_fetch_cancels_pending_timer() {
        let transport = ScriptedTransport::new(Vec::new());
        let fetcher = fetcher(transport.clone());

        fetcher.start_fetch();
        settle().await;
        tokio::time::sleep(Duration::from_secs(100)).await;
        fetcher.start_fetch();
        settle().await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);

        // Only the timer armed by the second cycle remains.
        tokio::time::sleep(RELOAD - Duration::from_secs(1)).await;
        assert_eq!(transport.calls().len(), 2);
        tokio::time::sleep(Duration::from_secs(2)).await;
        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert_gap(calls[1], calls[2], RELOAD);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_snapshots() {
        let transport = ScriptedTransport::new(vec![ok(&[("Sync", soon(1))])]);
        let fetcher = fetcher(transport);
        let mut updates = fetcher.subscribe();

        fetcher.start_fetch();
        updates.changed().await.unwrap();

        assert_eq!(updates.borrow_and_update()[0].title, "Sync");
    }

    #[tokio::test(start_paused = true)]
    async fn last_listener_wins() {
        let transport = ScriptedTransport::new(vec![ok(&[("One", soon(1))])]);
        let fetcher = fetcher(transport);
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let (a, b) = (first.clone(), second.clone());
        fetcher.on_receive(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        fetcher.on_receive(move |_| {
            b.fetch_add(1, Ordering::SeqCst);
        });

        fetcher.start_fetch();
        settle().await;

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_count_as_failures() {
        let transport = ScriptedTransport::new(vec![Err(ProviderError::network("reset"))]);
        let fetcher = fetcher(transport);

        fetcher.start_fetch();
        settle().await;

        assert_eq!(fetcher.failed_retrievals(), 1);
        assert!(fetcher.events().is_empty());
    }

    #[test]
    fn invalid_exclusion_fails_construction() {
        let config = FetcherConfig::new("https://example.com/cal.ics")
            .unwrap()
            .with_excluded_events([icsfeed_core::ExcludedEvent::Filter {
                filter_by: "(".to_string(),
                case_sensitive: false,
                regex: true,
                until: None,
            }]);

        let result = Fetcher::with_transport(config, ScriptedTransport::new(Vec::new()));
        assert!(matches!(result, Err(crate::error::FetcherError::Exclusion(_))));
    }

    #[test]
    fn error_codes_are_transport_failures() {
        assert!(ProviderError::http_status(503).is_transport());
        assert_eq!(
            FeedResponse::new(404, "").into_body().unwrap_err().code(),
            ProviderErrorCode::HttpStatus
        );
    }
}
