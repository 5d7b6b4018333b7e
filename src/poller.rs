//! The polling loop: one request in flight at a time, a fixed pause between
//! the end of one cycle and the start of the next, and no outcome that stops
//! the loop.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{ConfigProvider, GrabberConfig};
use crate::error::GrabError;
use crate::fetch::Transport;
use crate::output::{SnapshotSink, assemble_snapshot};
use crate::parser::parse_snapshot;
use crate::stats::SnapshotStats;
use crate::status::{Status, StatusTracker};

/// What a single cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub status: Status,
    /// Whether the status differs from the previous cycle's (and was logged).
    pub changed: bool,
    /// Whether a snapshot reached the sink.
    pub emitted: bool,
    /// Pause before the next cycle, counted from the end of this one.
    pub next_in: Duration,
}

pub struct Poller<T, P, S> {
    transport: T,
    config: P,
    sink: S,
    tracker: StatusTracker,
    current: GrabberConfig,
    config_failing: bool,
    cycles: u64,
}

impl<T, P, S> Poller<T, P, S>
where
    T: Transport,
    P: ConfigProvider,
    S: SnapshotSink,
{
    /// Creates a poller. The provider must produce a valid config right away;
    /// later failures only keep the previous config in place.
    pub fn new(transport: T, config: P, sink: S) -> Result<Self> {
        let current = config.current().context("initial config")?;
        Ok(Self {
            transport,
            config,
            sink,
            tracker: StatusTracker::new(),
            current,
            config_failing: false,
            cycles: 0,
        })
    }

    /// Status of the most recent cycle, if any ran.
    pub fn status(&self) -> Option<Status> {
        self.tracker.last()
    }

    pub fn config(&self) -> &GrabberConfig {
        &self.current
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn refresh_config(&mut self) {
        match self.config.current() {
            Ok(config) => {
                if self.config_failing {
                    info!("Config is readable again");
                    self.config_failing = false;
                }
                if config != self.current {
                    info!(
                        url = %config.url(),
                        interval_ms = config.interval_time,
                        timeout_ms = config.timeout,
                        "Config changed"
                    );
                    self.current = config;
                }
            }
            Err(e) => {
                if !self.config_failing {
                    warn!(error = %e, "Could not reload config, keeping the previous one");
                    self.config_failing = true;
                }
            }
        }
    }

    /// Runs one fetch, decode, index and emit pass.
    ///
    /// The request is dropped, closing its connection, if it is still running
    /// when the configured timeout elapses; that counts as a
    /// [`Status::Timeout`] outcome.
    pub async fn cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        self.refresh_config();

        let url = self.current.url();
        let limit = self.current.request_timeout();
        let span = info_span!("cycle", n = self.cycles, url = %url);

        let outcome = async {
            match timeout(limit, self.transport.get(&url)).await {
                Ok(Ok(body)) => parse_snapshot(&body),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(GrabError::Timeout(limit)),
            }
        }
        .instrument(span.clone())
        .await;

        let transition = self.tracker.observe(outcome.as_ref());

        let mut emitted = false;
        if let Ok(parsed) = outcome {
            let snapshot = assemble_snapshot(parsed);
            let stats = SnapshotStats::from_snapshot(&snapshot);
            debug!(parent: &span, ?stats, "Snapshot assembled");

            match self.sink.emit(snapshot).await {
                Ok(()) => emitted = true,
                Err(e) => error!(parent: &span, error = %e, "Failed to hand off snapshot"),
            }
        }

        CycleReport {
            status: transition.status,
            changed: transition.changed,
            emitted,
            next_in: self.current.interval(),
        }
    }

    async fn cycle_then_wait(&mut self) {
        let report = self.cycle().await;
        sleep(report.next_in).await;
    }

    /// Polls until `shutdown` resolves. A cycle still in flight at that point
    /// is abandoned.
    pub async fn run_until<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        info!(
            url = %self.current.url(),
            interval_ms = self.current.interval_time,
            timeout_ms = self.current.timeout,
            "Poller started"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.cycle_then_wait() => {}
            }
        }

        info!(cycles = self.cycles, "Poller stopped");
        self
    }

    /// Polls forever.
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::output::ChannelSink;
    use crate::types::Snapshot;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    const BODY: &str = r#"{"COLUMNS":["DATAHORA","ORDEM","LINHA","LATITUDE","LONGITUDE","VELOCIDADE","DIRECAO"],
        "DATA":[["t1","101","550","-22.9","-43.2","10","1"],["t2","102","550","-22.9","-43.3","12","1"]]}"#;

    enum Reply {
        Body(&'static str),
        Fail(GrabError),
        Hang,
    }

    #[derive(Clone, Default)]
    struct Scripted {
        replies: Arc<Mutex<VecDeque<Reply>>>,
        calls: Arc<Mutex<Vec<Instant>>>,
    }

    impl Scripted {
        fn new(replies: Vec<Reply>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(replies.into())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, GrabError> {
            self.calls.lock().unwrap().push(Instant::now());
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Body(body)) => Ok(body.as_bytes().to_vec()),
                Some(Reply::Fail(e)) => Err(e),
                Some(Reply::Hang) => {
                    sleep(Duration::from_secs(3600)).await;
                    Err(GrabError::Request("hung request finished".into()))
                }
                None => Err(GrabError::Request("script exhausted".into())),
            }
        }
    }

    struct FailingSink;

    #[async_trait]
    impl SnapshotSink for FailingSink {
        async fn emit(&mut self, _snapshot: Snapshot) -> Result<()> {
            anyhow::bail!("consumer is gone")
        }
    }

    /// Serves queued configs; `None` entries fail, an empty queue repeats the
    /// last good one.
    struct QueuedConfig {
        queue: Mutex<VecDeque<Option<GrabberConfig>>>,
        last: Mutex<GrabberConfig>,
    }

    impl ConfigProvider for QueuedConfig {
        fn current(&self) -> Result<GrabberConfig> {
            match self.queue.lock().unwrap().pop_front() {
                Some(Some(config)) => {
                    *self.last.lock().unwrap() = config.clone();
                    Ok(config)
                }
                Some(None) => anyhow::bail!("config file vanished"),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }
    }

    fn config(interval_ms: u64, timeout_ms: u64) -> GrabberConfig {
        GrabberConfig {
            host: "localhost".to_string(),
            path: "/onibus".to_string(),
            interval_time: interval_ms,
            timeout: timeout_ms,
        }
    }

    fn poller(
        replies: Vec<Reply>,
    ) -> (Poller<Scripted, StaticConfig, ChannelSink>, Scripted, mpsc::Receiver<Snapshot>) {
        let transport = Scripted::new(replies);
        let (tx, rx) = mpsc::channel(16);
        let poller = Poller::new(
            transport.clone(),
            StaticConfig(config(1000, 100)),
            ChannelSink::new(tx),
        )
        .unwrap();
        (poller, transport, rx)
    }

    fn close_to(actual: Duration, expected: Duration) -> bool {
        actual >= expected && actual < expected + Duration::from_millis(5)
    }

    #[tokio::test]
    async fn test_success_emits_snapshot() {
        let (mut poller, _, mut rx) = poller(vec![Reply::Body(BODY)]);

        let report = poller.cycle().await;
        assert_eq!(report.status, Status::Success);
        assert!(report.changed);
        assert!(report.emitted);
        assert_eq!(report.next_in, Duration::from_millis(1000));

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.data["550"].len(), 2);
        assert_eq!(snapshot.orders["101"].timestamp, "t1");
        assert_eq!(snapshot.orders["102"].timestamp, "t2");
    }

    #[tokio::test]
    async fn test_sentinel_emits_nothing() {
        let (mut poller, _, mut rx) = poller(vec![Reply::Body(
            r#"{"COLUMNS":["MENSAGEM"],"DATA":[["service down"]]}"#,
        )]);

        let report = poller.cycle().await;
        assert_eq!(report.status, Status::OnlyMessage);
        assert!(!report.emitted);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_json_emits_nothing_and_reschedules() {
        let (mut poller, _, mut rx) = poller(vec![Reply::Body(r#"{"COLUMNS":["DATAHORA"],"DA"#)]);

        let report = poller.cycle().await;
        assert_eq!(report.status, Status::BadJson);
        assert!(!report.emitted);
        assert_eq!(report.next_in, Duration::from_millis(1000));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_repeated_failure_is_not_a_change() {
        let (mut poller, _, _rx) = poller(vec![
            Reply::Fail(GrabError::HttpStatus(503)),
            Reply::Fail(GrabError::HttpStatus(503)),
        ]);

        assert!(poller.cycle().await.changed);
        let second = poller.cycle().await;
        assert_eq!(second.status, Status::HttpError(503));
        assert!(!second.changed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_request() {
        let (mut poller, _, mut rx) = poller(vec![Reply::Hang]);

        let start = Instant::now();
        let report = poller.cycle().await;

        assert_eq!(report.status, Status::Timeout);
        assert!(!report.emitted);
        assert!(close_to(start.elapsed(), Duration::from_millis(100)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_counts_interval_from_end_of_cycle() {
        let (poller, transport, mut rx) = poller(vec![
            Reply::Hang,
            Reply::Body(BODY),
            Reply::Fail(GrabError::HttpStatus(503)),
        ]);

        let poller = poller.run_until(sleep(Duration::from_millis(3050))).await;

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        // timeout at 100ms, then the 1000ms interval
        assert!(close_to(calls[1] - calls[0], Duration::from_millis(1100)));
        assert!(close_to(calls[2] - calls[1], Duration::from_millis(1000)));

        assert_eq!(poller.status(), Some(Status::HttpError(503)));
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sink_failure_is_tolerated() {
        let transport = Scripted::new(vec![Reply::Body(BODY), Reply::Body(BODY)]);
        let mut poller =
            Poller::new(transport, StaticConfig(config(1000, 100)), FailingSink).unwrap();

        let report = poller.cycle().await;
        assert_eq!(report.status, Status::Success);
        assert!(!report.emitted);
        assert!(!poller.cycle().await.changed);
    }

    #[tokio::test]
    async fn test_config_is_reloaded_each_cycle() {
        let provider = QueuedConfig {
            queue: Mutex::new(VecDeque::from(vec![
                Some(config(1000, 100)),
                Some(config(5000, 100)),
                None,
            ])),
            last: Mutex::new(config(1000, 100)),
        };
        let transport = Scripted::new(vec![]);
        let (tx, _rx) = mpsc::channel(1);
        let mut poller = Poller::new(transport, provider, ChannelSink::new(tx)).unwrap();
        assert_eq!(poller.config().interval_time, 1000);

        assert_eq!(poller.cycle().await.next_in, Duration::from_millis(5000));
        // failed reload keeps the previous config
        assert_eq!(poller.cycle().await.next_in, Duration::from_millis(5000));
        assert_eq!(poller.config().interval_time, 5000);
    }

    #[test]
    fn test_new_requires_initial_config() {
        let provider = QueuedConfig {
            queue: Mutex::new(VecDeque::from(vec![None])),
            last: Mutex::new(config(1000, 100)),
        };
        let (tx, _rx) = mpsc::channel(1);
        let result = Poller::new(Scripted::default(), provider, ChannelSink::new(tx));
        assert!(result.is_err());
    }
}
