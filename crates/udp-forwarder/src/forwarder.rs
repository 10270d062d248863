// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP to HTTP forwarder.
//!
//! [`Forwarder`] holds a validated configuration; [`Forwarder::start`] binds the UDP socket
//! and returns a [`RunningForwarder`], which owns the sequence counter and the receive loop.
//! Ingestion is serial: each datagram gets the next sequence number before anything else
//! happens to it. The HTTP POST for a datagram and every mirrored log entry run on their
//! own spawned tasks, so a slow target never delays the next `recv`.

use crate::config::Config;
use crate::datadog_logger::DatadogLogger;
use crate::dispatcher::{ForwardOutcome, HttpDispatcher};
use crate::encoder::ForwardPayload;
use crate::error::ForwarderError;
use crate::http_client::get_client;
use crate::listener::{Datagram, UdpListener};
use crate::mirror::{spawn_mirror, LogContext, LogMirror, MirrorEntry, NoopMirror};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const SERVER_STARTING: &str = "UDP server starting";
const SERVER_CREATED: &str = "UDP server created";
const MESSAGE_FORWARDED: &str = "Forwarded UDP message to HTTP server";
const MESSAGE_FAILED: &str = "UDP message to HTTP server failed";

/// Arrival-ordered message ids. The first message gets 0.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: Option<u64>,
}

impl SequenceCounter {
    pub fn next(&mut self) -> u64 {
        let next = self.last.map_or(0, |last| last + 1);
        self.last = Some(next);
        next
    }

    /// Number of ids handed out so far
    pub fn assigned(&self) -> u64 {
        self.last.map_or(0, |last| last + 1)
    }
}

/// Counts forward attempts that have been dispatched but not completed.
///
/// There is no cap: a target that never answers makes this grow without bound. A limit
/// would be enforced in [`InFlightRequests::track`].
#[derive(Debug, Clone, Default)]
pub struct InFlightRequests {
    state: Arc<InFlightState>,
}

#[derive(Debug, Default)]
struct InFlightState {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlightRequests {
    pub fn track(&self) -> InFlightGuard {
        self.state.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            state: Arc::clone(&self.state),
        }
    }

    pub fn count(&self) -> usize {
        self.state.count.load(Ordering::Acquire)
    }

    /// Waits up to `limit` for every tracked request to complete. Returns `false` if some
    /// were still pending when the limit elapsed.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.state.idle.notified();
                tokio::pin!(notified);
                // Registered before the check so a release in between is not missed
                notified.as_mut().enable();
                if self.count() == 0 {
                    return;
                }
                notified.await;
            }
        };
        timeout(limit, idle).await.is_ok()
    }
}

/// Released when the forward attempt completes
#[derive(Debug)]
pub struct InFlightGuard {
    state: Arc<InFlightState>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.state.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

/// Outcome of one forward attempt, published to an optional subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReport {
    pub msg_counter: u64,
    pub outcome: ForwardOutcome,
}

/// A configured forwarder that has not bound its socket yet.
pub struct Forwarder {
    config: Arc<Config>,
    dispatcher: Arc<HttpDispatcher>,
    mirror: Arc<dyn LogMirror>,
    cancel_token: CancellationToken,
    report_tx: Option<mpsc::UnboundedSender<ForwardReport>>,
}

impl Forwarder {
    /// Validates the configuration and prepares the forward request headers.
    ///
    /// Fails without touching the network when the HTTP target URL is missing or invalid.
    pub fn new(
        config: Arc<Config>,
        client: reqwest::Client,
        mirror: Arc<dyn LogMirror>,
        cancel_token: CancellationToken,
    ) -> Result<Self, ForwarderError> {
        config.validate()?;
        let dispatcher = Arc::new(HttpDispatcher::new(client, &config)?);
        Ok(Self {
            config,
            dispatcher,
            mirror,
            cancel_token,
            report_tx: None,
        })
    }

    /// Builds the shared HTTP client and, when a Datadog API token is configured, the
    /// Datadog log mirror.
    pub fn from_config(
        config: Config,
        cancel_token: CancellationToken,
    ) -> Result<Self, ForwarderError> {
        let client = get_client(&config);
        let mirror: Arc<dyn LogMirror> = match &config.datadog {
            Some(datadog) => Arc::new(DatadogLogger::new(datadog.clone(), client.clone())),
            None => Arc::new(NoopMirror),
        };
        Self::new(Arc::new(config), client, mirror, cancel_token)
    }

    /// Publishes a [`ForwardReport`] for every completed forward attempt.
    #[must_use]
    pub fn with_report_sender(mut self, report_tx: mpsc::UnboundedSender<ForwardReport>) -> Self {
        self.report_tx = Some(report_tx);
        self
    }

    /// Binds the UDP socket. A bind failure is returned and nothing is forwarded.
    pub async fn start(self) -> Result<RunningForwarder, ForwarderError> {
        self.announce_starting();
        let listener = UdpListener::bind(&self.config.udp_bind_address).await?;
        Ok(self.listen(listener))
    }

    fn announce_starting(&self) {
        let datadog_logging = self.mirror.enabled();
        info!(
            udp_address = %self.config.udp_bind_address,
            http_target_url = %self.config.http_target_url,
            datadog_logging,
            "{SERVER_STARTING}"
        );
        let mut context = LogContext::new();
        context.insert(
            "udp_address".to_string(),
            json!(self.config.udp_bind_address),
        );
        context.insert(
            "http_target_url".to_string(),
            json!(self.config.http_target_url),
        );
        context.insert("datadog_logging".to_string(), json!(datadog_logging));
        spawn_mirror(&self.mirror, MirrorEntry::new(SERVER_STARTING, context));
    }

    fn listen(self, listener: UdpListener) -> RunningForwarder {
        info!(local_addr = %listener.local_addr(), "{SERVER_CREATED}");
        spawn_mirror(
            &self.mirror,
            MirrorEntry::new(SERVER_CREATED, LogContext::new()),
        );

        RunningForwarder {
            listener,
            dispatcher: self.dispatcher,
            mirror: self.mirror,
            sequence: SequenceCounter::default(),
            in_flight: InFlightRequests::default(),
            cancel_token: self.cancel_token,
            report_tx: self.report_tx,
        }
    }
}

/// A bound forwarder. Runs until its cancellation token is cancelled.
pub struct RunningForwarder {
    listener: UdpListener,
    dispatcher: Arc<HttpDispatcher>,
    mirror: Arc<dyn LogMirror>,
    sequence: SequenceCounter,
    in_flight: InFlightRequests,
    cancel_token: CancellationToken,
    report_tx: Option<mpsc::UnboundedSender<ForwardReport>>,
}

impl RunningForwarder {
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Handle on the in-flight request count; stays valid after `spin` takes `self`.
    pub fn in_flight(&self) -> InFlightRequests {
        self.in_flight.clone()
    }

    /// Main receive loop.
    ///
    /// Receive errors are logged and the loop moves on to the next datagram.
    pub async fn spin(mut self) {
        loop {
            let received = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break,
                received = self.listener.recv() => received,
            };

            match received {
                Ok(datagram) => {
                    self.handle_datagram(datagram);
                }
                Err(e) => error!("Failed to receive UDP datagram: {}", e),
            }
        }
        debug!(
            messages = self.sequence.assigned(),
            in_flight = self.in_flight.count(),
            "UDP forwarder stopped receiving"
        );
    }

    /// Assigns the next sequence number and spawns the forward attempt.
    fn handle_datagram(&mut self, datagram: Datagram) -> u64 {
        let msg_counter = self.sequence.next();
        debug!(
            msg = %String::from_utf8_lossy(&datagram.payload),
            addr = %datagram.source,
            msg_counter,
            "UDP message received"
        );

        let in_flight = self.in_flight.track();
        tokio::spawn(forward_message(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.mirror),
            datagram.payload,
            msg_counter,
            self.report_tx.clone(),
            in_flight,
        ));
        msg_counter
    }
}

/// Sends one datagram and logs the outcome locally and to the mirror.
async fn forward_message(
    dispatcher: Arc<HttpDispatcher>,
    mirror: Arc<dyn LogMirror>,
    payload: Vec<u8>,
    msg_counter: u64,
    report_tx: Option<mpsc::UnboundedSender<ForwardReport>>,
    _in_flight: InFlightGuard,
) {
    debug!(msg_counter, "Forwarding UDP message to HTTP server");

    let outcome = dispatcher.post(&ForwardPayload::new(&payload)).await;

    let mut context = LogContext::new();
    let entry = match &outcome {
        ForwardOutcome::Success { status_code } => {
            info!(status_code, msg_counter, "{MESSAGE_FORWARDED}");
            context.insert("status_code".to_string(), json!(status_code));
            context.insert("msg_counter".to_string(), json!(msg_counter));
            context.insert("msg".to_string(), json!(String::from_utf8_lossy(&payload)));
            MirrorEntry::new(MESSAGE_FORWARDED, context)
        }
        ForwardOutcome::Failure { error } => {
            error!(error = %error, msg_counter, "{MESSAGE_FAILED}");
            context.insert("error".to_string(), json!(error));
            context.insert("msg_counter".to_string(), json!(msg_counter));
            context.insert("msg".to_string(), json!(String::from_utf8_lossy(&payload)));
            MirrorEntry::new(MESSAGE_FAILED, context).with_error(error)
        }
    };
    spawn_mirror(&mirror, entry);

    if let Some(report_tx) = report_tx {
        // The subscriber may have gone away; forwarding does not depend on it
        let _ = report_tx.send(ForwardReport {
            msg_counter,
            outcome,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MirrorLevel;
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use tracing_test::traced_test;

    /// Captures mirrored entries instead of sending them anywhere
    struct RecordingMirror {
        tx: mpsc::UnboundedSender<MirrorEntry>,
    }

    #[async_trait]
    impl LogMirror for RecordingMirror {
        fn enabled(&self) -> bool {
            true
        }

        async fn mirror(&self, entry: MirrorEntry) {
            let _ = self.tx.send(entry);
        }
    }

    fn recording_mirror() -> (Arc<dyn LogMirror>, mpsc::UnboundedReceiver<MirrorEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingMirror { tx }), rx)
    }

    fn closed_port_url() -> String {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .expect("local port")
            .port();
        format!("http://127.0.0.1:{port}/udp")
    }

    fn forwarder_for(url: &str, mirror: Arc<dyn LogMirror>) -> Forwarder {
        let config = Arc::new(Config::new("127.0.0.1:0", url));
        Forwarder::new(
            config,
            reqwest::Client::new(),
            mirror,
            CancellationToken::new(),
        )
        .expect("valid forwarder")
    }

    fn datagram(payload: &str) -> Datagram {
        Datagram {
            payload: payload.as_bytes().to_vec(),
            source: SocketAddr::from(([111, 112, 113, 114], 5000)),
        }
    }

    async fn next_entry_with_message(
        rx: &mut mpsc::UnboundedReceiver<MirrorEntry>,
        message: &str,
    ) -> MirrorEntry {
        loop {
            let entry = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for mirrored entry")
                .expect("mirror channel closed");
            if entry.message == message {
                return entry;
            }
        }
    }

    async fn collect_reports(
        rx: &mut mpsc::UnboundedReceiver<ForwardReport>,
        n: usize,
    ) -> Vec<ForwardReport> {
        let mut reports = Vec::with_capacity(n);
        while reports.len() < n {
            let report = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for forward reports")
                .expect("report channel closed");
            reports.push(report);
        }
        reports.sort_by_key(|report| report.msg_counter);
        reports
    }

    #[test]
    fn test_sequence_counter_starts_at_zero() {
        let mut counter = SequenceCounter::default();
        assert_eq!(counter.assigned(), 0);
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.assigned(), 3);
    }

    #[test]
    fn test_in_flight_guard_releases_on_drop() {
        let in_flight = InFlightRequests::default();
        let first = in_flight.track();
        let second = in_flight.track();
        assert_eq!(in_flight.count(), 2);
        drop(first);
        assert_eq!(in_flight.count(), 1);
        drop(second);
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_requests_complete() {
        let in_flight = InFlightRequests::default();
        assert!(in_flight.wait_idle(Duration::from_millis(10)).await);

        let guard = in_flight.track();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(guard);
        });

        assert!(in_flight.wait_idle(Duration::from_secs(5)).await);
        assert_eq!(in_flight.count(), 0);
        release.await.expect("release task panicked");
    }

    #[tokio::test]
    async fn test_wait_idle_gives_up_after_limit() {
        let in_flight = InFlightRequests::default();
        let _pending = in_flight.track();

        assert!(!in_flight.wait_idle(Duration::from_millis(20)).await);
        assert_eq!(in_flight.count(), 1);
    }

    #[test]
    fn test_missing_http_target_url_fails_before_binding() {
        let config = Arc::new(Config::new("127.0.0.1:0", ""));
        let result = Forwarder::new(
            config,
            reqwest::Client::new(),
            Arc::new(NoopMirror),
            CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(ForwarderError::MissingConfig("HTTP_FORWARDING_URL"))
        ));
    }

    #[test]
    fn test_invalid_extra_header_fails_construction() {
        let mut config = Config::new("127.0.0.1:0", "http://localhost/");
        config
            .http_extra_headers
            .insert("Bad Header".to_string(), "x".to_string());
        let result = Forwarder::new(
            Arc::new(config),
            reqwest::Client::new(),
            Arc::new(NoopMirror),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(ForwarderError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn test_start_reports_bind_failure() {
        let taken = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind");
        let address = taken.local_addr().expect("addr").to_string();
        let config = Arc::new(Config::new(&address, "http://localhost/"));
        let forwarder = Forwarder::new(
            config,
            reqwest::Client::new(),
            Arc::new(NoopMirror),
            CancellationToken::new(),
        )
        .expect("valid forwarder");

        let result = forwarder.start().await;

        assert!(matches!(result, Err(ForwarderError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_start_mirrors_lifecycle_events() {
        let (mirror, mut entries) = recording_mirror();
        let forwarder = forwarder_for("http://localhost/udp", mirror);

        let running = forwarder.start().await.expect("start");

        let starting = next_entry_with_message(&mut entries, SERVER_STARTING).await;
        assert_eq!(starting.level(), MirrorLevel::Info);
        assert_eq!(starting.context["udp_address"], json!("127.0.0.1:0"));
        assert_eq!(
            starting.context["http_target_url"],
            json!("http://localhost/udp")
        );
        assert_eq!(starting.context["datadog_logging"], json!(true));

        let created = next_entry_with_message(&mut entries, SERVER_CREATED).await;
        assert_eq!(created.level(), MirrorLevel::Info);
        assert_ne!(running.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_handle_datagram_assigns_arrival_order() {
        let forwarder = forwarder_for(&closed_port_url(), Arc::new(NoopMirror));
        let mut running = forwarder.listen(UdpListener::replay(vec![]));

        let assigned: Vec<u64> = (0..5)
            .map(|i| running.handle_datagram(datagram(&format!("line {i}"))))
            .collect();

        assert_eq!(assigned, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_successful_forward_logs_and_mirrors_info() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/udp")
            .match_body(Matcher::JsonString(r#"{"msg":"bGluZSAw"}"#.to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let (mirror, mut entries) = recording_mirror();
        let dispatcher = Arc::new(
            HttpDispatcher::new(
                reqwest::Client::new(),
                &Config::new("127.0.0.1:0", &format!("{}/udp", server.url())),
            )
            .expect("valid dispatcher"),
        );
        let in_flight = InFlightRequests::default();
        let (report_tx, mut reports) = mpsc::unbounded_channel();

        forward_message(
            dispatcher,
            mirror,
            b"line 0".to_vec(),
            0,
            Some(report_tx),
            in_flight.track(),
        )
        .await;

        mock.assert_async().await;
        assert_eq!(in_flight.count(), 0);
        assert!(logs_contain(MESSAGE_FORWARDED));
        assert!(logs_contain("status_code=200"));
        assert!(logs_contain("msg_counter=0"));
        assert!(!logs_contain(MESSAGE_FAILED));

        let report = reports.recv().await.expect("report");
        assert_eq!(
            report,
            ForwardReport {
                msg_counter: 0,
                outcome: ForwardOutcome::Success { status_code: 200 },
            }
        );

        let entry = next_entry_with_message(&mut entries, MESSAGE_FORWARDED).await;
        assert_eq!(entry.level(), MirrorLevel::Info);
        assert_eq!(entry.context["status_code"], json!(200));
        assert_eq!(entry.context["msg_counter"], json!(0));
        assert_eq!(entry.context["msg"], json!("line 0"));
        assert!(entries.try_recv().is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_forward_logs_and_mirrors_error() {
        let (mirror, mut entries) = recording_mirror();
        let dispatcher = Arc::new(
            HttpDispatcher::new(
                reqwest::Client::new(),
                &Config::new("127.0.0.1:0", &closed_port_url()),
            )
            .expect("valid dispatcher"),
        );
        let (report_tx, mut reports) = mpsc::unbounded_channel();

        forward_message(
            dispatcher,
            mirror,
            b"line 3".to_vec(),
            3,
            Some(report_tx),
            InFlightRequests::default().track(),
        )
        .await;

        assert!(logs_contain(MESSAGE_FAILED));
        assert!(logs_contain("msg_counter=3"));
        assert!(logs_contain("error sending request"));
        assert!(!logs_contain(MESSAGE_FORWARDED));

        let report = reports.recv().await.expect("report");
        let error = match report.outcome {
            ForwardOutcome::Failure { error } => error,
            other => panic!("expected failure, got {other}"),
        };

        let entry = next_entry_with_message(&mut entries, MESSAGE_FAILED).await;
        assert_eq!(entry.level(), MirrorLevel::Error);
        assert_eq!(entry.error.as_deref(), Some(error.as_str()));
        assert_eq!(entry.context["error"], json!(error));
        assert_eq!(entry.context["msg_counter"], json!(3));
        assert_eq!(entry.context["msg"], json!("line 3"));
    }

    #[tokio::test]
    async fn test_spin_forwards_each_datagram_once_in_arrival_order() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for i in 0..5u16 {
            let body = format!(
                r#"{{"msg":"{}"}}"#,
                crate::encoder::base64_encode_url(format!("line {i}").as_bytes())
            );
            // Each payload gets a distinct 2xx status so outcomes map back to payloads
            let mock = server
                .mock("POST", "/udp")
                .match_body(Matcher::JsonString(body))
                .with_status(usize::from(200 + i))
                .expect(1)
                .create_async()
                .await;
            mocks.push(mock);
        }

        let (report_tx, mut reports) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let forwarder = Forwarder::new(
            Arc::new(Config::new("127.0.0.1:0", &format!("{}/udp", server.url()))),
            reqwest::Client::new(),
            Arc::new(NoopMirror),
            cancel_token.clone(),
        )
        .expect("valid forwarder")
        .with_report_sender(report_tx);
        let running = forwarder.listen(UdpListener::replay(
            (0..5).map(|i| datagram(&format!("line {i}"))).collect(),
        ));
        let spin = tokio::spawn(running.spin());

        let reports = collect_reports(&mut reports, 5).await;

        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.msg_counter, i as u64);
            assert_eq!(
                report.outcome,
                ForwardOutcome::Success {
                    status_code: 200 + i as u16
                }
            );
        }
        for mock in mocks {
            mock.assert_async().await;
        }

        cancel_token.cancel();
        timeout(Duration::from_secs(5), spin)
            .await
            .expect("spin should stop after cancellation")
            .expect("spin task panicked");
    }

    #[tokio::test]
    async fn test_unreachable_target_yields_one_failure_per_datagram() {
        const N: usize = 20;
        let (mirror, mut entries) = recording_mirror();
        let (report_tx, mut reports) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let forwarder = Forwarder::new(
            Arc::new(Config::new("127.0.0.1:0", &closed_port_url())),
            reqwest::Client::new(),
            mirror,
            cancel_token.clone(),
        )
        .expect("valid forwarder")
        .with_report_sender(report_tx);
        let running = forwarder.listen(UdpListener::replay(
            (0..N).map(|i| datagram(&format!("line {i}"))).collect(),
        ));
        let in_flight = running.in_flight();
        let spin = tokio::spawn(running.spin());

        let reports = collect_reports(&mut reports, N).await;

        let counters: Vec<u64> = reports.iter().map(|report| report.msg_counter).collect();
        assert_eq!(counters, (0..N as u64).collect::<Vec<u64>>());
        assert!(reports.iter().all(|report| !report.outcome.is_success()));

        let mut failures = 0;
        while failures < N {
            let entry = next_entry_with_message(&mut entries, MESSAGE_FAILED).await;
            assert_eq!(entry.level(), MirrorLevel::Error);
            failures += 1;
        }

        cancel_token.cancel();
        spin.await.expect("spin task panicked");
        assert_eq!(in_flight.count(), 0);
    }

    #[tokio::test]
    async fn test_unresponsive_target_accumulates_in_flight_requests() {
        // Accepts connections and never answers
        let target = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind target");
        let target_addr = target.local_addr().expect("target addr");
        let accept_loop = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = target.accept().await {
                held.push(stream);
            }
        });

        let cancel_token = CancellationToken::new();
        let forwarder = Forwarder::new(
            Arc::new(Config::new(
                "127.0.0.1:0",
                &format!("http://{target_addr}/udp"),
            )),
            reqwest::Client::new(),
            Arc::new(NoopMirror),
            cancel_token.clone(),
        )
        .expect("valid forwarder");
        let running = forwarder.listen(UdpListener::replay(
            (0..3).map(|i| datagram(&format!("line {i}"))).collect(),
        ));
        let in_flight = running.in_flight();
        let spin = tokio::spawn(running.spin());

        let observed = timeout(Duration::from_secs(5), async {
            while in_flight.count() < 3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(observed.is_ok(), "expected 3 pending requests");

        cancel_token.cancel();
        spin.await.expect("spin task panicked");
        // Stopping ingestion does not cancel requests already dispatched
        assert_eq!(in_flight.count(), 3);
        accept_loop.abort();
    }
}
