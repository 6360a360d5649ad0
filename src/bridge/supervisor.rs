//! Connection state machine

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{BridgeHandle, ConnectionState, DeviceTarget, StopHandle, SupervisorStats};
use crate::config::BridgeConfig;
use crate::error::{BridgeFailure, SinkError, TransportError};
use crate::midi::{format_hex, translate, MidiReassembler};
use crate::report::{ActivityReporter, StatusReporter};
use crate::sink::{resolve_output_port, OutputPort, OutputSink};
use crate::transport::{
    find_device, PayloadReceiver, Transport, TransportSession, MIDI_CHARACTERISTIC_UUID,
};

/// Extra time a transport gets to return its scan results
const SCAN_GRACE: Duration = Duration::from_secs(5);

/// Upper bound for each best-effort teardown call
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Next state plus the status text announcing it
struct Transition {
    to: ConnectionState,
    status: String,
}

impl Transition {
    fn new(to: ConnectionState, status: impl Into<String>) -> Self {
        Self {
            to,
            status: status.into(),
        }
    }
}

/// What woke the streaming loop
enum Wake {
    Stop,
    Payload(Vec<u8>),
    QueueClosed,
    Tick,
}

/// Owns the connection lifecycle and the MIDI pipeline
///
/// Everything happens on the one task that runs [`ConnectionSupervisor::run`]:
/// the transport only pushes payloads into a queue, so the reassembler, the
/// output port and both reporters see a single ordered stream of calls.
pub struct ConnectionSupervisor {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn OutputSink>,
    status: Arc<dyn StatusReporter>,
    activity: Arc<dyn ActivityReporter>,
    cancel: CancellationToken,

    state: ConnectionState,
    target: DeviceTarget,
    session: Option<Box<dyn TransportSession>>,
    port: Option<Box<dyn OutputPort>>,
    payloads: Option<PayloadReceiver>,
    reassembler: MidiReassembler,
    stats: SupervisorStats,
}

impl ConnectionSupervisor {
    pub fn new(
        config: BridgeConfig,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn OutputSink>,
        status: Arc<dyn StatusReporter>,
        activity: Arc<dyn ActivityReporter>,
    ) -> Self {
        let target = DeviceTarget::new(config.device_name.clone());
        Self {
            config,
            transport,
            sink,
            status,
            activity,
            cancel: CancellationToken::new(),
            state: ConnectionState::Idle,
            target,
            session: None,
            port: None,
            payloads: None,
            reassembler: MidiReassembler::new(),
            stats: SupervisorStats::default(),
        }
    }

    /// Handle that stops this supervisor, usable before and after `start`
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.cancel.clone())
    }

    /// Spawn the run loop on the current runtime
    pub fn start(self) -> BridgeHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        BridgeHandle::new(cancel, task)
    }

    /// Run until `Stopped`, then return the run statistics
    pub async fn run(mut self) -> SupervisorStats {
        info!(
            "Bridge starting: device '{}', auto-reconnect {}",
            self.target.name(),
            if self.config.auto_reconnect { "on" } else { "off" }
        );

        let mut transition = if self.cancel.is_cancelled() {
            self.stopped().await
        } else {
            Transition::new(
                ConnectionState::Scanning,
                format!("Scanning for '{}'", self.target.name()),
            )
        };

        loop {
            self.apply(transition);

            transition = match self.state {
                ConnectionState::Scanning => self.scan().await,
                ConnectionState::Connecting => self.connect().await,
                ConnectionState::Subscribing => self.subscribe().await,
                ConnectionState::Streaming => self.stream().await,
                ConnectionState::Disconnecting => self.disconnect().await,
                ConnectionState::Backoff => self.backoff().await,
                // Idle is only ever left, never re-entered
                ConnectionState::Idle | ConnectionState::Stopped => break,
            };
        }

        info!("Bridge finished: {}", self.stats);
        self.stats
    }

    fn apply(&mut self, transition: Transition) {
        let Transition { to, status } = transition;
        debug!("State {} -> {}", self.state, to);

        if to == ConnectionState::Backoff {
            self.stats.backoff_cycles += 1;
        }
        self.state = to;
        self.report(&status);
    }

    fn report(&self, text: &str) {
        info!("{}", text);
        self.status.report_status(text);
    }

    async fn scan(&mut self) -> Transition {
        self.stats.scan_cycles += 1;
        self.target = self.target.unresolved();

        let attempts = self.config.max_scan_attempts;
        let window = self.config.scan_timeout();

        for attempt in 1..=attempts {
            debug!(
                "Scan attempt {}/{} for '{}'",
                attempt,
                attempts,
                self.target.name()
            );

            let transport = Arc::clone(&self.transport);
            let scan = time::timeout(window + SCAN_GRACE, transport.scan(window));
            let outcome = until_stopped(&self.cancel, scan).await;

            match outcome {
                None => return self.stopped().await,
                Some(Ok(Ok(devices))) => {
                    if let Some(device) = find_device(&devices, self.target.name()) {
                        self.target = self.target.resolved(device);
                        return Transition::new(
                            ConnectionState::Connecting,
                            format!(
                                "Found {} ({}), connecting",
                                self.target.display_name(),
                                self.target.address().unwrap_or_default()
                            ),
                        );
                    }
                    debug!(
                        "'{}' not among {} device(s)",
                        self.target.name(),
                        devices.len()
                    );
                },
                Some(Ok(Err(e))) => warn!("Scan attempt {} failed: {}", attempt, e),
                Some(Err(_)) => warn!("Scan attempt {} timed out", attempt),
            }

            if attempt < attempts && !pause(&self.cancel, self.config.scan_retry_delay()).await {
                return self.stopped().await;
            }
        }

        self.fail(BridgeFailure::Discovery {
            target: self.target.name().to_string(),
            attempts,
        })
        .await
    }

    async fn connect(&mut self) -> Transition {
        let Some(device) = self.target.device().cloned() else {
            return self
                .fail(BridgeFailure::Connect {
                    device: self.target.name().to_string(),
                    source: TransportError::NotConnected,
                })
                .await;
        };

        let transport = Arc::clone(&self.transport);
        let limit = self.config.connect_timeout();
        let attempt = time::timeout(limit, transport.connect(&device.address));
        let outcome = until_stopped(&self.cancel, attempt).await;

        let result = match outcome {
            None => return self.stopped().await,
            Some(result) => result.unwrap_or_else(|_| Err(TransportError::Timeout(limit))),
        };

        match result {
            Ok(session) => {
                self.session = Some(session);
                self.stats.sessions_established += 1;
                Transition::new(
                    ConnectionState::Subscribing,
                    format!("Connected to {}, subscribing to MIDI notifications", device.name),
                )
            },
            Err(source) => {
                self.fail(BridgeFailure::Connect {
                    device: device.name,
                    source,
                })
                .await
            },
        }
    }

    async fn subscribe(&mut self) -> Transition {
        self.open_output();

        let Some(session) = self.session.as_mut() else {
            return self
                .fail(BridgeFailure::Subscribe(TransportError::NotConnected))
                .await;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let outcome = until_stopped(
            &self.cancel,
            session.subscribe(MIDI_CHARACTERISTIC_UUID, tx),
        )
        .await;

        match outcome {
            None => self.stopped().await,
            Some(Err(e)) => self.fail(BridgeFailure::Subscribe(e)).await,
            Some(Ok(())) => {
                self.reassembler.reset();
                self.payloads = Some(rx);

                let output = self
                    .port
                    .as_ref()
                    .map(|p| p.name().to_string())
                    .unwrap_or_else(|| "no MIDI output".to_string());
                Transition::new(
                    ConnectionState::Streaming,
                    format!("Streaming MIDI from {} to {}", self.target.display_name(), output),
                )
            },
        }
    }

    async fn stream(&mut self) -> Transition {
        let mut liveness = time::interval(self.config.liveness_interval());
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        liveness.tick().await;

        loop {
            let Some(payloads) = self.payloads.as_mut() else {
                return self.lost();
            };

            let wake = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Wake::Stop,
                payload = payloads.recv() => payload.map_or(Wake::QueueClosed, Wake::Payload),
                _ = liveness.tick() => Wake::Tick,
            };

            match wake {
                Wake::Stop => return self.stopped().await,
                Wake::Payload(payload) => self.forward(&payload),
                Wake::QueueClosed => {
                    debug!("Notification queue closed");
                    return self.lost();
                },
                Wake::Tick => {
                    let Some(session) = self.session.as_ref() else {
                        return self.lost();
                    };
                    let alive = until_stopped(&self.cancel, session.is_connected()).await;
                    match alive {
                        None => return self.stopped().await,
                        Some(false) => return self.lost(),
                        Some(true) => {},
                    }
                },
            }
        }
    }

    /// Push one payload through the pipeline
    fn forward(&mut self, payload: &[u8]) {
        trace!("MIDI RX <- {}", format_hex(payload));

        let Self {
            reassembler,
            port,
            activity,
            stats,
            ..
        } = self;

        for message in reassembler.feed(payload) {
            let Some(event) = translate(&message) else {
                trace!("Dropped MIDI bytes: {}", format_hex(&message));
                stats.messages_dropped += 1;
                continue;
            };

            let text = event.to_string();
            match port.as_mut().map(|p| p.write(&event)) {
                Some(Err(e)) => {
                    stats.write_failures += 1;
                    warn!("{}: {}", text, e);
                    activity.report_activity(&format!("{} (not sent: {})", text, e));
                },
                written => {
                    if written.is_some() {
                        stats.messages_forwarded += 1;
                    }
                    debug!("{}", text);
                    activity.report_activity(&text);
                },
            }
        }
    }

    fn lost(&mut self) -> Transition {
        Transition::new(
            ConnectionState::Disconnecting,
            format!("Link to {} dropped, disconnecting", self.target.display_name()),
        )
    }

    async fn disconnect(&mut self) -> Transition {
        let device = self.target.display_name().to_string();
        self.fail(BridgeFailure::TransportDrop(device)).await
    }

    async fn backoff(&mut self) -> Transition {
        if !pause(&self.cancel, self.config.scan_interval()).await {
            return self.stopped().await;
        }
        Transition::new(
            ConnectionState::Scanning,
            format!(
                "Scanning again for '{}' (retry #{})",
                self.target.name(),
                self.stats.backoff_cycles
            ),
        )
    }

    /// Open the output port if none is open; failure does not abort the connection
    fn open_output(&mut self) {
        if self.port.is_some() {
            return;
        }
        match self.try_open_output() {
            Ok(port) => {
                debug!("MIDI output ready: {}", port.name());
                self.port = Some(port);
            },
            Err(e) => {
                let failure = BridgeFailure::from(e);
                self.report(&format!("Radio connected, MIDI output unavailable: {}", failure));
            },
        }
    }

    fn try_open_output(&self) -> Result<Box<dyn OutputPort>, SinkError> {
        let ports = self.sink.list_ports()?;
        let wanted = self.config.midi_port.as_deref();
        let name = resolve_output_port(&ports, wanted).ok_or_else(|| {
            SinkError::PortNotFound(wanted.unwrap_or("<any virtual port>").to_string())
        })?;
        self.sink.open(&name)
    }

    /// Tear down, then back off or stop depending on auto-reconnect
    async fn fail(&mut self, failure: BridgeFailure) -> Transition {
        warn!("{}", failure);
        self.teardown().await;

        if self.config.auto_reconnect {
            Transition::new(
                ConnectionState::Backoff,
                format!(
                    "{}; retrying in {}s (retry #{})",
                    failure,
                    self.config.scan_interval_secs,
                    self.stats.backoff_cycles + 1
                ),
            )
        } else {
            Transition::new(
                ConnectionState::Stopped,
                format!("{}; auto-reconnect disabled, stopping", failure),
            )
        }
    }

    async fn stopped(&mut self) -> Transition {
        self.teardown().await;
        Transition::new(
            ConnectionState::Stopped,
            format!("Bridge stopped while {}", self.state.activity()),
        )
    }

    /// Release the session and the output port, best effort
    async fn teardown(&mut self) {
        // Nothing queued before this point gets processed
        self.payloads = None;

        if let Some(mut session) = self.session.take() {
            match time::timeout(TEARDOWN_TIMEOUT, session.unsubscribe()).await {
                Ok(Ok(())) => {},
                Ok(Err(e)) => debug!("Unsubscribe failed: {}", e),
                Err(_) => warn!("Unsubscribe timed out"),
            }
            match time::timeout(TEARDOWN_TIMEOUT, session.disconnect()).await {
                Ok(Ok(())) => debug!("Disconnected from {}", self.target.display_name()),
                Ok(Err(e)) => warn!("Disconnect failed: {}", e),
                Err(_) => warn!("Disconnect timed out"),
            }
        }

        if let Some(port) = self.port.take() {
            port.close();
        }

        self.reassembler.reset();
    }
}

/// Race `fut` against a stop request; `None` when the stop came first
async fn until_stopped<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

/// Cancellable sleep; false when interrupted by a stop request
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    until_stopped(cancel, time::sleep(duration)).await.is_some()
}
