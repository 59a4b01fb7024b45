//! Poll loop: configure the modules, tick, pull changes, recover on failure.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::bus::{BusHandle, BusTransport, TransportCommand, TransportError};
use crate::decoder::RecordDecoder;
use crate::endpoint::MessageSink;
use crate::translator;

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    /// Send the buffer size and a full state request.
    Configuring,
    /// Broadcast the liveness ticks.
    Ticking,
    /// Pull and publish the changes of every module.
    Polling,
    /// Wait out the backoff after a bus failure.
    Recovering,
}

impl PollState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Configuring => "configuring",
            PollState::Ticking => "ticking",
            PollState::Polling => "polling",
            PollState::Recovering => "recovering",
        }
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Poll loop parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// Module addresses polled in order.
    pub modules: Vec<u8>,
    /// Record buffer size announced to modules and read back per poll.
    pub changes_max_size: u8,
    /// Liveness ticks broadcast per cycle.
    pub tick_count: u8,
    /// Pause before reconfiguring after a bus failure.
    pub backoff: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            modules: vec![4],
            changes_max_size: 12,
            tick_count: 32,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Counters since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Completed polling passes.
    pub cycles: u64,
    /// Records published.
    pub records: u64,
    /// Bus failures that forced a recovery.
    pub transport_failures: u64,
    /// Malformed change buffers.
    pub protocol_errors: u64,
}

/// Drives the bus through configure, tick and poll, forever.
pub struct PollScheduler<B, S> {
    bus: BusHandle<B>,
    sink: S,
    settings: PollSettings,
    state: PollState,
    stats: PollStats,
}

impl<B: BusTransport, S: MessageSink> PollScheduler<B, S> {
    pub fn new(bus: BusHandle<B>, sink: S, settings: PollSettings) -> Self {
        Self {
            bus,
            sink,
            settings,
            state: PollState::Configuring,
            stats: PollStats::default(),
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    /// Run the poll loop for the lifetime of the task.
    pub async fn run(mut self) {
        info!(
            modules = ?self.settings.modules,
            changes_max_size = self.settings.changes_max_size,
            "Starting poll loop"
        );

        loop {
            self.step().await;
        }
    }

    /// Execute the current state and move to the next one.
    ///
    /// Any bus failure moves to [`PollState::Recovering`]; records already
    /// published in the failed pass stay published.
    pub async fn step(&mut self) -> PollState {
        let result = match self.state {
            PollState::Configuring => self.configure().map(|()| PollState::Ticking),
            PollState::Ticking => self.tick().map(|()| PollState::Polling),
            PollState::Polling => match self.poll() {
                Ok(()) => {
                    // The only suspension point of a healthy loop; inbound
                    // messages are dispatched here.
                    tokio::task::yield_now().await;
                    Ok(PollState::Ticking)
                }
                Err(e) => Err(e),
            },
            PollState::Recovering => {
                tokio::time::sleep(self.settings.backoff).await;
                Ok(PollState::Configuring)
            }
        };

        self.state = match result {
            Ok(next) => next,
            Err(e) => {
                self.stats.transport_failures += 1;
                error!(
                    state = %self.state,
                    error = %e,
                    backoff_ms = self.settings.backoff.as_millis() as u64,
                    "Bus error, restarting from configuration"
                );
                PollState::Recovering
            }
        };

        self.state
    }

    fn configure(&self) -> Result<(), TransportError> {
        debug!(
            changes_max_size = self.settings.changes_max_size,
            "Configuring modules"
        );
        self.bus
            .execute(&TransportCommand::configure(self.settings.changes_max_size))?;
        self.bus.execute(&TransportCommand::request_full_state())
    }

    fn tick(&self) -> Result<(), TransportError> {
        for index in 0..self.settings.tick_count {
            self.bus.execute(&TransportCommand::tick(index))?;
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<(), TransportError> {
        let max_bytes = usize::from(self.settings.changes_max_size);
        let mut published = 0;

        for &module in &self.settings.modules {
            let buf = self.bus.read_changes(module, max_bytes)?;

            for item in RecordDecoder::new(module, &buf) {
                match item {
                    Ok(record) => {
                        self.sink.send(&translator::to_outbound(&record));
                        published += 1;
                    }
                    Err(e) => {
                        self.stats.protocol_errors += 1;
                        warn!(module, error = %e, buffer = ?buf, "Malformed change buffer");
                    }
                }
            }
        }

        self.stats.cycles += 1;
        self.stats.records += published;
        if published > 0 {
            debug!(records = published, stats = ?self.stats, "Poll cycle complete");
        }

        Ok(())
    }
}
