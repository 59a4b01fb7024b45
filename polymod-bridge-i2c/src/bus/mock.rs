//! Mock bus for testing

use super::{BusCommand, BusTransport, TransportCommand, TransportError};
use crate::decoder::END_MARKER;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One transaction seen by the mock, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write(TransportCommand),
    Read { address: u8, max_bytes: usize },
}

/// Scripted in-memory bus.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// bridge owns another.
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

#[derive(Default)]
struct MockBusInner {
    responses: HashMap<u8, VecDeque<Vec<u8>>>,
    transactions: Vec<Transaction>,
    fail_reads: VecDeque<String>,
    fail_reads_from: HashMap<u8, VecDeque<String>>,
    fail_writes: VecDeque<String>,
}

impl MockBus {
    /// Create a new mock bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the buffer returned by the next read of `address`.
    ///
    /// With nothing queued, reads return a buffer of end markers.
    pub fn queue_read(&self, address: u8, data: &[u8]) {
        self.lock()
            .responses
            .entry(address)
            .or_default()
            .push_back(data.to_vec());
    }

    /// Make the next read fail.
    pub fn fail_next_read(&self, reason: &str) {
        self.lock().fail_reads.push_back(reason.to_string());
    }

    /// Make the next read of `address` fail.
    pub fn fail_next_read_from(&self, address: u8, reason: &str) {
        self.lock()
            .fail_reads_from
            .entry(address)
            .or_default()
            .push_back(reason.to_string());
    }

    /// Make the next write fail.
    pub fn fail_next_write(&self, reason: &str) {
        self.lock().fail_writes.push_back(reason.to_string());
    }

    /// All transactions so far, failed ones included.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().transactions.clone()
    }

    /// All write transactions so far.
    pub fn writes(&self) -> Vec<TransportCommand> {
        self.lock()
            .transactions
            .iter()
            .filter_map(|t| match t {
                Transaction::Write(cmd) => Some(cmd.clone()),
                Transaction::Read { .. } => None,
            })
            .collect()
    }

    /// Number of writes issued with `command`.
    pub fn count_writes(&self, command: BusCommand) -> usize {
        self.writes()
            .iter()
            .filter(|cmd| cmd.command == command)
            .count()
    }

    /// Forget recorded transactions.
    pub fn clear_transactions(&self) {
        self.lock().transactions.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockBusInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BusTransport for MockBus {
    fn write_control(
        &mut self,
        address: u8,
        command: BusCommand,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.transactions.push(Transaction::Write(TransportCommand {
            address,
            command,
            payload: payload.to_vec(),
        }));

        match inner.fail_writes.pop_front() {
            Some(reason) => Err(TransportError::new(address, command, reason)),
            None => Ok(()),
        }
    }

    fn read_changes(
        &mut self,
        address: u8,
        command: BusCommand,
        max_bytes: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let mut inner = self.lock();
        inner
            .transactions
            .push(Transaction::Read { address, max_bytes });

        let failure = inner
            .fail_reads_from
            .get_mut(&address)
            .and_then(VecDeque::pop_front);
        if let Some(reason) = failure.or_else(|| inner.fail_reads.pop_front()) {
            return Err(TransportError::new(address, command, reason));
        }

        let data = inner
            .responses
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| vec![END_MARKER; max_bytes]);

        Ok(data)
    }
}
