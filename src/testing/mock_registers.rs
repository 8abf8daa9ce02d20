//! In-memory stand-in for the MAC-PHY register interface.

use std::collections::{HashMap, VecDeque};

use crate::protocol::ptp::registers::{OA_STATUS0, RegisterAccess};

/// Scriptable [`RegisterAccess`] implementation.
///
/// Reads complete after `read_latency` calls to [`service`](RegisterAccess::service)
/// (zero means immediately). Writes to `OA_STATUS0` clear the written bits,
/// every other write stores the value.
#[derive(Debug, Default, Clone)]
pub struct MockRegisters {
    values: HashMap<u32, u32>,
    /// Service calls before an issued read completes.
    pub read_latency: u32,
    pending: Option<(u32, u32)>,
    completed: Option<u32>,
    reject_reads: u32,
    reject_writes: u32,
    writes: Vec<(u32, u32)>,
    reads: Vec<u32>,
    read_script: HashMap<u32, VecDeque<u32>>,
}

impl MockRegisters {
    /// Registers that complete reads on the next service call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_latency: 1,
            ..Self::default()
        }
    }

    /// Set a register value.
    pub fn set(&mut self, addr: u32, value: u32) {
        self.values.insert(addr, value);
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, addr: u32, value: u32) -> Self {
        self.set(addr, value);
        self
    }

    /// Current register value (zero if never written).
    #[must_use]
    pub fn get(&self, addr: u32) -> u32 {
        self.values.get(&addr).copied().unwrap_or(0)
    }

    /// Queue values returned by successive reads of `addr`, ahead of its stored value.
    pub fn script_reads(&mut self, addr: u32, values: impl IntoIterator<Item = u32>) {
        self.read_script.entry(addr).or_default().extend(values);
    }

    /// Refuse the next `count` read requests.
    pub fn reject_reads(&mut self, count: u32) {
        self.reject_reads = count;
    }

    /// Refuse the next `count` write requests.
    pub fn reject_writes(&mut self, count: u32) {
        self.reject_writes = count;
    }

    /// Accepted writes in order.
    #[must_use]
    pub fn writes(&self) -> &[(u32, u32)] {
        &self.writes
    }

    /// Accepted writes to `addr`, in order.
    #[must_use]
    pub fn writes_to(&self, addr: u32) -> Vec<u32> {
        self.writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Accepted read addresses in order.
    #[must_use]
    pub fn reads(&self) -> &[u32] {
        &self.reads
    }

    /// Forget recorded traffic.
    pub fn clear_log(&mut self) {
        self.writes.clear();
        self.reads.clear();
    }

    fn next_read_value(&mut self, addr: u32) -> u32 {
        self.read_script
            .get_mut(&addr)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.get(addr))
    }
}

impl RegisterAccess for MockRegisters {
    fn write(&mut self, addr: u32, value: u32) -> bool {
        if self.reject_writes > 0 {
            self.reject_writes -= 1;
            return false;
        }
        self.writes.push((addr, value));
        if addr == OA_STATUS0 {
            let current = self.get(addr);
            self.values.insert(addr, current & !value);
        } else {
            self.values.insert(addr, value);
        }
        true
    }

    fn read(&mut self, addr: u32) -> bool {
        if self.reject_reads > 0 {
            self.reject_reads -= 1;
            return false;
        }
        self.reads.push(addr);
        let value = self.next_read_value(addr);
        if self.read_latency == 0 {
            self.completed = Some(value);
        } else {
            self.pending = Some((value, self.read_latency));
        }
        true
    }

    fn poll_complete(&mut self) -> Option<u32> {
        self.completed.take()
    }

    fn service(&mut self) {
        if let Some((value, remaining)) = self.pending {
            if remaining <= 1 {
                self.pending = None;
                self.completed = Some(value);
            } else {
                self.pending = Some((value, remaining - 1));
            }
        }
    }
}
