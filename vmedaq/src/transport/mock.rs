//! Mock bus implementation used in testing the drivers

use super::{Error, TransportResult, VmeBus};
use anyhow::anyhow;
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    time::Duration,
};

/// One bus access as seen by the mock, in issue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    ReadD16 { address: u32 },
    ReadD32 { address: u32 },
    WriteD16 { address: u32, data: u16 },
    WriteD32 { address: u32, data: u32 },
    BlockReadD16 { address: u32, n: usize },
    BlockReadD32 { address: u32, n: usize },
    IrqEnable { mask: u8 },
    IrqDisable { mask: u8 },
    IrqCheck,
    IrqWait { mask: u8 },
    Iack { level_bits: u8 },
}

/// A bus that mocks reads and writes, useful for testing
#[derive(Debug, Default)]
pub struct Mock {
    /// Single-word memory, lazily populated. Unwritten words read as zero.
    memory: HashMap<u32, u32>,
    /// Addresses that behave like J/K registers (low half sets, high half clears)
    jk: HashSet<u32>,
    /// Data handed out by 16-bit block transfers, per start address
    blocks_d16: HashMap<u32, VecDeque<u16>>,
    /// Data handed out by 32-bit block transfers, per start address
    blocks_d32: HashMap<u32, VecDeque<u32>>,
    /// Addresses that answer with a bus error
    faults: HashSet<u32>,
    /// Addresses that answer with a bus error once their remaining accesses are used up
    countdowns: HashMap<u32, usize>,
    /// Enabled IRQ lines
    irq_mask: u8,
    /// Pending interrupts, IRQ level to vector
    pending: BTreeMap<u8, u32>,
    log: Vec<Access>,
}

impl Mock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes to `address` behave like a J/K register
    pub fn declare_jk(&mut self, address: u32) {
        self.jk.insert(address);
    }

    /// Preset the word at `address` without logging an access
    pub fn poke(&mut self, address: u32, value: u32) {
        self.memory.insert(address, value);
    }

    /// Inspect the word at `address` without logging an access
    #[must_use]
    pub fn peek(&self, address: u32) -> u32 {
        self.memory.get(&address).copied().unwrap_or_default()
    }

    /// Queue words that subsequent 16-bit block transfers from `address` will return
    pub fn queue_d16(&mut self, address: u32, data: impl IntoIterator<Item = u16>) {
        self.blocks_d16.entry(address).or_default().extend(data);
    }

    /// Queue words that subsequent 32-bit block transfers from `address` will return
    pub fn queue_d32(&mut self, address: u32, data: impl IntoIterator<Item = u32>) {
        self.blocks_d32.entry(address).or_default().extend(data);
    }

    /// Any access touching `address` from now on fails with a bus error
    pub fn inject_fault(&mut self, address: u32) {
        self.faults.insert(address);
    }

    /// The first `n` accesses touching `address` from now on succeed, every later one fails with
    /// a bus error
    pub fn fail_after(&mut self, address: u32, n: usize) {
        self.countdowns.insert(address, n);
    }

    /// Assert the IRQ line `level` (1..=7) with `vector`
    pub fn raise_irq(&mut self, level: u8, vector: u32) {
        self.pending.insert(level, vector);
    }

    /// All the accesses issued so far
    #[must_use]
    pub fn log(&self) -> &[Access] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// The values of every 32-bit write to `address`, in order
    #[must_use]
    pub fn writes_to(&self, address: u32) -> Vec<u32> {
        self.log
            .iter()
            .filter_map(|access| match access {
                Access::WriteD32 { address: a, data } if *a == address => Some(*data),
                _ => None,
            })
            .collect()
    }

    fn check(&mut self, address: u32) -> TransportResult<()> {
        if self.faults.contains(&address) {
            return Err(Error::Bus { address });
        }
        if let Some(remaining) = self.countdowns.get_mut(&address) {
            if *remaining == 0 {
                return Err(Error::Bus { address });
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn pending_mask(&self) -> u8 {
        self.pending
            .keys()
            .fold(0u8, |mask, level| mask | (1 << (level - 1)))
    }
}

impl VmeBus for Mock {
    #[allow(clippy::cast_possible_truncation)]
    fn read_d16(&mut self, address: u32) -> TransportResult<u16> {
        self.log.push(Access::ReadD16 { address });
        self.check(address)?;
        Ok((self.peek(address) & 0xFFFF) as u16)
    }

    fn read_d32(&mut self, address: u32) -> TransportResult<u32> {
        self.log.push(Access::ReadD32 { address });
        self.check(address)?;
        Ok(self.peek(address))
    }

    fn block_read_d16(&mut self, address: u32, n: usize) -> TransportResult<Vec<u16>> {
        self.log.push(Access::BlockReadD16 { address, n });
        self.check(address)?;
        let queue = self.blocks_d16.entry(address).or_default();
        // Short transfer once the queued data runs out
        let take = n.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    fn block_read_d32(&mut self, address: u32, n: usize) -> TransportResult<Vec<u32>> {
        self.log.push(Access::BlockReadD32 { address, n });
        self.check(address)?;
        let queue = self.blocks_d32.entry(address).or_default();
        let take = n.min(queue.len());
        Ok(queue.drain(..take).collect())
    }

    fn write_d16(&mut self, address: u32, data: u16) -> TransportResult<()> {
        self.log.push(Access::WriteD16 { address, data });
        self.check(address)?;
        self.memory.insert(address, u32::from(data));
        Ok(())
    }

    fn write_d32(&mut self, address: u32, data: u32) -> TransportResult<()> {
        self.log.push(Access::WriteD32 { address, data });
        self.check(address)?;
        let value = if self.jk.contains(&address) {
            let set = data & 0xFFFF;
            let clear = data >> 16;
            (self.peek(address) | set) & !clear
        } else {
            data
        };
        self.memory.insert(address, value);
        Ok(())
    }

    fn irq_enable(&mut self, mask: u8) -> TransportResult<()> {
        self.log.push(Access::IrqEnable { mask });
        self.irq_mask |= mask;
        Ok(())
    }

    fn irq_disable(&mut self, mask: u8) -> TransportResult<()> {
        self.log.push(Access::IrqDisable { mask });
        self.irq_mask &= !mask;
        Ok(())
    }

    fn irq_check(&mut self) -> TransportResult<u8> {
        self.log.push(Access::IrqCheck);
        Ok(self.pending_mask())
    }

    fn irq_wait(&mut self, mask: u8, timeout: Duration) -> TransportResult<()> {
        self.log.push(Access::IrqWait { mask });
        // Nothing will ever change while we wait, so answer right away
        if self.pending_mask() & self.irq_mask & mask != 0 {
            Ok(())
        } else {
            Err(Error::IrqTimeout { mask, timeout })
        }
    }

    fn iack_cycle(&mut self, level_bits: u8) -> TransportResult<u32> {
        self.log.push(Access::Iack { level_bits });
        let level = self
            .pending
            .keys()
            .copied()
            .find(|level| (1 << (level - 1)) & level_bits != 0)
            .ok_or_else(|| anyhow!("No interrupt pending on IRQ bits {level_bits:#04x}"))?;
        self.pending
            .remove(&level)
            .ok_or_else(|| anyhow!("Interrupt on level {level} vanished").into())
    }
}
