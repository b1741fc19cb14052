//! Defines the bus access every VME transport (controller bridge) must implement

pub mod mock;

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bus error at address {address:#010x}")]
    Bus { address: u32 },
    #[error("No interrupt on IRQ mask {mask:#04x} within {timeout:?}")]
    IrqTimeout { mask: u8, timeout: Duration },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type TransportResult<T> = Result<T, Error>;

/// The trait that is implemented for VME bus controllers.
/// The methods of this trait *assume* that the controller is already initialised and that
/// addresses are absolute A32 bus addresses.
pub trait VmeBus {
    /// Read a single 16-bit word from `address`
    fn read_d16(&mut self, address: u32) -> TransportResult<u16>;

    /// Read a single 32-bit word from `address`
    fn read_d32(&mut self, address: u32) -> TransportResult<u32>;

    /// Block-transfer `n` 16-bit words starting at `address`.
    /// Implementations may return fewer words than requested if the transfer was cut short.
    fn block_read_d16(&mut self, address: u32, n: usize) -> TransportResult<Vec<u16>>;

    /// Block-transfer `n` 32-bit words starting at `address`
    fn block_read_d32(&mut self, address: u32, n: usize) -> TransportResult<Vec<u32>>;

    /// Write a single 16-bit word `data` to `address`
    fn write_d16(&mut self, address: u32, data: u16) -> TransportResult<()>;

    /// Write a single 32-bit word `data` to `address`
    fn write_d32(&mut self, address: u32, data: u32) -> TransportResult<()>;

    /// Enables the IRQ lines in `mask` (bit 0 is IRQ1)
    fn irq_enable(&mut self, mask: u8) -> TransportResult<()>;

    /// Disables the IRQ lines in `mask`
    fn irq_disable(&mut self, mask: u8) -> TransportResult<()>;

    /// Returns the mask of currently asserted IRQ lines
    fn irq_check(&mut self) -> TransportResult<u8>;

    /// Blocks until one of the IRQ lines in `mask` asserts or `timeout` elapses, in which case
    /// [`Error::IrqTimeout`] is returned
    fn irq_wait(&mut self, mask: u8, timeout: Duration) -> TransportResult<()>;

    /// Runs an interrupt acknowledge cycle on the line selected by `level_bits` and returns the
    /// vector the interrupter placed on the bus
    fn iack_cycle(&mut self, level_bits: u8) -> TransportResult<u32>;
}
