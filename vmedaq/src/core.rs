//! The core types shared by every module driver
use crate::transport::{TransportResult, VmeBus};
use std::sync::{Arc, Mutex};

/// A bus shared between every module sitting in the same crate
pub type SharedBus<B> = Arc<Mutex<B>>;

/// Wrap a bus so that module handles can share it
pub fn share<B>(bus: B) -> SharedBus<B>
where
    B: VmeBus,
{
    Arc::new(Mutex::new(bus))
}

/// 32-bit registers that are described as packed structs
pub trait RegisterWord: Sized {
    /// Decode the register from the raw bus word
    /// # Errors
    /// Returns an error if a field can't represent its bits
    fn from_word(word: u32) -> packed_struct::PackingResult<Self>;

    /// Encode the register into the raw bus word
    /// # Errors
    /// Returns an error if a field can't be packed
    fn to_word(&self) -> packed_struct::PackingResult<u32>;
}

/// Registers living at one offset from the module base address
pub trait FixedOffset {
    const OFFSET: u32;
}

/// The address window of one module on a locked bus. All offsets are relative to the module
/// base address.
#[derive(Debug)]
pub struct Window<'a, B> {
    bus: &'a mut B,
    base: u32,
}

impl<'a, B> Window<'a, B>
where
    B: VmeBus,
{
    pub fn new(bus: &'a mut B, base: u32) -> Self {
        Self { bus, base }
    }

    fn address(&self, offset: u32) -> u32 {
        self.base.wrapping_add(offset)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn read_d32(&mut self, offset: u32) -> TransportResult<u32> {
        let address = self.address(offset);
        self.bus.read_d32(address)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn write_d32(&mut self, offset: u32, data: u32) -> TransportResult<()> {
        let address = self.address(offset);
        self.bus.write_d32(address, data)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn block_read_d16(&mut self, offset: u32, n: usize) -> TransportResult<Vec<u16>> {
        let address = self.address(offset);
        self.bus.block_read_d16(address, n)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn block_read_d32(&mut self, offset: u32, n: usize) -> TransportResult<Vec<u32>> {
        let address = self.address(offset);
        self.bus.block_read_d32(address, n)
    }

    /// The bus itself, for the calls that are not tied to an address (interrupt handling)
    pub fn bus(&mut self) -> &mut B {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{Access, Mock};

    #[test]
    fn test_window_offsets() {
        let mut bus = Mock::new();
        let mut window = Window::new(&mut bus, 0x3000_0000);
        window.write_d32(0x14, 7).unwrap();
        assert_eq!(window.read_d32(0x14).unwrap(), 7);
        assert_eq!(
            bus.log(),
            &[
                Access::WriteD32 {
                    address: 0x3000_0014,
                    data: 7
                },
                Access::ReadD32 {
                    address: 0x3000_0014
                },
            ]
        );
    }
}
