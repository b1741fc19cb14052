//! Driver for the Struck SIS3302 8 channel 100 MHz 16 bit flash ADC.
//!
//! The handle owns nothing but a reference to the bus and the module base address. All state
//! lives in the module registers and is read back from the hardware whenever it is needed, so two
//! handles on the same module never disagree.
//!
//! Every operation locks the shared bus once for its whole duration. A multi-page readout or a
//! read-modify-write therefore can't interleave with another handle in this process, but nothing
//! stops two processes from racing on the same module.

pub mod acquisition;
pub mod irq;
pub mod readout;
pub mod registers;
pub mod timestamps;

pub use self::{
    acquisition::AcquisitionConfig,
    registers::{Adc, AdcRegister, ClockSource, PageSize},
};

use self::registers::{ModuleId, KEY_RESET};
use crate::{
    core::{RegisterWord, Window},
    transport::{self, VmeBus},
};
use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid {what} `{value}`, expected {expected}")]
    InvalidArgument {
        what: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("Invalid {what} index {index}, expected {expected}")]
    InvalidIndex {
        what: &'static str,
        index: usize,
        expected: &'static str,
    },
    #[error(transparent)]
    Bus(transport::Error),
    #[error("No interrupt on IRQ mask {mask:#04x} within {timeout:?}")]
    Timeout { mask: u8, timeout: Duration },
    #[error("Read samples don't fit the requested event matrix")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Register doesn't fit its packed representation")]
    Packing(#[from] packed_struct::PackingError),
    #[error("The bus this module sits on has been dropped")]
    Disconnected,
    #[error("Another user of the bus panicked while holding it")]
    Poisoned,
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        match e {
            transport::Error::IrqTimeout { mask, timeout } => Error::Timeout { mask, timeout },
            e => Error::Bus(e),
        }
    }
}

/// Read the register at `offset` into its packed representation
pub(crate) fn read_register<B, R>(window: &mut Window<'_, B>, offset: u32) -> Result<R, Error>
where
    B: VmeBus,
    R: RegisterWord,
{
    Ok(R::from_word(window.read_d32(offset)?)?)
}

/// Write the packed register `reg` to `offset`
pub(crate) fn write_register<B, R>(
    window: &mut Window<'_, B>,
    offset: u32,
    reg: &R,
) -> Result<(), Error>
where
    B: VmeBus,
    R: RegisterWord,
{
    Ok(window.write_d32(offset, reg.to_word()?)?)
}

/// A SIS3302 flash ADC at a fixed base address
#[derive(Debug)]
pub struct Sis3302<B> {
    /// Upwards pointer to the shared bus
    bus: Weak<Mutex<B>>,
    /// A32 base address set by the module's rotary switches
    base_address: u32,
}

impl<B> Sis3302<B>
where
    B: VmeBus,
{
    /// Attach to the module at `base_address` and reset it to factory defaults
    /// # Errors
    /// Returns an error on bad transport
    pub fn new(bus: &Arc<Mutex<B>>, base_address: u32) -> Result<Self, Error> {
        let fadc = Self {
            bus: Arc::downgrade(bus),
            base_address,
        };
        fadc.reset()?;
        Ok(fadc)
    }

    #[must_use]
    pub fn base_address(&self) -> u32 {
        self.base_address
    }

    /// Run `f` with the bus locked and addressed relative to this module
    fn with_bus<R>(
        &self,
        f: impl FnOnce(&mut Window<'_, B>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let bus = self.bus.upgrade().ok_or(Error::Disconnected)?;
        let mut guard = bus.lock().map_err(|_| Error::Poisoned)?;
        let mut window = Window::new(&mut *guard, self.base_address);
        f(&mut window)
    }

    /// Write one of the key registers, where the access itself triggers the action
    fn key(&self, key: u32) -> Result<(), Error> {
        self.with_bus(|w| Ok(w.write_d32(key, 1)?))
    }

    /// Resets all settings to factory defaults and disarms the sampling logic
    /// # Errors
    /// Returns an error on bad transport
    pub fn reset(&self) -> Result<(), Error> {
        debug!("reset");
        self.key(KEY_RESET)
    }

    /// Reads the module id and firmware revision
    /// # Errors
    /// Returns an error on bad transport
    pub fn module_id(&self) -> Result<ModuleId, Error> {
        debug!("get module ID");
        self.with_bus(|w| read_register(w, <ModuleId as crate::core::FixedOffset>::OFFSET))
    }

    /// The model and firmware revision as a human readable string, e.g. `SIS 3302 (FW 1.4.0.6)`
    /// # Errors
    /// Returns an error on bad transport
    pub fn module_identity(&self) -> Result<String, Error> {
        Ok(self.module_id()?.identity())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        core::share,
        transport::mock::{Access, Mock},
    };

    pub(crate) const BASE: u32 = 0x3000_0000;

    /// A freshly constructed module on a mock bus, with the construction accesses cleared
    pub(crate) fn fadc() -> (Arc<Mutex<Mock>>, Sis3302<Mock>) {
        let bus = share(Mock::new());
        let fadc = Sis3302::new(&bus, BASE).unwrap();
        bus.lock().unwrap().clear_log();
        (bus, fadc)
    }

    #[test]
    fn test_new_resets() {
        let bus = share(Mock::new());
        let _fadc = Sis3302::new(&bus, BASE).unwrap();
        assert_eq!(
            bus.lock().unwrap().log(),
            &[Access::WriteD32 {
                address: BASE + KEY_RESET,
                data: 1
            }]
        );
    }

    #[test]
    fn test_module_identity() {
        let (bus, fadc) = fadc();
        bus.lock()
            .unwrap()
            .poke(BASE + registers::MODULE_ID, 0x3302_1406);
        assert_eq!(fadc.module_identity().unwrap(), "SIS 3302 (FW 1.4.0.6)");
        assert_eq!(fadc.module_id().unwrap().major_revision, 0x14);
    }

    #[test]
    fn test_bus_error_propagates() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().inject_fault(BASE + KEY_RESET);
        assert!(matches!(
            fadc.reset(),
            Err(Error::Bus(transport::Error::Bus { address })) if address == BASE + KEY_RESET
        ));
    }

    #[test]
    fn test_disconnected() {
        let (bus, fadc) = fadc();
        drop(bus);
        assert!(matches!(fadc.reset(), Err(Error::Disconnected)));
    }

    #[test]
    fn test_handles_share_hardware_state() {
        let (bus, first) = fadc();
        let second = Sis3302::new(&bus, BASE).unwrap();
        first.set_start_delay(42).unwrap();
        assert_eq!(second.start_delay().unwrap(), 42);
    }
}
