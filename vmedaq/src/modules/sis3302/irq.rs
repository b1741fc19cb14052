//! Interrupt configuration of the module and the bus interrupt handling around it

use super::{
    read_register,
    registers::{irq_source_bit, jk_clear, jk_set, IrqConfig, IRQ_CONTROL, IRQ_SOURCES},
    write_register, Error, Sis3302,
};
use crate::{
    core::{FixedOffset, Window},
    transport::VmeBus,
};
use std::time::Duration;
use tracing::debug;

/// Highest bus IRQ level
const MAX_IRQ_LEVEL: u8 = 7;

fn check_vector(vector: u32) -> Result<u8, Error> {
    u8::try_from(vector).map_err(|_| Error::InvalidArgument {
        what: "IRQ vector",
        value: vector.to_string(),
        expected: "0..=255",
    })
}

fn check_level(level: u8) -> Result<u8, Error> {
    if level > MAX_IRQ_LEVEL {
        return Err(Error::InvalidArgument {
            what: "IRQ level",
            value: level.to_string(),
            expected: "0..=7",
        });
    }
    Ok(level)
}

fn check_source(src: u8) -> Result<u8, Error> {
    if src >= IRQ_SOURCES {
        return Err(Error::InvalidArgument {
            what: "IRQ source",
            value: src.to_string(),
            expected: "0 or 1",
        });
    }
    Ok(src)
}

/// The level bits of the bus interrupt acknowledge cycle for `level`
fn level_bits(level: u8) -> Result<u8, Error> {
    if (1..=MAX_IRQ_LEVEL).contains(&level) {
        Ok(1 << (level - 1))
    } else {
        Err(Error::InvalidArgument {
            what: "interrupt level",
            value: level.to_string(),
            expected: "1..=7",
        })
    }
}

fn update_irq_config<B: VmeBus>(
    w: &mut Window<'_, B>,
    f: impl FnOnce(&mut IrqConfig),
) -> Result<(), Error> {
    let mut config: IrqConfig = read_register(w, IrqConfig::OFFSET)?;
    f(&mut config);
    write_register(w, IrqConfig::OFFSET, &config)
}

impl<B> Sis3302<B>
where
    B: VmeBus,
{
    /// Lets the module raise its interrupt
    /// # Errors
    /// Returns an error on bad transport
    pub fn enable_irq(&self) -> Result<(), Error> {
        debug!("enable IRQ");
        self.with_bus(|w| update_irq_config(w, |c| c.enable = true))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn disable_irq(&self) -> Result<(), Error> {
        debug!("disable IRQ");
        self.with_bus(|w| update_irq_config(w, |c| c.enable = false))
    }

    /// Sets the vector the module answers interrupt acknowledge cycles with
    /// # Errors
    /// Returns [`Error::InvalidArgument`] above 255, before touching the bus
    pub fn set_irq_vector(&self, vector: u32) -> Result<(), Error> {
        let vector = check_vector(vector)?;
        debug!("set IRQ vector to {vector:#04x}");
        self.with_bus(|w| update_irq_config(w, |c| c.vector = vector))
    }

    /// Sets the bus level the interrupt is raised on
    /// # Errors
    /// Returns [`Error::InvalidArgument`] above 7, before touching the bus
    pub fn set_irq_level(&self, level: u8) -> Result<(), Error> {
        let level = check_level(level)?;
        debug!("set IRQ level to {level}");
        self.with_bus(|w| update_irq_config(w, |c| c.level = level.into()))
    }

    /// Sets vector, level and enable in a single register update
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a bad vector or level, before touching the bus
    pub fn configure_irq(&self, vector: u32, level: u8, enable: bool) -> Result<(), Error> {
        let vector = check_vector(vector)?;
        let level = check_level(level)?;
        debug!("configure IRQ: vector {vector:#04x}, level {level}, enable {enable}");
        self.with_bus(|w| {
            update_irq_config(w, |c| {
                c.vector = vector;
                c.level = level.into();
                c.enable = enable;
            })
        })
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn irq_configuration(&self) -> Result<IrqConfig, Error> {
        self.with_bus(|w| read_register(w, IrqConfig::OFFSET))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn irq_vector(&self) -> Result<u8, Error> {
        Ok(self.irq_configuration()?.vector)
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn irq_level(&self) -> Result<u8, Error> {
        Ok(self.irq_configuration()?.level.into())
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn irq_enabled(&self) -> Result<bool, Error> {
        Ok(self.irq_configuration()?.enable)
    }

    /// The raw IRQ control register, source enables in the low half and status above
    /// # Errors
    /// Returns an error on bad transport
    pub fn irq_control(&self) -> Result<u32, Error> {
        self.with_bus(|w| Ok(w.read_d32(IRQ_CONTROL)?))
    }

    /// Enables interrupt source `src`
    /// # Errors
    /// Returns [`Error::InvalidArgument`] unless `src` is 0 or 1, before touching the bus
    pub fn enable_irq_source(&self, src: u8) -> Result<(), Error> {
        let bit = irq_source_bit(check_source(src)?);
        debug!("enable IRQ source {src}");
        self.with_bus(|w| Ok(w.write_d32(IRQ_CONTROL, jk_set(bit))?))
    }

    /// Disables interrupt source `src`
    /// # Errors
    /// Returns [`Error::InvalidArgument`] unless `src` is 0 or 1, before touching the bus
    pub fn disable_irq_source(&self, src: u8) -> Result<(), Error> {
        let bit = irq_source_bit(check_source(src)?);
        debug!("disable IRQ source {src}");
        self.with_bus(|w| Ok(w.write_d32(IRQ_CONTROL, jk_clear(bit))?))
    }

    /// # Errors
    /// Returns [`Error::InvalidArgument`] unless `src` is 0 or 1
    pub fn irq_source_enabled(&self, src: u8) -> Result<bool, Error> {
        let bit = irq_source_bit(check_source(src)?);
        Ok(self.irq_control()? & bit != 0)
    }

    /// Enables the bus IRQ lines in `mask` on the controller (bit 0 is IRQ1)
    /// # Errors
    /// Returns an error on bad transport
    pub fn enable_irq_lines(&self, mask: u8) -> Result<(), Error> {
        debug!("enable IRQ lines {mask:#04x}");
        self.with_bus(|w| Ok(w.bus().irq_enable(mask)?))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn disable_irq_lines(&self, mask: u8) -> Result<(), Error> {
        debug!("disable IRQ lines {mask:#04x}");
        self.with_bus(|w| Ok(w.bus().irq_disable(mask)?))
    }

    /// Blocks until one of the IRQ lines in `mask` asserts. The bus stays locked for the whole
    /// wait, so run this from the thread that owns the module.
    /// # Errors
    /// Returns [`Error::Timeout`] if nothing asserts within `timeout`, or an error on bad
    /// transport
    pub fn wait_for_irq(&self, mask: u8, timeout: Duration) -> Result<(), Error> {
        debug!("wait for IRQ mask {mask:#04x} for {timeout:?}");
        self.with_bus(|w| Ok(w.bus().irq_wait(mask, timeout)?))
    }

    /// Runs the interrupt acknowledge cycle for bus level `level` and returns the vector
    /// # Errors
    /// Returns [`Error::InvalidArgument`] outside of 1..=7, or an error on bad transport
    pub fn acknowledge_interrupt(&self, level: u8) -> Result<u32, Error> {
        let bits = level_bits(level)?;
        debug!("acknowledge interrupt on level {level}");
        self.with_bus(|w| Ok(w.bus().iack_cycle(bits)?))
    }

    /// The highest bus IRQ level currently asserted, if any
    /// # Errors
    /// Returns an error on bad transport
    pub fn check_irq(&self) -> Result<Option<u8>, Error> {
        let pending = self.with_bus(|w| Ok(w.bus().irq_check()?))?;
        Ok((1..=MAX_IRQ_LEVEL)
            .rev()
            .find(|level| pending & (1 << (level - 1)) != 0))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::{
            registers::IRQ_CONFIG,
            tests::{fadc, BASE},
        },
        *,
    };
    use crate::transport::mock::Access;

    const PATTERN: u32 = 0xA5A5_F5A5;

    #[test]
    fn test_set_irq_vector_preserves_bits() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().poke(BASE + IRQ_CONFIG, PATTERN);
        fadc.set_irq_vector(0x42).unwrap();
        assert_eq!(bus.lock().unwrap().peek(BASE + IRQ_CONFIG), 0xA5A5_F542);
        assert_eq!(fadc.irq_vector().unwrap(), 0x42);
    }

    #[test]
    fn test_set_irq_level_preserves_bits() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().poke(BASE + IRQ_CONFIG, PATTERN);
        fadc.set_irq_level(2).unwrap();
        assert_eq!(bus.lock().unwrap().peek(BASE + IRQ_CONFIG), 0xA5A5_F2A5);
        assert_eq!(fadc.irq_level().unwrap(), 2);
    }

    #[test]
    fn test_enable_irq_preserves_bits() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().poke(BASE + IRQ_CONFIG, PATTERN);
        assert!(!fadc.irq_enabled().unwrap());
        fadc.enable_irq().unwrap();
        assert_eq!(bus.lock().unwrap().peek(BASE + IRQ_CONFIG), PATTERN | 0x800);
        assert!(fadc.irq_enabled().unwrap());
        fadc.disable_irq().unwrap();
        assert_eq!(bus.lock().unwrap().peek(BASE + IRQ_CONFIG), PATTERN);
    }

    #[test]
    fn test_irq_boundaries() {
        let (bus, fadc) = fadc();
        fadc.set_irq_vector(0).unwrap();
        fadc.set_irq_vector(255).unwrap();
        fadc.set_irq_level(0).unwrap();
        fadc.set_irq_level(7).unwrap();
        bus.lock().unwrap().clear_log();
        assert!(matches!(
            fadc.set_irq_vector(256),
            Err(Error::InvalidArgument { what: "IRQ vector", .. })
        ));
        assert!(matches!(
            fadc.set_irq_level(8),
            Err(Error::InvalidArgument { what: "IRQ level", .. })
        ));
        assert!(fadc.configure_irq(0, 8, true).is_err());
        assert!(bus.lock().unwrap().log().is_empty());
        let config = fadc.irq_configuration().unwrap();
        assert_eq!(config.vector, 255);
        assert_eq!(u8::from(config.level), 7);
    }

    #[test]
    fn test_configure_irq() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().poke(BASE + IRQ_CONFIG, 0xFFFF_0000);
        fadc.configure_irq(0x80, 5, true).unwrap();
        assert_eq!(bus.lock().unwrap().peek(BASE + IRQ_CONFIG), 0xFFFF_0D80);
    }

    #[test]
    fn test_irq_sources() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().declare_jk(BASE + IRQ_CONTROL);
        fadc.enable_irq_source(0).unwrap();
        fadc.enable_irq_source(1).unwrap();
        fadc.disable_irq_source(0).unwrap();
        fadc.disable_irq_source(1).unwrap();
        assert_eq!(
            bus.lock().unwrap().writes_to(BASE + IRQ_CONTROL),
            vec![0x1, 0x2, 0x0001_0000, 0x0002_0000]
        );
        fadc.enable_irq_source(1).unwrap();
        assert!(fadc.irq_source_enabled(1).unwrap());
        assert!(!fadc.irq_source_enabled(0).unwrap());
        assert!(matches!(
            fadc.enable_irq_source(2),
            Err(Error::InvalidArgument { what: "IRQ source", .. })
        ));
    }

    #[test]
    fn test_wait_timeout() {
        let (_bus, fadc) = fadc();
        let timeout = Duration::from_millis(5);
        assert!(matches!(
            fadc.wait_for_irq(0x10, timeout),
            Err(Error::Timeout { mask: 0x10, .. })
        ));
    }

    #[test]
    fn test_wait_and_acknowledge() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().raise_irq(5, 0x99);
        assert_eq!(fadc.check_irq().unwrap(), Some(5));
        fadc.enable_irq_lines(0x10).unwrap();
        fadc.wait_for_irq(0x10, Duration::from_millis(5)).unwrap();
        assert_eq!(fadc.acknowledge_interrupt(5).unwrap(), 0x99);
        assert_eq!(fadc.check_irq().unwrap(), None);
        fadc.disable_irq_lines(0x10).unwrap();
        assert!(bus
            .lock()
            .unwrap()
            .log()
            .contains(&Access::Iack { level_bits: 0x10 }));
    }

    #[test]
    fn test_check_irq_reports_highest() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().raise_irq(2, 1);
        bus.lock().unwrap().raise_irq(6, 2);
        assert_eq!(fadc.check_irq().unwrap(), Some(6));
    }

    #[test]
    fn test_acknowledge_bad_level() {
        let (bus, fadc) = fadc();
        for level in [0, 8] {
            assert!(matches!(
                fadc.acknowledge_interrupt(level),
                Err(Error::InvalidArgument { .. })
            ));
        }
        assert!(bus.lock().unwrap().log().is_empty());
    }
}
