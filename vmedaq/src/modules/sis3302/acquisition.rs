//! Acquisition control: the arm/start/stop key sequence, sampling mode bits, delays and the event
//! configuration shared by each ADC pair.

use super::{
    read_register,
    registers::{
        jk_clear, jk_set, register_offset, AcquisitionControl, Adc, AdcInputMode, AdcRegister,
        ClockSource, EventConfig, PageSize, ACQUISITION_CONTROL, ACQ_AUTOSTART,
        ACQ_FRONT_PANEL_START_STOP, ACQ_FRONT_PANEL_TIMESTAMP_CLEAR, ACQ_INTERNAL_TRIGGER,
        ACQ_MULTI_EVENT, ACTUAL_EVENT_COUNTER, ADC_INPUT_MODE_ALL_ADC, EVENT_CONFIG_ALL_ADC,
        KEY_ARM, KEY_DISARM, KEY_RESET_DDR2_LOGIC, KEY_START, KEY_STOP, KEY_TIMESTAMP_CLEAR,
        MAX_NOF_EVENT, START_DELAY, STOP_DELAY, TEST_START_DATA_MASK,
    },
    write_register, Error, Sis3302,
};
use crate::{
    core::{FixedOffset, Window},
    transport::VmeBus,
};
use paste::paste;
use tracing::debug;

/// Everything that shapes an acquisition, applied in one go by [`Sis3302::configure`].
/// The default matches the module right after a reset.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct AcquisitionConfig {
    pub clock_source: ClockSource,
    pub autostart: bool,
    pub multi_event: bool,
    pub internal_trigger: bool,
    pub front_panel_start_stop: bool,
    pub front_panel_timestamp_clear: bool,
    /// Samples recorded before the start condition
    pub start_delay: u32,
    /// Samples recorded after the stop condition
    pub stop_delay: u32,
    pub max_no_of_events: u32,
    pub page_size: PageSize,
    pub page_wrap: bool,
}

fn switch_word(bit: u32, on: bool) -> u32 {
    if on {
        jk_set(bit)
    } else {
        jk_clear(bit)
    }
}

/// Read the event configuration of the first ADC pair, modify it and broadcast it to every ADC
fn update_event_config<B: VmeBus>(
    w: &mut Window<'_, B>,
    f: impl FnOnce(&mut EventConfig),
) -> Result<(), Error> {
    let offset = AdcRegister::EventConfig.offset(Adc::FIRST)?;
    let mut config: EventConfig = read_register(w, offset)?;
    f(&mut config);
    write_register(w, EVENT_CONFIG_ALL_ADC, &config)
}

/// Same as [`update_event_config`] for the ADC input mode
fn update_input_mode<B: VmeBus>(
    w: &mut Window<'_, B>,
    f: impl FnOnce(&mut AdcInputMode),
) -> Result<(), Error> {
    let offset = AdcRegister::InputMode.offset(Adc::FIRST)?;
    let mut mode: AdcInputMode = read_register(w, offset)?;
    f(&mut mode);
    write_register(w, ADC_INPUT_MODE_ALL_ADC, &mode)
}

/// Generates the explicit enable/disable pair for one acquisition control J/K bit
macro_rules! jk_switch {
    ($name:ident, $bit:expr, $what:literal) => {
        paste! {
            #[doc = concat!("Enables ", $what)]
            /// # Errors
            /// Returns an error on bad transport
            pub fn [<enable_ $name>](&self) -> Result<(), Error> {
                debug!("enable {}", stringify!($name));
                self.with_bus(|w| Ok(w.write_d32(ACQUISITION_CONTROL, jk_set($bit))?))
            }

            #[doc = concat!("Disables ", $what)]
            /// # Errors
            /// Returns an error on bad transport
            pub fn [<disable_ $name>](&self) -> Result<(), Error> {
                debug!("disable {}", stringify!($name));
                self.with_bus(|w| Ok(w.write_d32(ACQUISITION_CONTROL, jk_clear($bit))?))
            }
        }
    };
}

impl<B> Sis3302<B>
where
    B: VmeBus,
{
    /// Arms the sampling logic
    /// # Errors
    /// Returns an error on bad transport
    pub fn arm(&self) -> Result<(), Error> {
        debug!("arm sampling logic");
        self.key(KEY_ARM)
    }

    /// Disarms the sampling logic
    /// # Errors
    /// Returns an error on bad transport
    pub fn disarm(&self) -> Result<(), Error> {
        debug!("disarm sampling logic");
        self.key(KEY_DISARM)
    }

    /// Starts sampling. The module ignores this unless it is armed.
    /// # Errors
    /// Returns an error on bad transport
    pub fn start(&self) -> Result<(), Error> {
        debug!("start sampling");
        self.key(KEY_START)
    }

    /// Stops sampling, the module stays armed
    /// # Errors
    /// Returns an error on bad transport
    pub fn stop(&self) -> Result<(), Error> {
        debug!("stop sampling");
        self.key(KEY_STOP)
    }

    /// Clears the timestamp counter
    /// # Errors
    /// Returns an error on bad transport
    pub fn clear_timestamps(&self) -> Result<(), Error> {
        debug!("clear timestamps");
        self.key(KEY_TIMESTAMP_CLEAR)
    }

    /// Resets the DDR2 memory controller
    /// # Errors
    /// Returns an error on bad transport
    pub fn reset_ddr2_logic(&self) -> Result<(), Error> {
        debug!("reset DDR2 logic");
        self.key(KEY_RESET_DDR2_LOGIC)
    }

    jk_switch!(
        autostart,
        ACQ_AUTOSTART,
        "starting the sampling as soon as the module is armed"
    );
    jk_switch!(multi_event, ACQ_MULTI_EVENT, "recording several events per arm");
    jk_switch!(
        internal_trigger,
        ACQ_INTERNAL_TRIGGER,
        "stopping on the internal trigger"
    );
    jk_switch!(
        front_panel_start_stop,
        ACQ_FRONT_PANEL_START_STOP,
        "the front panel start/stop inputs"
    );
    jk_switch!(
        front_panel_timestamp_clear,
        ACQ_FRONT_PANEL_TIMESTAMP_CLEAR,
        "clearing the timestamp from the front panel"
    );

    /// Selects the sample clock. Every source bit is written, so this replaces the previous
    /// source without touching the other acquisition control bits.
    /// # Errors
    /// Returns an error on bad transport
    pub fn set_clock_source(&self, source: ClockSource) -> Result<(), Error> {
        debug!("set clock source to {source}");
        self.with_bus(|w| Ok(w.write_d32(ACQUISITION_CONTROL, source.pattern())?))
    }

    /// Reads back the acquisition control register
    /// # Errors
    /// Returns an error on bad transport
    pub fn acquisition_control(&self) -> Result<AcquisitionControl, Error> {
        debug!("get acquisition control");
        self.with_bus(|w| read_register(w, AcquisitionControl::OFFSET))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn set_start_delay(&self, delay: u32) -> Result<(), Error> {
        debug!("set start delay to {delay}");
        self.with_bus(|w| Ok(w.write_d32(START_DELAY, delay)?))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn start_delay(&self) -> Result<u32, Error> {
        self.with_bus(|w| Ok(w.read_d32(START_DELAY)?))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn set_stop_delay(&self, delay: u32) -> Result<(), Error> {
        debug!("set stop delay to {delay}");
        self.with_bus(|w| Ok(w.write_d32(STOP_DELAY, delay)?))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn stop_delay(&self) -> Result<u32, Error> {
        self.with_bus(|w| Ok(w.read_d32(STOP_DELAY)?))
    }

    /// Number of events after which a multi-event acquisition ends
    /// # Errors
    /// Returns an error on bad transport
    pub fn set_max_no_of_events(&self, events: u32) -> Result<(), Error> {
        debug!("set max number of events to {events}");
        self.with_bus(|w| Ok(w.write_d32(MAX_NOF_EVENT, events)?))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn max_no_of_events(&self) -> Result<u32, Error> {
        self.with_bus(|w| Ok(w.read_d32(MAX_NOF_EVENT)?))
    }

    /// Events recorded since the module was armed
    /// # Errors
    /// Returns an error on bad transport
    pub fn actual_event_counter(&self) -> Result<u32, Error> {
        self.with_bus(|w| Ok(w.read_d32(ACTUAL_EVENT_COUNTER)?))
    }

    /// Sets the number of samples per event for every ADC pair
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for unsupported sizes, before touching the bus
    pub fn set_page_size(&self, samples: u32) -> Result<(), Error> {
        let page = PageSize::from_samples(samples)?;
        debug!("set page size to {samples} samples (code {:#x})", page.code());
        self.with_bus(|w| update_event_config(w, |c| c.page_size_code = page.code().into()))
    }

    /// The page size configured for the first ADC pair
    /// # Errors
    /// Returns an error on bad transport or if the module reports an undefined code
    pub fn page_size(&self) -> Result<PageSize, Error> {
        let config = self.event_configuration(1)?;
        config.page_size().ok_or_else(|| Error::InvalidArgument {
            what: "page size code",
            value: format!("{:#x}", u8::from(config.page_size_code)),
            expected: "a code between 0x0 and 0xB",
        })
    }

    /// Lets the sampling wrap around inside the page instead of stopping at its end
    /// # Errors
    /// Returns an error on bad transport
    pub fn enable_page_wrap(&self) -> Result<(), Error> {
        debug!("enable page wrap");
        self.with_bus(|w| update_event_config(w, |c| c.page_wrap = true))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn disable_page_wrap(&self) -> Result<(), Error> {
        debug!("disable page wrap");
        self.with_bus(|w| update_event_config(w, |c| c.page_wrap = false))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn page_wrap_enabled(&self) -> Result<bool, Error> {
        Ok(self.event_configuration(1)?.page_wrap)
    }

    /// Ends each event after the page size worth of samples
    /// # Errors
    /// Returns an error on bad transport
    pub fn enable_sample_length_stop(&self) -> Result<(), Error> {
        debug!("enable sample length stop");
        self.with_bus(|w| update_event_config(w, |c| c.sample_length_stop = true))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn disable_sample_length_stop(&self) -> Result<(), Error> {
        debug!("disable sample length stop");
        self.with_bus(|w| update_event_config(w, |c| c.sample_length_stop = false))
    }

    /// Reads the event configuration of the pair `adc` belongs to
    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn event_configuration(&self, adc: u8) -> Result<EventConfig, Error> {
        let offset = register_offset(AdcRegister::EventConfig, adc)?;
        self.with_bus(|w| read_register(w, offset))
    }

    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn adc_input_mode(&self, adc: u8) -> Result<AdcInputMode, Error> {
        let offset = register_offset(AdcRegister::InputMode, adc)?;
        self.with_bus(|w| read_register(w, offset))
    }

    /// Sets the first value of the test ramp for every ADC. Bit 1 is not writable and is masked.
    /// # Errors
    /// Returns an error on bad transport
    pub fn set_adc_test_start_data(&self, data: u16) -> Result<(), Error> {
        let data = data & TEST_START_DATA_MASK;
        debug!("set ADC test start data to {data:#06x}");
        self.with_bus(|w| update_input_mode(w, |m| m.test_start_data = data))
    }

    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn adc_test_start_data(&self, adc: u8) -> Result<u16, Error> {
        Ok(self.adc_input_mode(adc)?.test_start_data)
    }

    /// Replaces the ADC samples with a ramp starting at the test start data
    /// # Errors
    /// Returns an error on bad transport
    pub fn enable_adc_test_data_mode(&self) -> Result<(), Error> {
        debug!("enable ADC test data mode");
        self.with_bus(|w| update_input_mode(w, |m| m.test_data_mode = true))
    }

    /// # Errors
    /// Returns an error on bad transport
    pub fn disable_adc_test_data_mode(&self) -> Result<(), Error> {
        debug!("disable ADC test data mode");
        self.with_bus(|w| update_input_mode(w, |m| m.test_data_mode = false))
    }

    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn trigger_setup(&self, adc: u8) -> Result<u32, Error> {
        let offset = register_offset(AdcRegister::TriggerSetup, adc)?;
        self.with_bus(|w| Ok(w.read_d32(offset)?))
    }

    /// Writes the raw trigger setup word (peaking and gap time, pulse length)
    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn set_trigger_setup(&self, adc: u8, word: u32) -> Result<(), Error> {
        let offset = register_offset(AdcRegister::TriggerSetup, adc)?;
        debug!("set trigger setup of ADC{adc} to {word:#010x}");
        self.with_bus(|w| Ok(w.write_d32(offset, word)?))
    }

    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn trigger_threshold(&self, adc: u8) -> Result<u32, Error> {
        let offset = register_offset(AdcRegister::TriggerThreshold, adc)?;
        self.with_bus(|w| Ok(w.read_d32(offset)?))
    }

    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn set_trigger_threshold(&self, adc: u8, word: u32) -> Result<(), Error> {
        let offset = register_offset(AdcRegister::TriggerThreshold, adc)?;
        debug!("set trigger threshold of ADC{adc} to {word:#010x}");
        self.with_bus(|w| Ok(w.write_d32(offset, word)?))
    }

    /// The sample memory address the ADC is currently writing to
    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn actual_sample_address(&self, adc: u8) -> Result<u32, Error> {
        let offset = register_offset(AdcRegister::ActualSampleAddress, adc)?;
        self.with_bus(|w| Ok(w.read_d32(offset)?))
    }

    /// Pushes a whole acquisition configuration to the module, one register operation per
    /// setting, while holding the bus
    /// # Errors
    /// Returns an error on bad transport
    pub fn configure(&self, config: &AcquisitionConfig) -> Result<(), Error> {
        debug!("configure acquisition {config:?}");
        self.with_bus(|w| {
            w.write_d32(ACQUISITION_CONTROL, config.clock_source.pattern())?;
            for (bit, on) in [
                (ACQ_AUTOSTART, config.autostart),
                (ACQ_MULTI_EVENT, config.multi_event),
                (ACQ_INTERNAL_TRIGGER, config.internal_trigger),
                (ACQ_FRONT_PANEL_START_STOP, config.front_panel_start_stop),
                (
                    ACQ_FRONT_PANEL_TIMESTAMP_CLEAR,
                    config.front_panel_timestamp_clear,
                ),
            ] {
                w.write_d32(ACQUISITION_CONTROL, switch_word(bit, on))?;
            }
            w.write_d32(START_DELAY, config.start_delay)?;
            w.write_d32(STOP_DELAY, config.stop_delay)?;
            w.write_d32(MAX_NOF_EVENT, config.max_no_of_events)?;
            update_event_config(w, |c| {
                c.page_size_code = config.page_size.code().into();
                c.page_wrap = config.page_wrap;
            })
        })
    }
}
