//! Register map of the SIS3302 8 channel 100 MHz flash ADC.
//!
//! Every offset is relative to the module base address. The per-ADC tables are only populated
//! for ADC 1 and 2; asking for any other ADC fails with [`Error::InvalidIndex`].

use super::Error;
use crate::core::{FixedOffset, RegisterWord};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use packed_struct::prelude::*;
use std::{fmt, str::FromStr};
use vmedaq_derive::{offset, RegisterWord};

/// Largest number of samples the on-board memory holds per ADC (32 MSamples)
pub const MAX_SAMPLES: usize = 0x200_0000;
/// Samples reachable through one memory page selection (4 MSamples)
pub const SAMPLES_PER_PAGE: usize = 0x40_0000;
/// Number of memory pages
pub const MEMORY_PAGES: u8 = 8;

// Module-wide registers

pub const CONTROL_STATUS: u32 = 0x0;
pub const MODULE_ID: u32 = 0x4;
pub const IRQ_CONFIG: u32 = 0x8;
pub const IRQ_CONTROL: u32 = 0xC;
pub const ACQUISITION_CONTROL: u32 = 0x10;
pub const START_DELAY: u32 = 0x14;
pub const STOP_DELAY: u32 = 0x18;
pub const MAX_NOF_EVENT: u32 = 0x20;
pub const ACTUAL_EVENT_COUNTER: u32 = 0x24;
pub const ADC_MEMORY_PAGE: u32 = 0x34;

// Key registers, the write itself is the action

pub const KEY_RESET: u32 = 0x400;
pub const KEY_ARM: u32 = 0x410;
pub const KEY_DISARM: u32 = 0x414;
pub const KEY_START: u32 = 0x418;
pub const KEY_STOP: u32 = 0x41C;
pub const KEY_RESET_DDR2_LOGIC: u32 = 0x428;
pub const KEY_TIMESTAMP_CLEAR: u32 = 0x42C;

pub const TIMESTAMP_DIRECTORY: u32 = 0x1_0000;

// Broadcast registers, a write reaches every ADC

pub const EVENT_CONFIG_ALL_ADC: u32 = 0x0100_0000;
pub const ADC_INPUT_MODE_ALL_ADC: u32 = 0x0100_000C;

// Acquisition control J/K bits. Writing the bit sets it, writing it shifted into the upper half
// clears it, and untouched bits keep their state.

pub const ACQ_AUTOSTART: u32 = 0x10;
pub const ACQ_MULTI_EVENT: u32 = 0x20;
pub const ACQ_INTERNAL_TRIGGER: u32 = 0x40;
pub const ACQ_FRONT_PANEL_START_STOP: u32 = 0x100;
pub const ACQ_FRONT_PANEL_TIMESTAMP_CLEAR: u32 = 0x200;

/// The J/K word that sets `bit`
#[must_use]
pub const fn jk_set(bit: u32) -> u32 {
    bit
}

/// The J/K word that clears `bit`
#[must_use]
pub const fn jk_clear(bit: u32) -> u32 {
    bit << 16
}

/// Number of IRQ sources in the IRQ control register
pub const IRQ_SOURCES: u8 = 2;

/// The IRQ control J/K bit of source `src`
#[must_use]
pub const fn irq_source_bit(src: u8) -> u32 {
    1 << src
}

/// One of the ADCs, numbered 1 to 8 like the front panel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Adc(u8);

impl Adc {
    pub const FIRST: Adc = Adc(1);

    /// # Errors
    /// Returns [`Error::InvalidIndex`] outside of 1..=8
    pub fn new(index: u8) -> Result<Self, Error> {
        if (1..=8).contains(&index) {
            Ok(Self(index))
        } else {
            Err(Error::InvalidIndex {
                what: "ADC",
                index: usize::from(index),
                expected: "1..=8",
            })
        }
    }

    #[must_use]
    pub fn index(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Adc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ADC{}", self.0)
    }
}

/// Registers that exist once per ADC (or per ADC pair)
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdcRegister {
    /// Event configuration, shared by the ADC pair
    EventConfig,
    /// Event directory, one entry per captured event
    EventDirectory,
    /// Input mode and test data, shared by the ADC pair
    InputMode,
    /// Start of the sample memory
    Memory,
    ActualSampleAddress,
    TriggerSetup,
    TriggerThreshold,
    /// Live sample value, shared by the ADC pair
    ActualSampleValue,
}

impl AdcRegister {
    /// The offset of this register for `adc`
    /// # Errors
    /// Returns [`Error::InvalidIndex`] for ADCs whose offsets are not populated
    pub fn offset(self, adc: Adc) -> Result<u32, Error> {
        let offset = match (self, adc.index()) {
            (AdcRegister::EventConfig, 1 | 2) => 0x0200_0000,
            (AdcRegister::EventDirectory, 1) => 0x0201_0000,
            (AdcRegister::EventDirectory, 2) => 0x0201_8000,
            (AdcRegister::InputMode, 1 | 2) => 0x0200_000C,
            (AdcRegister::Memory, 1) => 0x0400_0000,
            (AdcRegister::Memory, 2) => 0x0480_0000,
            (AdcRegister::ActualSampleAddress, 1) => 0x0200_0010,
            (AdcRegister::ActualSampleAddress, 2) => 0x0200_0014,
            (AdcRegister::TriggerSetup, 1) => 0x0200_0030,
            (AdcRegister::TriggerSetup, 2) => 0x0200_0038,
            (AdcRegister::TriggerThreshold, 1) => 0x0200_0034,
            (AdcRegister::TriggerThreshold, 2) => 0x0200_003C,
            (AdcRegister::ActualSampleValue, 1 | 2) => 0x0200_0020,
            (_, index) => {
                return Err(Error::InvalidIndex {
                    what: "ADC",
                    index: usize::from(index),
                    expected: "1..=2 (ADC 3 to 8 are not mapped)",
                })
            }
        };
        Ok(offset)
    }
}

/// Look up `register` for the ADC numbered `adc`
/// # Errors
/// Returns [`Error::InvalidIndex`] when `adc` is outside of 1..=8 or not mapped
pub fn register_offset(register: AdcRegister, adc: u8) -> Result<u32, Error> {
    register.offset(Adc::new(adc)?)
}

/// Event page sizes in samples, with the discriminant being the event configuration code
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum PageSize {
    #[default]
    Samples16M = 0x0,
    Samples4M = 0x1,
    Samples1M = 0x2,
    Samples256K = 0x3,
    Samples64K = 0x4,
    Samples16K = 0x5,
    Samples4K = 0x6,
    Samples1K = 0x7,
    Samples512 = 0x8,
    Samples256 = 0x9,
    Samples128 = 0xA,
    Samples64 = 0xB,
}

impl PageSize {
    /// # Errors
    /// Returns [`Error::InvalidArgument`] unless `samples` is one of the supported sizes
    pub fn from_samples(samples: u32) -> Result<Self, Error> {
        Ok(match samples {
            64 => PageSize::Samples64,
            128 => PageSize::Samples128,
            256 => PageSize::Samples256,
            512 => PageSize::Samples512,
            1024 => PageSize::Samples1K,
            4096 => PageSize::Samples4K,
            16_384 => PageSize::Samples16K,
            65_536 => PageSize::Samples64K,
            262_144 => PageSize::Samples256K,
            1_048_576 => PageSize::Samples1M,
            4_194_304 => PageSize::Samples4M,
            16_777_216 => PageSize::Samples16M,
            _ => {
                return Err(Error::InvalidArgument {
                    what: "page size",
                    value: samples.to_string(),
                    expected: "64, 128, 256, 512, 1024, 4096, 16384, 65536, 262144, 1048576, \
                               4194304 or 16777216 samples",
                })
            }
        })
    }

    /// Decode the low nibble of an event configuration, if it names a page size
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::from_u8(code)
    }

    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn samples(self) -> u32 {
        match self {
            PageSize::Samples16M => 16_777_216,
            PageSize::Samples4M => 4_194_304,
            PageSize::Samples1M => 1_048_576,
            PageSize::Samples256K => 262_144,
            PageSize::Samples64K => 65_536,
            PageSize::Samples16K => 16_384,
            PageSize::Samples4K => 4096,
            PageSize::Samples1K => 1024,
            PageSize::Samples512 => 512,
            PageSize::Samples256 => 256,
            PageSize::Samples128 => 128,
            PageSize::Samples64 => 64,
        }
    }
}

/// Encode a page size in samples into its event configuration code
/// # Errors
/// Returns [`Error::InvalidArgument`] unless `samples` is one of the supported sizes
pub fn encode_page_size(samples: u32) -> Result<u8, Error> {
    Ok(PageSize::from_samples(samples)?.code())
}

/// Sample clock sources, with the discriminant being the 3-bit code read back from the
/// acquisition control register
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, Default)]
pub enum ClockSource {
    #[default]
    Internal100MHz = 0,
    Internal50MHz = 1,
    Internal25MHz = 2,
    Internal10MHz = 3,
    Internal1MHz = 4,
    /// Random clock on the front panel LEMO
    Random = 5,
    /// External clock on the front panel LEMO
    External = 6,
    /// Clock from the P2 connector
    P2 = 7,
}

impl ClockSource {
    /// The J/K word selecting this source. It clears the code bits that are not part of the
    /// source and sets the ones that are, so it is written as a whole.
    #[must_use]
    pub fn pattern(self) -> u32 {
        let code = self as u32;
        (code << 12) | ((!code & 0x7) << 28)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ClockSource::Internal100MHz => "100MHz",
            ClockSource::Internal50MHz => "50MHz",
            ClockSource::Internal25MHz => "25MHz",
            ClockSource::Internal10MHz => "10MHz",
            ClockSource::Internal1MHz => "1MHz",
            ClockSource::Random => "random",
            ClockSource::External => "external",
            ClockSource::P2 => "p2",
        }
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClockSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "100MHz" => ClockSource::Internal100MHz,
            "50MHz" => ClockSource::Internal50MHz,
            "25MHz" => ClockSource::Internal25MHz,
            "10MHz" => ClockSource::Internal10MHz,
            "1MHz" => ClockSource::Internal1MHz,
            "random" => ClockSource::Random,
            "external" => ClockSource::External,
            "p2" => ClockSource::P2,
            _ => {
                return Err(Error::InvalidArgument {
                    what: "clock source",
                    value: s.to_owned(),
                    expected: "one of 100MHz, 50MHz, 25MHz, 10MHz, 1MHz, random, external, p2",
                })
            }
        })
    }
}

/// Encode a clock source name into the acquisition control word selecting it
/// # Errors
/// Returns [`Error::InvalidArgument`] for unknown names
pub fn encode_clock_source(name: &str) -> Result<u32, Error> {
    Ok(name.parse::<ClockSource>()?.pattern())
}

#[offset(0x4)]
#[derive(PackedStruct, RegisterWord, Debug, Copy, Clone, PartialEq, Eq)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct ModuleId {
    /// Model number, one decimal digit per nibble
    #[packed_field(bits = "16..=31", endian = "msb")]
    pub model: u16,
    #[packed_field(bits = "8..=15")]
    pub major_revision: u8,
    #[packed_field(bits = "0..=7")]
    pub minor_revision: u8,
}

impl ModuleId {
    /// Model and firmware revision rendered as `SIS 3302 (FW 1.4.0.6)`
    #[must_use]
    pub fn identity(&self) -> String {
        let model: String = (0..4)
            .rev()
            .map(|i| ((self.model >> (4 * i)) & 0xF).to_string())
            .collect();
        let firmware = [
            self.major_revision >> 4,
            self.major_revision & 0xF,
            self.minor_revision >> 4,
            self.minor_revision & 0xF,
        ]
        .map(|nibble| nibble.to_string())
        .join(".");
        format!("SIS {model} (FW {firmware})")
    }
}

#[offset(0x8)]
#[derive(PackedStruct, RegisterWord, Debug, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct IrqConfig {
    /// Bits we don't touch, kept so a read-modify-write preserves them
    #[packed_field(bits = "16..=31", endian = "msb")]
    pub(crate) upper: u16,
    #[packed_field(bits = "12..=15")]
    pub(crate) reserved: Integer<u8, packed_bits::Bits<4>>,
    #[packed_field(bits = "11")]
    pub enable: bool,
    #[packed_field(bits = "8..=10")]
    pub level: Integer<u8, packed_bits::Bits<3>>,
    #[packed_field(bits = "0..=7")]
    pub vector: u8,
}

/// Event configuration of an ADC pair
#[derive(PackedStruct, RegisterWord, Debug, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct EventConfig {
    #[packed_field(bits = "16..=31", endian = "msb")]
    pub(crate) upper: u16,
    #[packed_field(bits = "8..=15")]
    pub(crate) middle: u8,
    #[packed_field(bits = "6..=7")]
    pub(crate) reserved: Integer<u8, packed_bits::Bits<2>>,
    #[packed_field(bits = "5")]
    pub sample_length_stop: bool,
    #[packed_field(bits = "4")]
    pub page_wrap: bool,
    #[packed_field(bits = "0..=3")]
    pub page_size_code: Integer<u8, packed_bits::Bits<4>>,
}

impl EventConfig {
    /// The configured page size, `None` if the code isn't one the module defines
    #[must_use]
    pub fn page_size(&self) -> Option<PageSize> {
        PageSize::from_code(self.page_size_code.into())
    }
}

/// ADC input mode of an ADC pair
#[derive(PackedStruct, RegisterWord, Debug, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct AdcInputMode {
    #[packed_field(bits = "24..=31")]
    pub(crate) upper: u8,
    #[packed_field(bits = "17..=23")]
    pub(crate) reserved: Integer<u8, packed_bits::Bits<7>>,
    #[packed_field(bits = "16")]
    pub test_data_mode: bool,
    #[packed_field(bits = "0..=15", endian = "msb")]
    pub test_start_data: u16,
}

/// Mask applied to test start data before it is written
pub const TEST_START_DATA_MASK: u16 = 0xFFFD;

/// Readback of the acquisition control register (the J half)
#[offset(0x10)]
#[derive(PackedStruct, RegisterWord, Debug, Default)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct AcquisitionControl {
    #[packed_field(bits = "16..=31", endian = "msb")]
    pub status: u16,
    #[packed_field(bits = "12..=14")]
    pub(crate) clock_code: Integer<u8, packed_bits::Bits<3>>,
    #[packed_field(bits = "9")]
    pub front_panel_timestamp_clear: bool,
    #[packed_field(bits = "8")]
    pub front_panel_start_stop: bool,
    #[packed_field(bits = "6")]
    pub internal_trigger: bool,
    #[packed_field(bits = "5")]
    pub multi_event: bool,
    #[packed_field(bits = "4")]
    pub autostart: bool,
}

impl AcquisitionControl {
    #[must_use]
    pub fn clock_source(&self) -> ClockSource {
        // All eight 3-bit codes are sources
        ClockSource::from_u8(self.clock_code.into()).unwrap_or_default()
    }
}
