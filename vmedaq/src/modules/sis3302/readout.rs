//! Paged readout of the sample memory.
//!
//! Only [`SAMPLES_PER_PAGE`] samples of an ADC's memory are visible on the bus at once. Larger
//! reads select each memory page in turn and block-transfer it from the same ADC memory offset,
//! then stitch the pages back together into an events by samples matrix.

use super::{
    read_register,
    registers::{
        register_offset, AdcRegister, EventConfig, ADC_MEMORY_PAGE, MAX_SAMPLES, MEMORY_PAGES,
        SAMPLES_PER_PAGE,
    },
    Error, Sis3302,
};
use crate::{core::Window, transport::VmeBus};
use ndarray::Array2;
use tracing::{debug, warn};

/// Splits a read of `total_samples` into page sized transfers: full pages followed by the
/// remainder, if any
#[must_use]
pub fn page_plan(total_samples: usize) -> Vec<usize> {
    let full = total_samples / SAMPLES_PER_PAGE;
    let rest = total_samples % SAMPLES_PER_PAGE;
    std::iter::repeat(SAMPLES_PER_PAGE)
        .take(full)
        .chain((rest > 0).then_some(rest))
        .collect()
}

fn select_page<B: VmeBus>(w: &mut Window<'_, B>, page: u8) -> Result<(), Error> {
    if page >= MEMORY_PAGES {
        return Err(Error::InvalidIndex {
            what: "memory page",
            index: usize::from(page),
            expected: "0..=7",
        });
    }
    Ok(w.write_d32(ADC_MEMORY_PAGE, u32::from(page))?)
}

/// The number of samples of a `n_events` by `page_size` read, if the memory can hold it
fn checked_total(page_size: usize, n_events: usize) -> Result<usize, Error> {
    page_size
        .checked_mul(n_events)
        .filter(|total| *total <= MAX_SAMPLES)
        .ok_or_else(|| Error::InvalidArgument {
            what: "read size",
            value: format!("{n_events} events of {page_size} samples"),
            expected: "at most 33554432 samples in total",
        })
}

/// Read `n_events` events of `page_size` samples starting at the ADC memory offset `memory`
fn read_paged<B: VmeBus>(
    w: &mut Window<'_, B>,
    memory: u32,
    page_size: usize,
    n_events: usize,
) -> Result<Array2<u16>, Error> {
    let total = checked_total(page_size, n_events)?;
    let plan = page_plan(total);
    debug!("reading {n_events} events of {page_size} samples in transfers of {plan:?}");
    let data = match plan.as_slice() {
        [] => Vec::new(),
        // No page selector write here, the transfer goes through the page already selected,
        // which callers keep at page 0
        [only] => w.block_read_d16(memory, *only)?,
        _ => {
            let mut data = Vec::with_capacity(total);
            for (page, &chunk) in (0..MEMORY_PAGES).zip(&plan) {
                select_page(w, page)?;
                let samples = w.block_read_d16(memory, chunk)?;
                if samples.len() != chunk {
                    warn!(
                        "short read on memory page {page}: got {} of {chunk} samples",
                        samples.len()
                    );
                }
                data.extend(samples);
            }
            data
        }
    };
    if data.len() != total {
        warn!("read {} samples, expected {total}", data.len());
    }
    Ok(Array2::from_shape_vec((n_events, page_size), data)?)
}

impl<B> Sis3302<B>
where
    B: VmeBus,
{
    /// Selects which page of the sample memory is visible on the bus
    /// # Errors
    /// Returns [`Error::InvalidIndex`] outside of 0..=7, or an error on bad transport
    pub fn select_memory_page(&self, page: u8) -> Result<(), Error> {
        debug!("select memory page {page}");
        self.with_bus(|w| select_page(w, page))
    }

    /// Reads `n_events` events of `page_size` samples from ADC `adc`, one event per row.
    ///
    /// `page_size` must match the page size the module was configured with, otherwise the
    /// events come back misaligned. [`Sis3302::read_events`] reads it from the module instead.
    /// # Errors
    /// - [`Error::InvalidIndex`] for unmapped ADCs
    /// - [`Error::InvalidArgument`] if the request exceeds the sample memory
    /// - [`Error::Shape`] if the module delivered fewer samples than requested
    /// - [`Error::Bus`] on bad transport. Pages already read are dropped.
    pub fn read_data(
        &self,
        adc: u8,
        page_size: usize,
        n_events: usize,
    ) -> Result<Array2<u16>, Error> {
        let memory = register_offset(AdcRegister::Memory, adc)?;
        self.with_bus(|w| read_paged(w, memory, page_size, n_events))
    }

    /// Same as [`Sis3302::read_data`], with the page size read back from the ADC's event
    /// configuration
    /// # Errors
    /// Same as [`Sis3302::read_data`], plus [`Error::InvalidArgument`] if the module reports an
    /// undefined page size code
    pub fn read_events(&self, adc: u8, n_events: usize) -> Result<Array2<u16>, Error> {
        let memory = register_offset(AdcRegister::Memory, adc)?;
        let event_config = register_offset(AdcRegister::EventConfig, adc)?;
        self.with_bus(|w| {
            let config: EventConfig = read_register(w, event_config)?;
            let page = config.page_size().ok_or_else(|| Error::InvalidArgument {
                what: "page size code",
                value: format!("{:#x}", u8::from(config.page_size_code)),
                expected: "a code between 0x0 and 0xB",
            })?;
            read_paged(w, memory, page.samples() as usize, n_events)
        })
    }

    /// Reads the first `n` entries of the event directory of ADC `adc`
    /// # Errors
    /// Returns [`Error::InvalidIndex`] for unmapped ADCs or an error on bad transport
    pub fn read_event_directory(&self, adc: u8, n: usize) -> Result<Vec<u32>, Error> {
        let offset = register_offset(AdcRegister::EventDirectory, adc)?;
        debug!("read {n} event directory entries of ADC{adc}");
        let entries = self.with_bus(|w| Ok(w.block_read_d32(offset, n)?))?;
        if entries.len() != n {
            warn!("read {} event directory entries, expected {n}", entries.len());
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::tests::{fadc, BASE},
        *,
    };
    use crate::transport::mock::{Access, Mock};
    use paste::paste;
    use std::sync::{Arc, Mutex};

    const MEMORY_ADC1: u32 = BASE + 0x0400_0000;
    const MEMORY_ADC2: u32 = BASE + 0x0480_0000;

    #[allow(clippy::cast_possible_truncation)]
    fn ramp(n: usize) -> impl Iterator<Item = u16> {
        (0..n).map(|i| i as u16)
    }

    fn block_reads(bus: &Arc<Mutex<Mock>>) -> Vec<usize> {
        bus.lock()
            .unwrap()
            .log()
            .iter()
            .filter_map(|access| match access {
                Access::BlockReadD16 { n, .. } => Some(*n),
                _ => None,
            })
            .collect()
    }

    macro_rules! test_page_plan {
        ($name:ident, $total:expr, $plan:expr) => {
            paste! {
                #[test]
                fn [<test_page_plan_ $name>]() {
                    assert_eq!(page_plan($total), $plan);
                }
            }
        };
    }

    test_page_plan!(empty, 0, Vec::<usize>::new());
    test_page_plan!(partial, 1000, vec![1000]);
    test_page_plan!(exact_page, SAMPLES_PER_PAGE, vec![SAMPLES_PER_PAGE]);
    test_page_plan!(one_over, SAMPLES_PER_PAGE + 1, vec![SAMPLES_PER_PAGE, 1]);
    test_page_plan!(full_memory, MAX_SAMPLES, vec![SAMPLES_PER_PAGE; 8]);

    #[test]
    fn test_single_page_read() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().queue_d16(MEMORY_ADC1, ramp(4 * 1024));
        let events = fadc.read_data(1, 1024, 4).unwrap();
        assert_eq!(events.dim(), (4, 1024));
        assert_eq!(events[[1, 0]], 1024);
        assert_eq!(events[[3, 1023]], 4095);
        assert_eq!(block_reads(&bus), vec![4096]);
        assert!(bus
            .lock()
            .unwrap()
            .writes_to(BASE + ADC_MEMORY_PAGE)
            .is_empty());
    }

    #[test]
    fn test_exactly_one_page_needs_no_selection() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().queue_d16(MEMORY_ADC2, ramp(SAMPLES_PER_PAGE));
        let events = fadc.read_data(2, 1_048_576, 4).unwrap();
        assert_eq!(events.dim(), (4, 1_048_576));
        assert_eq!(block_reads(&bus), vec![SAMPLES_PER_PAGE]);
        assert!(bus
            .lock()
            .unwrap()
            .writes_to(BASE + ADC_MEMORY_PAGE)
            .is_empty());
    }

    #[test]
    fn test_two_page_read() {
        let (bus, fadc) = fadc();
        let total = 5 * 1_048_576;
        bus.lock().unwrap().queue_d16(MEMORY_ADC1, ramp(total));
        let events = fadc.read_data(1, 1_048_576, 5).unwrap();
        assert_eq!(block_reads(&bus), vec![4_194_304, 1_048_576]);
        assert_eq!(bus.lock().unwrap().writes_to(BASE + ADC_MEMORY_PAGE), vec![0, 1]);
        // Flattening gives back the transfers in the order they were read
        assert!(events.iter().copied().eq(ramp(total)));
    }

    #[test]
    fn test_page_selected_before_each_transfer() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().queue_d16(MEMORY_ADC1, ramp(64 * 131_073));
        let events = fadc.read_data(1, 64, 131_073).unwrap();
        assert_eq!(events.dim(), (131_073, 64));
        let bus = bus.lock().unwrap();
        let order: Vec<Access> = bus
            .log()
            .iter()
            .filter(|access| !matches!(access, Access::ReadD32 { .. }))
            .cloned()
            .collect();
        assert_eq!(
            order,
            vec![
                Access::WriteD32 {
                    address: BASE + ADC_MEMORY_PAGE,
                    data: 0
                },
                Access::BlockReadD16 {
                    address: MEMORY_ADC1,
                    n: SAMPLES_PER_PAGE
                },
                Access::WriteD32 {
                    address: BASE + ADC_MEMORY_PAGE,
                    data: 1
                },
                Access::BlockReadD16 {
                    address: MEMORY_ADC1,
                    n: SAMPLES_PER_PAGE
                },
                Access::WriteD32 {
                    address: BASE + ADC_MEMORY_PAGE,
                    data: 2
                },
                Access::BlockReadD16 {
                    address: MEMORY_ADC1,
                    n: 64
                },
            ]
        );
    }

    #[test]
    fn test_short_read_is_shape_error() {
        let (bus, fadc) = fadc();
        bus.lock().unwrap().queue_d16(MEMORY_ADC1, ramp(1000));
        assert!(matches!(fadc.read_data(1, 1024, 1), Err(Error::Shape(_))));
    }

    #[test]
    fn test_zero_events_reads_nothing() {
        let (bus, fadc) = fadc();
        let events = fadc.read_data(1, 1024, 0).unwrap();
        assert_eq!(events.dim(), (0, 1024));
        assert!(bus.lock().unwrap().log().is_empty());
    }

    #[test]
    fn test_over_capacity() {
        let (bus, fadc) = fadc();
        assert!(matches!(
            fadc.read_data(1, 16_777_216, 3),
            Err(Error::InvalidArgument { what: "read size", .. })
        ));
        assert!(matches!(
            fadc.read_data(1, usize::MAX, 2),
            Err(Error::InvalidArgument { .. })
        ));
        assert!(bus.lock().unwrap().log().is_empty());
    }

    #[test]
    fn test_unmapped_adc_reads_nothing() {
        let (bus, fadc) = fadc();
        for adc in [0, 3, 9] {
            assert!(matches!(
                fadc.read_data(adc, 64, 1),
                Err(Error::InvalidIndex { .. })
            ));
        }
        assert!(bus.lock().unwrap().log().is_empty());
    }

    #[test]
    fn test_bus_error_aborts_read() {
        let (bus, fadc) = fadc();
        {
            let mut bus = bus.lock().unwrap();
            bus.queue_d16(MEMORY_ADC1, ramp(SAMPLES_PER_PAGE + 10));
            bus.inject_fault(BASE + ADC_MEMORY_PAGE);
        }
        assert!(matches!(
            fadc.read_data(1, SAMPLES_PER_PAGE + 10, 1),
            Err(Error::Bus(_))
        ));
        assert!(block_reads(&bus).is_empty());
    }

    #[test]
    fn test_later_page_failure_drops_earlier_pages() {
        let (bus, fadc) = fadc();
        {
            let mut bus = bus.lock().unwrap();
            bus.queue_d16(MEMORY_ADC1, ramp(SAMPLES_PER_PAGE + 10));
            // Page 0 transfers, page 1 answers with a bus error
            bus.fail_after(MEMORY_ADC1, 1);
        }
        assert!(matches!(
            fadc.read_data(1, SAMPLES_PER_PAGE + 10, 1),
            Err(Error::Bus(_))
        ));
        assert_eq!(block_reads(&bus), vec![SAMPLES_PER_PAGE, 10]);
        assert_eq!(bus.lock().unwrap().writes_to(BASE + ADC_MEMORY_PAGE), vec![0, 1]);
    }

    #[test]
    fn test_single_page_read_keeps_selected_page() {
        let (bus, fadc) = fadc();
        fadc.select_memory_page(0).unwrap();
        bus.lock().unwrap().queue_d16(MEMORY_ADC1, ramp(256));
        fadc.read_data(1, 256, 1).unwrap();
        // The only page write is the explicit selection
        assert_eq!(bus.lock().unwrap().writes_to(BASE + ADC_MEMORY_PAGE), vec![0]);
    }

    #[test]
    fn test_select_memory_page_bounds() {
        let (bus, fadc) = fadc();
        fadc.select_memory_page(7).unwrap();
        assert!(matches!(
            fadc.select_memory_page(8),
            Err(Error::InvalidIndex { what: "memory page", index: 8, .. })
        ));
        assert_eq!(bus.lock().unwrap().writes_to(BASE + ADC_MEMORY_PAGE), vec![7]);
    }

    #[test]
    fn test_read_events_uses_configured_page_size() {
        let (bus, fadc) = fadc();
        {
            let mut bus = bus.lock().unwrap();
            // 256 samples per event
            bus.poke(BASE + 0x0200_0000, 0x9);
            bus.queue_d16(MEMORY_ADC2, ramp(3 * 256));
        }
        let events = fadc.read_events(2, 3).unwrap();
        assert_eq!(events.dim(), (3, 256));
        assert_eq!(events[[2, 0]], 512);
    }

    #[test]
    fn test_read_event_directory() {
        let (bus, fadc) = fadc();
        bus.lock()
            .unwrap()
            .queue_d32(BASE + 0x0201_8000, [0x100, 0x200, 0x300]);
        assert_eq!(
            fadc.read_event_directory(2, 3).unwrap(),
            vec![0x100, 0x200, 0x300]
        );
        assert!(matches!(
            fadc.read_event_directory(4, 3),
            Err(Error::InvalidIndex { .. })
        ));
    }
}
