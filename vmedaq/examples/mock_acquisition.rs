//! In this example, we run a complete multi-event acquisition on a SIS3302 sitting on the mock
//! bus: configure, arm, wait for the end-of-acquisition interrupt, then read the events and their
//! timestamps.

use indicatif::ProgressBar;
use vmedaq::{
    modules::sis3302::registers::{ACTUAL_EVENT_COUNTER, TIMESTAMP_DIRECTORY},
    prelude::*,
};

const BASE: u32 = 0x3000_0000;
const MEMORY_ADC1: u32 = BASE + 0x0400_0000;
const IRQ_LEVEL: u8 = 4;
const EVENTS: u32 = 16;
const RUNS: u64 = 8;

fn main() -> anyhow::Result<()> {
    let bus = share(Mock::new());
    let fadc = Sis3302::new(&bus, BASE)?;
    println!("Found {}", fadc.module_identity()?);

    fadc.configure(&AcquisitionConfig {
        clock_source: "external".parse()?,
        multi_event: true,
        internal_trigger: true,
        max_no_of_events: EVENTS,
        page_size: PageSize::Samples1K,
        ..Default::default()
    })?;
    fadc.configure_irq(0x42, IRQ_LEVEL, true)?;
    fadc.enable_irq_source(1)?;
    fadc.enable_irq_lines(1 << (IRQ_LEVEL - 1))?;

    let samples = PageSize::Samples1K.samples() as usize;
    let bar = ProgressBar::new(RUNS);
    bar.set_message("Acquiring");
    for run in 0..RUNS {
        fadc.arm()?;
        fadc.start()?;

        // Play the module: fill the memory and raise the interrupt
        {
            let mut bus = bus.lock().map_err(|_| anyhow::anyhow!("Bus poisoned"))?;
            bus.poke(BASE + 0x0200_0000, u32::from(PageSize::Samples1K.code()));
            bus.poke(BASE + ACTUAL_EVENT_COUNTER, EVENTS);
            bus.queue_d16(
                MEMORY_ADC1,
                (0..EVENTS as usize * samples).map(|i| (i % 4096) as u16),
            );
            bus.queue_d32(
                BASE + TIMESTAMP_DIRECTORY,
                (0..EVENTS).flat_map(|i| [run as u32, i * 1000]),
            );
            bus.raise_irq(IRQ_LEVEL, 0x42);
        }

        fadc.wait_for_irq(1 << (IRQ_LEVEL - 1), Duration::from_millis(100))?;
        let vector = fadc.acknowledge_interrupt(IRQ_LEVEL)?;
        let n_events = fadc.actual_event_counter()? as usize;
        let events = fadc.read_events(1, n_events)?;
        let timestamps = fadc.read_timestamps(n_events)?;
        fadc.disarm()?;

        bar.println(format!(
            "run {run}: vector {vector:#x}, {} events, first timestamp {}, mean of event 0 {:.1}",
            events.nrows(),
            timestamps.first().copied().unwrap_or_default(),
            events
                .row(0)
                .iter()
                .map(|&s| f64::from(s))
                .sum::<f64>()
                / samples as f64
        ));
        bar.inc(1);
    }
    bar.finish();
    Ok(())
}
