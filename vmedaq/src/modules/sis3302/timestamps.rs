//! Event timestamps from the timestamp directory

use super::{registers::TIMESTAMP_DIRECTORY, Error, Sis3302};
use crate::transport::VmeBus;
use tracing::{debug, warn};

/// Joins directory words, stored high word first, into 64-bit timestamps. A trailing odd word has
/// no partner and is dropped.
#[must_use]
pub fn combine_timestamps(words: &[u32]) -> Vec<u64> {
    words
        .chunks_exact(2)
        .map(|pair| (u64::from(pair[0]) << 32) | u64::from(pair[1]))
        .collect()
}

impl<B> Sis3302<B>
where
    B: VmeBus,
{
    /// Reads the timestamps of the first `n_events` events, in event directory order.
    ///
    /// The directory isn't checked against the event counter, entries past the last recorded
    /// event hold whatever was there before.
    /// # Errors
    /// Returns an error on bad transport
    pub fn read_timestamps(&self, n_events: usize) -> Result<Vec<u64>, Error> {
        debug!("read {n_events} timestamps");
        let n = n_events.saturating_mul(2);
        let words = self.with_bus(|w| Ok(w.block_read_d32(TIMESTAMP_DIRECTORY, n)?))?;
        if words.len() != n {
            warn!("read {} timestamp words, expected {n}", words.len());
        }
        Ok(combine_timestamps(&words))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        super::tests::{fadc, BASE},
        *,
    };
    use crate::transport::mock::Access;

    #[test]
    fn test_combine() {
        assert_eq!(
            combine_timestamps(&[1, 2, 3, 4, 5, 6]),
            vec![4_294_967_298, 12_884_901_892, 21_474_836_486]
        );
        assert_eq!(combine_timestamps(&[0xFFFF_FFFF, 0xFFFF_FFFF, 7]), vec![u64::MAX]);
        assert!(combine_timestamps(&[]).is_empty());
    }

    #[test]
    fn test_read_timestamps() {
        let (bus, fadc) = fadc();
        bus.lock()
            .unwrap()
            .queue_d32(BASE + TIMESTAMP_DIRECTORY, [1, 2, 3, 4, 5, 6]);
        assert_eq!(
            fadc.read_timestamps(3).unwrap(),
            vec![4_294_967_298, 12_884_901_892, 21_474_836_486]
        );
        assert_eq!(
            bus.lock().unwrap().log(),
            &[Access::BlockReadD32 {
                address: BASE + TIMESTAMP_DIRECTORY,
                n: 6
            }]
        );
    }

    #[test]
    fn test_unrecorded_entries_read_as_given() {
        let (bus, fadc) = fadc();
        bus.lock()
            .unwrap()
            .queue_d32(BASE + TIMESTAMP_DIRECTORY, [0, 10, 0, 0]);
        assert_eq!(fadc.read_timestamps(2).unwrap(), vec![10, 0]);
    }
}
