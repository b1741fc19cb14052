//! Prelude (helpful reexports) for this package

pub use crate::{
    core::{share, SharedBus},
    modules::sis3302::{self, AcquisitionConfig, ClockSource, PageSize, Sis3302},
    transport::{mock::Mock, VmeBus},
};
pub use std::time::Duration;
