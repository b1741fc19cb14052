//! Drivers for the modules sitting in the VME crate

pub mod sis3302;
pub mod v895;
