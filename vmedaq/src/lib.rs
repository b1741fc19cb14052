//! # vmedaq
//!
//! Drivers for VME data acquisition modules, most notably the Struck SIS3302 flash ADC.
//!
//! The drivers talk to hardware through the [`transport::VmeBus`] trait, so any VME controller
//! can sit underneath them. [`transport::mock::Mock`] stands in for real hardware in tests.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod core;
pub mod modules;
pub mod prelude;
pub mod transport;
