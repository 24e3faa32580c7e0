// SPDX-License-Identifier: GPL-3.0-or-later

//! Goldfish RTC device model, with the bus, interrupt line and hardware
//! description plumbing it attaches to.

#[macro_use]
extern crate log;

pub mod clock;
pub mod config;
pub mod fdt;
pub mod irq;
pub mod machine;
pub mod peripherals;
pub mod replay;
pub mod util;
