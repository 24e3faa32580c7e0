// SPDX-License-Identifier: GPL-3.0-or-later

use std::rc::Rc;

use crate::clock::Clock;
use crate::fdt::{Fdt, FdtNode};
use crate::peripherals::Peripherals;

pub const PLIC_COMPATIBLE: &str = "riscv,plic0";

/// What devices attach to: an MMIO bus, the clock they read time from, and
/// optionally the description tree handed to the guest.
pub struct Machine {
    pub bus: Peripherals,
    pub fdt: Option<Fdt>,
    clock: Rc<dyn Clock>,
}

impl Machine {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self { bus: Peripherals::new(), fdt: None, clock }
    }

    /// Machine whose devices also describe themselves under `/soc`.
    pub fn with_fdt(clock: Rc<dyn Clock>) -> Self {
        Self { fdt: Some(Fdt::with_soc()), ..Self::new(clock) }
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        self.clock.clone()
    }

    /// Describes the interrupt controller so devices can reference it as
    /// their interrupt parent. No-op without a description tree.
    pub fn add_plic_node(&mut self, base: u64, size: u64) {
        let soc = match self.fdt.as_mut().and_then(|fdt| fdt.root.find_mut("soc")) {
            Some(soc) => soc,
            None => return,
        };

        let mut plic = FdtNode::new_reg("plic", base);
        plic.add_prop_reg("reg", base, size);
        plic.add_prop_str("compatible", PLIC_COMPATIBLE);
        plic.add_prop_empty("interrupt-controller");
        plic.add_prop_u32("#interrupt-cells", 1);
        soc.add_child(plic);
    }

    pub fn read(&mut self, addr: u64, size: u8) -> u32 {
        self.bus.read(addr, size)
    }

    pub fn write(&mut self, addr: u64, size: u8, value: u32) {
        self.bus.write(addr, size, value)
    }
}
