// SPDX-License-Identifier: GPL-3.0-or-later

use std::cell::Cell;
use std::rc::Weak;

/// Something a device can raise an interrupt line on. Fire and forget.
pub trait InterruptController {
    fn send_irq(&self, irq: u32);
}

/// One interrupt line of a device. The device does not own the controller;
/// once the controller is dropped the line goes quiet.
#[derive(Clone, Default)]
pub struct IrqLine {
    controller: Option<Weak<dyn InterruptController>>,
    irq: u32,
}

impl IrqLine {
    pub fn new(controller: Option<Weak<dyn InterruptController>>, irq: u32) -> Self {
        Self { controller, irq }
    }

    pub fn irq(&self) -> u32 {
        self.irq
    }

    pub fn is_connected(&self) -> bool {
        self.controller.as_ref().map_or(false, |c| c.strong_count() > 0)
    }

    pub fn assert(&self) {
        match self.controller.as_ref().and_then(Weak::upgrade) {
            Some(controller) => controller.send_irq(self.irq),
            None => trace!("irq={} not connected, dropped", self.irq),
        }
    }
}

/// Minimal controller that latches what was raised, lowest IRQ first.
/// 128 lines. Good enough to drive a device model.
#[derive(Default)]
pub struct IrqLatch {
    pending: Cell<u128>,
    num_asserted: Cell<u64>,
}

impl IrqLatch {
    pub const NUM_IRQS: u32 = 128;

    pub fn num_asserted(&self) -> u64 {
        self.num_asserted.get()
    }

    pub fn is_pending(&self, irq: u32) -> bool {
        irq < Self::NUM_IRQS && self.pending.get() & (1 << irq) != 0
    }

    pub fn take_next_pending(&self) -> Option<u32> {
        let pending = self.pending.get();
        if pending != 0 {
            let irq = pending.trailing_zeros();
            self.pending.set(pending & !(1 << irq));
            Some(irq)
        } else {
            None
        }
    }
}

impl InterruptController for IrqLatch {
    fn send_irq(&self, irq: u32) {
        debug!("Set irq pending irq={}", irq);
        self.num_asserted.set(self.num_asserted.get() + 1);
        if irq < Self::NUM_IRQS {
            self.pending.set(self.pending.get() | (1 << irq));
        } else {
            warn!("irq={} out of range, not latched", irq);
        }
    }
}
