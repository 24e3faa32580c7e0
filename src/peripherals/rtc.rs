// SPDX-License-Identifier: GPL-3.0-or-later

//! Goldfish RTC.
//!
//! Wall-clock time in nanoseconds since the epoch (whole-second resolution)
//! and one alarm wired to an interrupt line. Linux binds it through
//! `compatible = "google,goldfish-rtc"`.
//!
//! The alarm logic is kept exactly as guests written against this device
//! observe it: it runs after *every* register write, and it fires while the
//! clock has not yet reached the alarm (`now <= alarm`). Any other outcome
//! marks the alarm pending.

use std::ops::RangeInclusive;
use std::rc::{Rc, Weak};

use anyhow::{Context as _, Result};

use crate::clock::Clock;
use crate::fdt::{Fdt, FdtNode};
use crate::irq::{InterruptController, IrqLine};
use crate::machine::Machine;
use super::Peripheral;

pub const REG_SIZE: u64 = 0x20;
pub const COMPATIBLE: &str = "google,goldfish-rtc";

const NSEC_PER_SEC: u64 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, num_enum::TryFromPrimitive)]
#[repr(u32)]
pub enum RtcReg {
    TimeLow = 0x00,
    TimeHigh = 0x04,
    AlarmLow = 0x08,
    AlarmHigh = 0x0C,
    IrqEnabled = 0x10,
    AlarmClear = 0x14,
    AlarmStatus = 0x18,
    IrqClear = 0x1C,
}

impl RtcReg {
    pub fn name(self) -> &'static str {
        match self {
            RtcReg::TimeLow => "TIME_LOW",
            RtcReg::TimeHigh => "TIME_HIGH",
            RtcReg::AlarmLow => "ALARM_LOW",
            RtcReg::AlarmHigh => "ALARM_HIGH",
            RtcReg::IrqEnabled => "IRQ_ENABLED",
            RtcReg::AlarmClear => "ALARM_CLEAR",
            RtcReg::AlarmStatus => "ALARM_STATUS",
            RtcReg::IrqClear => "IRQ_CLEAR",
        }
    }
}

pub struct GoldfishRtc {
    name: String,
    clock: Rc<dyn Clock>,
    irq_line: IrqLine,
    alarm_low: u32,
    alarm_high: u32,
    irq_enabled: bool,
    alarm_pending: bool,
}

impl GoldfishRtc {
    pub fn new(name: String, clock: Rc<dyn Clock>, irq_line: IrqLine) -> Self {
        Self {
            name,
            clock,
            irq_line,
            alarm_low: 0,
            alarm_high: 0,
            irq_enabled: false,
            alarm_pending: false,
        }
    }

    fn now_ns(&self) -> u64 {
        self.clock.now_secs().wrapping_mul(NSEC_PER_SEC)
    }

    pub fn alarm(&self) -> u64 {
        self.alarm_low as u64 | ((self.alarm_high as u64) << 32)
    }

    pub fn irq_enabled(&self) -> bool {
        self.irq_enabled
    }

    pub fn alarm_pending(&self) -> bool {
        self.alarm_pending
    }

    // Register side of a write, before the alarm is evaluated.
    fn store(&mut self, reg: RtcReg, value: u32) {
        match reg {
            RtcReg::AlarmLow => self.alarm_low = value,
            RtcReg::AlarmHigh => self.alarm_high = value,
            RtcReg::IrqEnabled => {
                self.irq_enabled = value != 0;
                debug!("{} irq_enabled={}", self.name, self.irq_enabled);
            }
            RtcReg::AlarmClear => self.alarm_pending = false,
            _ => {}
        }
    }

    /// Runs the post-write alarm transition. Returns the IRQ to raise, if any.
    pub fn evaluate_alarm(&mut self) -> Option<u32> {
        let now = self.now_ns();
        let alarm = self.alarm();

        if self.alarm_pending && self.irq_enabled && now <= alarm {
            self.alarm_pending = false;
            trace!("{} alarm fired now={} alarm={}", self.name, now, alarm);
            Some(self.irq_line.irq())
        } else {
            self.alarm_pending = true;
            None
        }
    }
}

impl Peripheral for GoldfishRtc {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        REG_SIZE
    }

    fn op_size(&self) -> RangeInclusive<u8> {
        4..=4
    }

    fn reg_name(&self, offset: u32) -> Option<&'static str> {
        RtcReg::try_from(offset).ok().map(RtcReg::name)
    }

    fn read(&mut self, offset: u32, _size: u8) -> u32 {
        match RtcReg::try_from(offset) {
            Ok(RtcReg::TimeLow) => self.now_ns() as u32,
            Ok(RtcReg::TimeHigh) => (self.now_ns() >> 32) as u32,
            Ok(RtcReg::AlarmLow) => self.alarm_low,
            Ok(RtcReg::AlarmHigh) => self.alarm_high,
            Ok(RtcReg::IrqEnabled) => self.irq_enabled as u32,
            Ok(RtcReg::AlarmStatus) => self.alarm_pending as u32,
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, _size: u8, value: u32) {
        if let Ok(reg) = RtcReg::try_from(offset) {
            self.store(reg, value);
        }

        // The state transition is complete before the controller is called.
        if self.evaluate_alarm().is_some() {
            debug!("{} raising irq={}", self.name, self.irq_line.irq());
            self.irq_line.assert();
        }
    }
}

/// Appends the RTC node under `/soc`, pointing at the PLIC as its interrupt
/// parent. Returns false, with a warning, when either node is missing.
pub fn emit_fdt(fdt: &mut Fdt, base: u64, irq: u32) -> bool {
    let Fdt { root, phandles } = fdt;

    let soc = match root.find_mut("soc") {
        Some(soc) => soc,
        None => {
            warn!("Missing nodes in FDT!");
            return false;
        }
    };

    let plic_phandle = match soc.find_reg_any_mut("plic") {
        Some(plic) => plic.phandle(phandles),
        None => {
            warn!("Missing nodes in FDT!");
            return false;
        }
    };

    let mut rtc = FdtNode::new_reg("rtc", base);
    rtc.add_prop_reg("reg", base, REG_SIZE);
    rtc.add_prop_str("compatible", COMPATIBLE);
    rtc.add_prop_u32("interrupt-parent", plic_phandle);
    rtc.add_prop_u32("interrupts", irq);
    soc.add_child(rtc);
    true
}

/// Creates a Goldfish RTC at `base`, maps it on the machine bus, and
/// describes it in the machine's FDT when there is one.
pub fn attach(
    machine: &mut Machine,
    base: u64,
    intc: Option<Weak<dyn InterruptController>>,
    irq: u32,
) -> Result<()> {
    let irq_line = IrqLine::new(intc, irq);
    if !irq_line.is_connected() {
        debug!("rtc_goldfish@{:x} has no interrupt controller, irq={} stays quiet", base, irq);
    }

    let rtc = GoldfishRtc::new(format!("rtc_goldfish@{:x}", base), machine.clock(), irq_line);

    machine.bus.register(base, Box::new(rtc))
        .with_context(|| format!("Failed to attach goldfish RTC at base=0x{:08x}", base))?;

    if let Some(fdt) = machine.fdt.as_mut() {
        emit_fdt(fdt, base, irq);
    }

    Ok(())
}
