// SPDX-License-Identifier: GPL-3.0-or-later

use std::rc::{Rc, Weak};

use anyhow::{bail, Result};

use crate::clock::{Clock, HostClock, ManualClock};
use crate::config::{ClockConfig, Config, Step};
use crate::irq::{InterruptController, IrqLatch};
use crate::machine::Machine;
use crate::peripherals::rtc;

const DEFAULT_PLIC_SIZE: u64 = 0x400_0000;

/// A machine with one Goldfish RTC, ready to replay guest accesses.
pub struct Replay {
    pub machine: Machine,
    pub latch: Rc<IrqLatch>,
    rtc_base: u64,
    manual_clock: Option<ManualClock>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub reads: u64,
    pub writes: u64,
    pub irqs: u64,
}

impl Replay {
    pub fn new(config: &Config) -> Result<Self> {
        let manual_clock = match config.clock.as_ref().unwrap_or(&ClockConfig::Host) {
            ClockConfig::Host => None,
            ClockConfig::Fixed(secs) => Some(ManualClock::new(*secs)),
        };

        let clock: Rc<dyn Clock> = match manual_clock.clone() {
            Some(clock) => Rc::new(clock),
            None => Rc::new(HostClock),
        };

        let mut machine = if config.fdt.unwrap_or(false) {
            Machine::with_fdt(clock)
        } else {
            Machine::new(clock)
        };

        let latch = Rc::new(IrqLatch::default());

        let intc = match config.plic.as_ref() {
            Some(plic) => {
                machine.add_plic_node(plic.base, plic.size.unwrap_or(DEFAULT_PLIC_SIZE));
                if plic.attached.unwrap_or(true) {
                    let intc: Weak<dyn InterruptController> = Rc::downgrade(&latch) as Weak<dyn InterruptController>;
                    Some(intc)
                } else {
                    None
                }
            }
            None => None,
        };

        rtc::attach(&mut machine, config.rtc.base, intc, config.rtc.irq)?;

        Ok(Self { machine, latch, rtc_base: config.rtc.base, manual_clock })
    }

    pub fn run(&mut self, script: &[Step]) -> Result<ReplayStats> {
        let mut stats = ReplayStats::default();

        for (i, step) in script.iter().enumerate() {
            match *step {
                Step::Write { write, value, size } => {
                    self.machine.write(self.rtc_base + write as u64, size.unwrap_or(4), value);
                    stats.writes += 1;
                }
                Step::Read { read, expect, size } => {
                    let value = self.machine.read(self.rtc_base + read as u64, size.unwrap_or(4));
                    info!("step={} read offset=0x{:02x} value=0x{:08x}", i, read, value);
                    stats.reads += 1;
                    if let Some(expect) = expect {
                        if value != expect {
                            bail!("step={} read offset=0x{:02x}: expected 0x{:08x}, got 0x{:08x}",
                                i, read, expect, value);
                        }
                    }
                }
                Step::Advance { advance } => {
                    match self.manual_clock.as_ref() {
                        Some(clock) => clock.advance(advance),
                        None => bail!("step={} advance needs a fixed clock", i),
                    }
                }
                Step::ExpectIrqs { expect_irqs } => {
                    let irqs = self.latch.num_asserted();
                    if irqs != expect_irqs {
                        bail!("step={} expected {} irqs, got {}", i, expect_irqs, irqs);
                    }
                }
            }
        }

        while let Some(irq) = self.latch.take_next_pending() {
            info!("Interrupt raised irq={}", irq);
        }

        stats.irqs = self.latch.num_asserted();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_replay_alarm_fires() {
        let config = config(r#"
clock: { fixed: 1700000000 }
fdt: true
plic: { base: 0x0c000000 }
rtc: { base: 0x101000, irq: 11 }
script:
  - { write: 0x10, value: 1 }
  - { read: 0x18, expect: 1 }
  - { write: 0x0c, value: 0xffffffff }
  - { expect_irqs: 1 }
  - { read: 0x18, expect: 0 }
  - { read: 0x1c, expect: 0 }
"#);
        let mut replay = Replay::new(&config).unwrap();
        let stats = replay.run(config.script.as_ref().unwrap()).unwrap();
        assert_eq!(stats, ReplayStats { reads: 3, writes: 2, irqs: 1 });

        let dts = replay.machine.fdt.as_ref().unwrap().to_string();
        assert!(dts.contains("compatible = \"google,goldfish-rtc\";"));
        assert!(dts.contains("interrupts = <0xb>;"));
    }

    #[test]
    fn test_replay_demo_config() {
        let config = config(include_str!("../demos/alarm.yaml"));
        let mut replay = Replay::new(&config).unwrap();
        let stats = replay.run(config.script.as_ref().unwrap()).unwrap();
        assert_eq!(stats.irqs, 1);
    }

    #[test]
    fn test_replay_time_with_advance() {
        let config = config(r#"
clock: { fixed: 10 }
rtc: { base: 0x1000, irq: 1 }
script:
  - { read: 0x00, expect: 0x540be400 }
  - { read: 0x04, expect: 0x2 }
  - { advance: 1 }
  - { read: 0x00, expect: 0x8fa6ae00 }
"#);
        let mut replay = Replay::new(&config).unwrap();
        let stats = replay.run(config.script.as_ref().unwrap()).unwrap();
        assert_eq!(stats.reads, 3);
    }

    #[test]
    fn test_replay_detached_plic_never_raises() {
        let config = config(r#"
clock: { fixed: 1700000000 }
plic: { base: 0x0c000000, attached: false }
rtc: { base: 0x101000, irq: 11 }
script:
  - { write: 0x10, value: 1 }
  - { write: 0x0c, value: 0xffffffff }
  - { expect_irqs: 0 }
  - { read: 0x18, expect: 0 }
"#);
        let mut replay = Replay::new(&config).unwrap();
        let stats = replay.run(config.script.as_ref().unwrap()).unwrap();
        assert_eq!(stats.irqs, 0);
    }

    #[test]
    fn test_replay_expectation_mismatch() {
        let config = config(r#"
clock: { fixed: 0 }
rtc: { base: 0x1000, irq: 1 }
script:
  - { read: 0x10, expect: 1 }
"#);
        let mut replay = Replay::new(&config).unwrap();
        assert!(replay.run(config.script.as_ref().unwrap()).is_err());
    }

    #[test]
    fn test_replay_advance_needs_fixed_clock() {
        let config = config("rtc: { base: 0x1000, irq: 1 }\nscript:\n  - { advance: 1 }\n");
        let mut replay = Replay::new(&config).unwrap();
        assert!(replay.run(config.script.as_ref().unwrap()).is_err());
    }
}
