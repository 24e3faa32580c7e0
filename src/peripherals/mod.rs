// SPDX-License-Identifier: GPL-3.0-or-later

pub mod rtc;

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};

/// Number of MMIO accesses dispatched so far, all buses included.
pub static NUM_ACCESSES: AtomicU64 = AtomicU64::new(0);

pub trait Peripheral {
    fn name(&self) -> &str;
    /// Size of the register window in bytes.
    fn size(&self) -> u64;
    /// Access widths the device accepts, in bytes.
    fn op_size(&self) -> RangeInclusive<u8> {
        1..=4
    }
    fn reg_name(&self, _offset: u32) -> Option<&'static str> {
        None
    }
    fn read(&mut self, offset: u32, size: u8) -> u32;
    fn write(&mut self, offset: u32, size: u8, value: u32);
}

pub struct PeripheralSlot {
    pub start: u64,
    pub end: u64,
    pub peripheral: Box<dyn Peripheral>,
}

/// MMIO dispatch. Slots are kept sorted by start address and never overlap.
#[derive(Default)]
pub struct Peripherals {
    slots: Vec<PeripheralSlot>,
}

impl Peripherals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, base: u64, peripheral: Box<dyn Peripheral>) -> Result<()> {
        let start = base;
        let end = match base.checked_add(peripheral.size()) {
            Some(end) => end,
            None => bail!("Peripheral {} at base=0x{:08x} wraps the address space", peripheral.name(), base),
        };

        let index = self.slots.partition_point(|p| p.start < start);
        if let Some(prev) = index.checked_sub(1).and_then(|i| self.slots.get(i)) {
            if prev.end > start {
                bail!("Overlapping register blocks between {} and {}", prev.peripheral.name(), peripheral.name());
            }
        }
        if let Some(next) = self.slots.get(index) {
            if next.start < end {
                bail!("Overlapping register blocks between {} and {}", peripheral.name(), next.peripheral.name());
            }
        }

        debug!("Peripheral base=0x{:08x} size=0x{:x} name={}", base, end - start, peripheral.name());
        self.slots.insert(index, PeripheralSlot { start, end, peripheral });
        Ok(())
    }

    pub fn slots(&self) -> &[PeripheralSlot] {
        &self.slots
    }

    pub fn get_peripheral(&mut self, addr: u64) -> Option<&mut PeripheralSlot> {
        let index = self.slots.binary_search_by_key(&addr, |p| p.start)
            .map_or_else(|e| e.checked_sub(1), Some);

        index.and_then(move |i| self.slots.get_mut(i).filter(|p| addr < p.end))
    }

    fn addr_desc(slot: &PeripheralSlot, addr: u64) -> String {
        let offset = (addr - slot.start) as u32;
        let reg = slot.peripheral.reg_name(offset - offset % 4).unwrap_or("REG_????");
        format!("addr=0x{:08x} block={} reg={} offset=0x{:04x}", addr, slot.peripheral.name(), reg, offset)
    }

    /// Looks up the slot for an access and checks the access width.
    fn dispatch(&mut self, addr: u64, size: u8, what: &str) -> Option<(&mut PeripheralSlot, u32)> {
        NUM_ACCESSES.fetch_add(1, Ordering::Relaxed);

        let slot = match self.get_peripheral(addr) {
            Some(slot) => slot,
            None => {
                warn!("{}: unmapped addr=0x{:08x} size={}", what, addr, size);
                return None;
            }
        };

        if !slot.peripheral.op_size().contains(&size) {
            warn!("{}: {} rejected size={}", what, Self::addr_desc(slot, addr), size);
            return None;
        }

        let offset = (addr - slot.start) as u32;
        Some((slot, offset))
    }

    pub fn read(&mut self, addr: u64, size: u8) -> u32 {
        match self.dispatch(addr, size, "read") {
            Some((slot, offset)) => {
                let value = slot.peripheral.read(offset, size);
                if log::log_enabled!(log::Level::Trace) {
                    trace!("read:  {} value=0x{:08x}", Self::addr_desc(slot, addr), value);
                }
                value
            }
            None => 0,
        }
    }

    pub fn write(&mut self, addr: u64, size: u8, value: u32) {
        if let Some((slot, offset)) = self.dispatch(addr, size, "write") {
            if log::log_enabled!(log::Level::Trace) {
                trace!("write: {} value=0x{:08x}", Self::addr_desc(slot, addr), value);
            }
            slot.peripheral.write(offset, size, value)
        }
    }

    fn access_width(addr: u64, len: usize, what: &str) -> Option<u8> {
        match u8::try_from(len) {
            Ok(size) => Some(size),
            Err(_) => {
                warn!("{}: addr=0x{:08x} rejected size={}", what, addr, len);
                None
            }
        }
    }

    /// Little-endian read into `data`; `data.len()` is the access width.
    pub fn read_bytes(&mut self, addr: u64, data: &mut [u8]) {
        data.fill(0);
        if let Some(size) = Self::access_width(addr, data.len(), "read") {
            let value = self.read(addr, size);
            let n = data.len().min(4);
            data[..n].copy_from_slice(&value.to_le_bytes()[..n]);
        }
    }

    pub fn write_bytes(&mut self, addr: u64, data: &[u8]) {
        if let Some(size) = Self::access_width(addr, data.len(), "write") {
            let mut buf = [0u8; 4];
            let n = data.len().min(4);
            buf[..n].copy_from_slice(&data[..n]);
            self.write(addr, size, u32::from_le_bytes(buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Scratch {
        value: u32,
        writes: Rc<RefCell<Vec<(u32, u8, u32)>>>,
    }

    impl Peripheral for Scratch {
        fn name(&self) -> &str { "SCRATCH" }
        fn size(&self) -> u64 { 0x10 }
        fn op_size(&self) -> RangeInclusive<u8> { 4..=4 }
        fn read(&mut self, offset: u32, _size: u8) -> u32 {
            match offset {
                0x0 => self.value,
                _ => 0,
            }
        }
        fn write(&mut self, offset: u32, size: u8, value: u32) {
            self.writes.borrow_mut().push((offset, size, value));
            if offset == 0 {
                self.value = value;
            }
        }
    }

    #[test]
    fn test_dispatch_by_address() {
        let mut bus = Peripherals::new();
        bus.register(0x2000, Box::new(Scratch::default())).unwrap();
        bus.register(0x1000, Box::new(Scratch::default())).unwrap();

        bus.write(0x2000, 4, 0xdead_beef);
        assert_eq!(bus.read(0x2000, 4), 0xdead_beef);
        assert_eq!(bus.read(0x1000, 4), 0);
        assert_eq!(bus.slots()[0].start, 0x1000);
    }

    #[test]
    fn test_unmapped_reads_zero() {
        let mut bus = Peripherals::new();
        bus.register(0x1000, Box::new(Scratch { value: 7, ..Default::default() })).unwrap();
        assert_eq!(bus.read(0x0ffc, 4), 0);
        assert_eq!(bus.read(0x1010, 4), 0);
        assert_eq!(bus.read(0x1000, 4), 7);
    }

    #[test]
    fn test_width_rejected_upstream() {
        let writes = Rc::new(RefCell::new(vec![]));
        let mut bus = Peripherals::new();
        bus.register(0x1000, Box::new(Scratch { value: 7, writes: writes.clone() })).unwrap();

        assert_eq!(bus.read(0x1000, 2), 0);
        bus.write(0x1000, 1, 5);
        bus.write(0x1000, 8, 5);
        assert!(writes.borrow().is_empty());

        bus.write(0x1004, 4, 5);
        assert_eq!(*writes.borrow(), vec![(4, 4, 5)]);
    }

    #[test]
    fn test_overlap_rejected() {
        let mut bus = Peripherals::new();
        bus.register(0x1000, Box::new(Scratch::default())).unwrap();
        assert!(bus.register(0x100c, Box::new(Scratch::default())).is_err());
        assert!(bus.register(0x0ff8, Box::new(Scratch::default())).is_err());
        assert!(bus.register(0x1010, Box::new(Scratch::default())).is_ok());
        assert!(bus.register(0x0ff0, Box::new(Scratch::default())).is_ok());
        assert!(bus.register(u64::MAX - 4, Box::new(Scratch::default())).is_err());
    }

    #[test]
    fn test_byte_helpers_little_endian() {
        let mut bus = Peripherals::new();
        bus.register(0x1000, Box::new(Scratch::default())).unwrap();
        bus.write_bytes(0x1000, &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(bus.read(0x1000, 4), 0x1234_5678);

        let mut data = [0u8; 4];
        bus.read_bytes(0x1000, &mut data);
        assert_eq!(data, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn test_oversized_byte_access_dropped() {
        let writes = Rc::new(RefCell::new(vec![]));
        let mut bus = Peripherals::new();
        bus.register(0x1000, Box::new(Scratch { value: 7, writes: writes.clone() })).unwrap();

        // 260 would wrap to a 4-byte access if truncated to u8.
        let mut data = vec![0u8; 260];
        data[..4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        bus.write_bytes(0x1000, &data);
        assert!(writes.borrow().is_empty());
        assert_eq!(bus.read(0x1000, 4), 7);

        let mut data = vec![0xffu8; 260];
        bus.read_bytes(0x1000, &mut data);
        assert!(data.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_oversized_byte_write_never_reaches_rtc() {
        use crate::clock::ManualClock;
        use crate::irq::IrqLine;
        use super::rtc::{GoldfishRtc, RtcReg};

        let rtc = GoldfishRtc::new("rtc".to_string(), Rc::new(ManualClock::new(0)), IrqLine::new(None, 1));
        let mut bus = Peripherals::new();
        bus.register(0x1000, Box::new(rtc)).unwrap();

        let mut data = vec![0u8; 260];
        data[..4].copy_from_slice(&0x1234_5678u32.to_le_bytes());
        bus.write_bytes(0x1000 + RtcReg::AlarmLow as u64, &data);
        assert_eq!(bus.read(0x1000 + RtcReg::AlarmLow as u64, 4), 0);
    }
}
