// SPDX-License-Identifier: GPL-3.0-or-later

use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClockConfig {
    Host,
    /// Starts at this many seconds since the epoch, moved only by `advance`.
    Fixed(u64),
}

#[derive(Debug, Deserialize)]
pub struct PlicConfig {
    pub base: u64,
    pub size: Option<u64>,
    /// When false the RTC is built without an interrupt controller.
    pub attached: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RtcConfig {
    pub base: u64,
    pub irq: u32,
}

/// One scripted step. Offsets are relative to the RTC base.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Step {
    Write { write: u32, value: u32, size: Option<u8> },
    Read { read: u32, expect: Option<u32>, size: Option<u8> },
    Advance { advance: u64 },
    ExpectIrqs { expect_irqs: u64 },
}

#[derive(Debug, Deserialize)]
pub struct Config {
   pub clock: Option<ClockConfig>,
   pub fdt: Option<bool>,
   pub plic: Option<PlicConfig>,
   pub rtc: RtcConfig,
   pub script: Option<Vec<Step>>,
}
