use std::io::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use clap::Parser;
use clap::AppSettings;
use clap_num::maybe_hex;
use anyhow::{Result, Context};
use env_logger::fmt::Color;
use log::LevelFilter;

use goldfish_rtc::config::Config;
use goldfish_rtc::peripherals::NUM_ACCESSES;
use goldfish_rtc::replay::Replay;
use goldfish_rtc::util::read_file_str;

#[macro_use]
extern crate log;

/// Replay guest MMIO accesses against an emulated Goldfish RTC
#[derive(Parser, Debug)]
#[clap(
    global_setting(AppSettings::DeriveDisplayOrder)
)]
pub struct Args {
    /// Config file
    config: String,

    /// Verbosity. Can be repeated
    #[clap(short, long, parse(from_occurrences))]
    verbose: u8,

    /// Print the hardware description tree (DTS) after the replay
    #[clap(long)]
    dump_dts: bool,

    /// Override the RTC base address
    #[clap(long, parse(try_from_str=maybe_hex))]
    rtc_base: Option<u64>,

    /// Override the RTC interrupt number
    #[clap(long, parse(try_from_str=maybe_hex))]
    irq: Option<u32>,
}


fn init_logging(level: u8) {
    let lf = match level {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    static LAST_NUM_ACCESSES: AtomicU64 = AtomicU64::new(0);

    env_logger::Builder::new()
        .filter_level(lf)
        .target(env_logger::Target::Stdout)
        .format(|buf, record| {
            let num_accesses = NUM_ACCESSES.load(Relaxed);
            let delta_accesses = num_accesses - LAST_NUM_ACCESSES.swap(num_accesses, Relaxed);

            let mut style = buf.style();
            let level = match record.level() {
                log::Level::Error => style.set_color(Color::Red).set_intense(true).value("ERROR"),
                log::Level::Warn =>  style.set_color(Color::Yellow).set_intense(true).value("WARN "),
                log::Level::Info =>  style.set_color(Color::Green).set_intense(true).value("INFO "),
                log::Level::Debug => style.set_color(Color::Cyan).set_intense(true).value("DEBUG"),
                log::Level::Trace => style.set_color(Color::Blue).set_intense(true).value("TRACE"),
            };

            let mut style = buf.style();
            match delta_accesses {
                0..=9   => { }
                10..=99 => { style.set_color(Color::Yellow); }
                100..   => { style.set_color(Color::Magenta); }
            }
            let delta_accesses = style.value(delta_accesses);

            writeln!(buf, "[{:06} +{:04}] {} {}", num_accesses, delta_accesses, level, record.args())
        })
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config: Config = serde_yaml::from_str(&read_file_str(&args.config)?)
        .with_context(|| format!("Failed to parse {}", args.config))?;

    if let Some(base) = args.rtc_base {
        config.rtc.base = base;
    }
    if let Some(irq) = args.irq {
        config.rtc.irq = irq;
    }

    let mut replay = Replay::new(&config)?;

    info!("Replaying {}", args.config);
    let stats = replay.run(config.script.as_deref().unwrap_or_default())?;
    info!("Done reads={} writes={} irqs={}", stats.reads, stats.writes, stats.irqs);

    if args.dump_dts {
        match replay.machine.fdt.as_ref() {
            Some(fdt) => print!("{}", fdt),
            None => warn!("No FDT, set `fdt: true` in {}", args.config),
        }
    }

    Ok(())
}
