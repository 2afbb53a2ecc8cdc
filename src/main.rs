use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use imaxb6_lib::{protocol::Validation, Charger};
use log::*;
use serde::Serialize;
use std::{fmt::Debug, ops::Deref, panic};

mod commandline;

use commandline::{CliArgs, CliCommands, ProgramArgs};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

fn print_record<T: Debug + Serialize>(label: &str, record: &T, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(record).with_context(|| "Cannot serialize record")?
        );
    } else {
        println!("{label}: {record:?}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let mut charger = Charger::open(args.vid, args.pid)
        .with_context(|| format!("Cannot open charger {:04x}:{:04x}", args.vid, args.pid))?;
    charger.set_timeout(args.timeout);
    charger.set_retries(args.retries);
    if args.strict {
        charger.set_validation(Validation::Strict);
    }

    match args.command {
        CliCommands::ChargeInfo => {
            let info = charger
                .get_charge_info()
                .with_context(|| "Cannot get charge info")?;
            if !args.json {
                println!("State: {}", info.state_str());
            }
            print_record("Charge info", &info, args.json)?
        }
        CliCommands::SystemInfo => print_record(
            "System info",
            &charger
                .get_system_info()
                .with_context(|| "Cannot get system info")?,
            args.json,
        )?,
        CliCommands::DeviceInfo => print_record(
            "Device info",
            &charger
                .get_device_info()
                .with_context(|| "Cannot get device info")?,
            args.json,
        )?,
        CliCommands::Stop => charger.stop().with_context(|| "Cannot stop charger")?,
        CliCommands::Charge(ProgramArgs {
            battery,
            cells,
            current,
            voltage,
        }) => charger
            .charge(battery.into(), cells, current, voltage)
            .with_context(|| "Cannot start charging")?,
        CliCommands::FastCharge(ProgramArgs {
            battery,
            cells,
            current,
            voltage,
        }) => charger
            .fast_charge(battery.into(), cells, current, voltage)
            .with_context(|| "Cannot start fast charging")?,
        CliCommands::Discharge(ProgramArgs {
            battery,
            cells,
            current,
            voltage,
        }) => charger
            .discharge(battery.into(), cells, current, voltage)
            .with_context(|| "Cannot start discharging")?,
    }

    Ok(())
}
