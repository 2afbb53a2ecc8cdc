use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use imaxb6_lib::protocol::Battery;
use std::time::Duration;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum BatteryArg {
    Lipo,
    Liion,
    Life,
    Lihv,
    Nimh,
    Nicd,
    Pb,
}

impl From<BatteryArg> for Battery {
    fn from(arg: BatteryArg) -> Self {
        match arg {
            BatteryArg::Lipo => Battery::LiPo,
            BatteryArg::Liion => Battery::LiIon,
            BatteryArg::Life => Battery::LiFe,
            BatteryArg::Lihv => Battery::LiHv,
            BatteryArg::Nimh => Battery::NiMh,
            BatteryArg::Nicd => Battery::NiCd,
            BatteryArg::Pb => Battery::Pb,
        }
    }
}

#[derive(clap::Args, Debug, Clone, PartialEq)]
pub struct ProgramArgs {
    /// Battery chemistry
    #[arg(long, short, value_enum)]
    pub battery: BatteryArg,
    /// Number of cells in series
    #[arg(long, short)]
    pub cells: u8,
    /// Current in ampere (e.g., 1.5)
    #[arg(long, short = 'i')]
    pub current: f64,
    /// Maximum voltage for charging, minimum voltage for discharging, in volt
    #[arg(long, short = 'u')]
    pub voltage: f64,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommands {
    /// Show charge state, capacity, time, voltage, current and cell voltages
    ChargeInfo,
    /// Show system settings: limits, beeps, input voltage threshold and cell voltages
    SystemInfo,
    /// Show device identity: core type, customer id, software and hardware version
    DeviceInfo,
    /// Stop the running program
    Stop,
    /// Start charging
    Charge(ProgramArgs),
    /// Start fast charging
    FastCharge(ProgramArgs),
    /// Start discharging
    Discharge(ProgramArgs),
}

const fn about_text() -> &'static str {
    "iMAX B6 mini charger command line tool"
}

#[derive(Parser, Debug)]
#[command(version, about=about_text(), long_about = None)]
pub struct CliArgs {
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// USB vendor id of the charger (decimal or 0x prefixed hex)
    #[arg(long, value_parser = maybe_hex::<u16>, default_value_t = imaxb6_lib::usb::VID)]
    pub vid: u16,

    /// USB product id of the charger (decimal or 0x prefixed hex)
    #[arg(long, value_parser = maybe_hex::<u16>, default_value_t = imaxb6_lib::usb::PID)]
    pub pid: u16,

    #[command(subcommand)]
    pub command: CliCommands,

    /// Timeout for writing a command and for reading its reply (e.g., "500ms", "1s")
    #[arg(value_parser = humantime::parse_duration, long, default_value = "500ms")]
    pub timeout: Duration,

    /// Number of attempts for a command
    #[arg(long, default_value = "5")]
    pub retries: u8,

    /// Reject replies with a broken envelope checksum
    #[arg(long)]
    pub strict: bool,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,
}
