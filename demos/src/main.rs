//! Terminal front end for the weather fetcher: check on a timer, print
//! the icon bucket and conditions line. Stands in for a desktop tray
//! icon.

use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::warn;
use wxfetch::{fetch_weather, AppConfig, AppState, Units};

#[derive(Parser, Debug)]
#[command(name = "wxfetch", about = "Periodically fetch and show current weather")]
struct Args {
    /// openweathermap.org API key
    #[arg(short = 'k', long = "key")]
    api_key: String,

    /// ZIP code to check the weather for
    #[arg(short = 'z', long = "zip")]
    zipcode: String,

    /// Report temperatures in celsius instead of fahrenheit
    #[arg(short = 'c', long = "celsius")]
    celsius: bool,

    /// Seconds between checks
    #[arg(
        short = 'i',
        long = "interval",
        default_value_t = 1800,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: u64,

    /// Talk plain http to the API instead of https
    #[arg(long = "insecure")]
    insecure: bool,

    /// Fetch once and exit
    #[arg(long = "once")]
    once: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let mut config = AppConfig::new(&args.api_key, &args.zipcode);
    config.units = if args.celsius {
        Units::Celsius
    } else {
        Units::Fahrenheit
    };
    config.interval = Duration::from_secs(args.interval);
    config.secure = !args.insecure;

    let mut state = AppState::new();
    loop {
        match fetch_weather(&config, &mut state) {
            Ok(()) => {
                if let Some(report) = &state.report {
                    println!("[{}] {}", report.icon().name(), report.title(config.units));
                }
            }
            Err(e) => {
                warn!("weather check failed, trying again next cycle: {e}");
                if args.once {
                    return ExitCode::FAILURE;
                }
            }
        }
        if args.once {
            return ExitCode::SUCCESS;
        }
        thread::sleep(state.sleep_for(config.interval));
    }
}
