use clap::Parser;
use ratethissound::{
    args::{
        CommandTask::{Ports, Record, Show},
        RateArgs, RecordCommand, ShowCommand,
    },
    config::SessionConfig,
    controller::SessionController,
    dummy_source::{DummyRatingSource, WithDummy},
    gui::{device_selector, session_view},
    log_format::{read_log, LogSummary},
    playback::SinkProvider,
    rating_source::SerialPortOpener,
};

use log::{info, warn};
use serial2::SerialPort;
use std::{error::Error, sync::Arc};

// Example:
// cargo run -- record --out ratings.csv --audio stimulus.wav --port /dev/ttyACM0
// cargo run -- show ratings.csv

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = RateArgs::parse();

    match args.command {
        Record(cmd) => record(cmd),
        Ports => {
            let available_ports = SerialPort::available_ports()?;
            println!("Available devices:");
            for port in available_ports {
                println!("\t{}", port.to_string_lossy());
            }
            Ok(())
        }
        Show(cmd) => show(cmd),
    }
}

#[cfg(feature = "cpal")]
fn sink_provider() -> Arc<dyn SinkProvider> {
    Arc::new(ratethissound::cpal_sink::CpalSinkProvider)
}

#[cfg(not(feature = "cpal"))]
fn sink_provider() -> Arc<dyn SinkProvider> {
    warn!("Built without an audio backend, the stimulus will be timed but silent.");
    Arc::new(ratethissound::playback::PacedSinkProvider)
}

fn record(cmd: RecordCommand) -> Result<(), Box<dyn Error>> {
    let mut config = match &cmd.config {
        Some(path) => SessionConfig::from_path(path)?,
        None => SessionConfig::default(),
    };
    if let Some(baud_rate) = cmd.baud_rate {
        config.baud_rate = baud_rate;
    }

    let port = match cmd.port {
        Some(port) => port,
        None => {
            // Ask the user for the device
            let available_ports = SerialPort::available_ports()?;
            match device_selector(available_ports)? {
                Some(port) => port,
                None => {
                    info!("No device selected, quitting.");
                    return Ok(());
                }
            }
        }
    };

    let opener = WithDummy::new(
        SerialPortOpener::new(config.baud_rate, config.read_timeout()),
        DummyRatingSource::builder(),
    );
    let mut controller = SessionController::builder()
        .config(config)
        .port_opener(opener)
        .sink_provider(sink_provider())
        .build();

    controller.select_output_destination(Some(cmd.outfile));
    controller.select_audio_resource(cmd.audio);
    if let Err(e) = controller.select_port(Some(&port)) {
        eprintln!("{}", e);
    }

    let res = session_view(&mut controller);
    controller.cancel();
    Ok(res?)
}

fn show(cmd: ShowCommand) -> Result<(), Box<dyn Error>> {
    let records = read_log(&cmd.logfile)?;
    if cmd.verbose {
        for record in &records {
            println!("{}\t{}", record.offset, record.value);
        }
    }
    print!("{}", LogSummary::from_records(&records));
    Ok(())
}
