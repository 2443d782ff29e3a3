use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mtp_core::protocol::constants::ALL_STORAGES;
use mtp_core::transport::MockAllocator;
use mtp_core::{
    EndpointSet, LoopbackHost, MtpInitiator, MtpInterface, NusbTransport, ResponderConfig,
    StaticIndex, SystemPlatform, TracingObserver, UsbTransport,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "MTP responder tool (Pure Rust)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a host/device exchange against an in-process responder
    Simulate {
        /// Responder configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// File names to put in the media index
        #[arg(long = "object")]
        objects: Vec<String>,

        /// Battery level reported by the device
        #[arg(long, default_value_t = 100)]
        battery: u8,
    },
    /// Query a real MTP device over USB
    Probe {
        /// Vendor id (hex)
        #[arg(long, value_parser = parse_hex_u16, requires = "pid")]
        vid: Option<u16>,

        /// Product id (hex)
        #[arg(long, value_parser = parse_hex_u16, requires = "vid")]
        pid: Option<u16>,
    },
    /// Print the MTP interface descriptor block
    Descriptor {
        /// Bulk endpoint max packet size
        #[arg(long, default_value_t = 512)]
        max_packet_size: u16,

        /// Interface number
        #[arg(long, default_value_t = 0)]
        interface: u8,
    },
    /// Write a default configuration file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{}': {}", s, e))
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {}", e);
    }

    if let Err(e) = run(args.command) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Simulate {
            config,
            objects,
            battery,
        } => simulate(config, objects, battery),
        Commands::Probe { vid, pid } => {
            let transport = match (vid, pid) {
                (Some(vid), Some(pid)) => NusbTransport::open_with_ids(vid, pid)?,
                _ => NusbTransport::open()?,
            };
            info!(
                vid = %format!("{:04X}", transport.vendor_id()),
                pid = %format!("{:04X}", transport.product_id()),
                "Probing device"
            );
            report(&mut MtpInitiator::new(transport))
        }
        Commands::Descriptor {
            max_packet_size,
            interface,
        } => {
            let mut alloc = MockAllocator::with_endpoints(&[1, 2, 3]);
            let endpoints = EndpointSet::request(&mut alloc)?;
            let mut mtp = MtpInterface::new(endpoints);
            let next = mtp.set_first_interface(interface);
            let desc = mtp.config_descriptor(max_packet_size);
            for chunk in desc.chunks(16) {
                let line: Vec<String> = chunk.iter().map(|b| format!("{:02X}", b)).collect();
                println!("{}", line.join(" "));
            }
            info!(bytes = desc.len(), next_interface = next, "Descriptor built");
            Ok(())
        }
        Commands::InitConfig { path } => {
            ResponderConfig::default()
                .save_to_file(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn simulate(config: Option<PathBuf>, objects: Vec<String>, battery: u8) -> Result<()> {
    let config = match config {
        Some(path) => ResponderConfig::load_from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ResponderConfig::default(),
    };
    let objects = if objects.is_empty() {
        vec![
            "/Music/Artist/Album/01 - Intro.mp3".to_string(),
            "/Music/Artist/Album/02 - Song.flac".to_string(),
            "/Podcasts/Episode 1.ogg".to_string(),
        ]
    } else {
        objects
    };

    info!(objects = objects.len(), "Starting loopback simulation");
    let host = LoopbackHost::connect(
        StaticIndex::new(objects),
        SystemPlatform {
            battery_level: battery,
        },
        config,
        Arc::new(TracingObserver),
    );
    report(&mut MtpInitiator::new(host))
}

/// Walk a device the way a host browser would and print what it reports.
fn report<T: UsbTransport>(initiator: &mut MtpInitiator<T>) -> Result<()> {
    let info = initiator.device_info()?;
    println!("Manufacturer:  {}", info.manufacturer);
    println!("Model:         {}", info.model);
    println!("Version:       {}", info.device_version);
    println!("Serial:        {}", info.serial_number);
    println!("Operations:    {:04X?}", info.operations);
    println!("Properties:    {:04X?}", info.device_properties);

    initiator.open_session(1)?;

    for storage_id in initiator.storage_ids()? {
        let storage = initiator.storage_info(storage_id)?;
        println!(
            "Storage {:08X}: {} ({})",
            storage_id, storage.description, storage.volume_identifier
        );
    }

    let handles = initiator.object_handles(ALL_STORAGES)?;
    println!("Objects:       {}", handles.len());

    match initiator.battery_level() {
        Ok(level) => println!("Battery:       {}%", level),
        Err(e) => println!("Battery:       unavailable ({})", e),
    }
    match initiator.date_time() {
        Ok(now) => println!("Date/time:     {}", now),
        Err(e) => println!("Date/time:     unavailable ({})", e),
    }
    match initiator.friendly_name() {
        Ok(name) => println!("Name:          {}", name),
        Err(e) => println!("Name:          unavailable ({})", e),
    }

    initiator.close_session()?;
    Ok(())
}
