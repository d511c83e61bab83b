use clap::{Parser, Subcommand};
use log::info;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use wolctl::registry::{DeviceEntry, Registry};
use wolctl::wol::{self, WakeParams};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the device registry file.
    #[arg(long, env = "WOLCTL_DEVICES_FILE", default_value = "devices.json")]
    devices_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered devices.
    List,
    /// Register a device.
    Add {
        /// Display name for the device.
        name: String,
        /// MAC address, e.g. aa:bb:cc:dd:ee:ff.
        mac: String,
    },
    /// Change the name or MAC address of a registered device.
    Edit {
        /// Device position as shown by `list`.
        position: usize,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        mac: Option<String>,
    },
    /// Remove a device from the registry.
    Remove {
        /// Device position as shown by `list`.
        position: usize,
    },
    /// Send a Wake-on-LAN magic packet.
    Wake {
        /// Registry position, device name, or literal MAC address.
        target: String,
        /// Broadcast address to send to.
        #[arg(long, default_value_t = Ipv4Addr::BROADCAST)]
        broadcast: Ipv4Addr,
        /// Destination UDP port.
        #[arg(long, default_value_t = 9)]
        port: u16,
        /// Local interface address to send from, if not the default route.
        #[arg(long)]
        interface: Option<Ipv4Addr>,
    },
}

fn entry_at(registry: &Registry, position: usize) -> Result<DeviceEntry, String> {
    position
        .checked_sub(1)
        .and_then(|i| registry.entries().get(i))
        .cloned()
        .ok_or_else(|| format!("no device at position {position}; run `list`"))
}

fn resolve_wake_target(registry: &Registry, target: &str) -> String {
    if let Ok(position) = target.parse::<usize>() {
        if let Ok(entry) = entry_at(registry, position) {
            return entry.mac;
        }
    }
    if let Some(entry) = registry.entries().iter().find(|e| e.name == target) {
        return entry.mac.clone();
    }
    target.to_string()
}

fn print_entries(registry: &Registry) {
    if registry.entries().is_empty() {
        println!("no devices registered");
        return;
    }
    println!("{:>3}  {:<24}  MAC", "#", "NAME");
    for (i, entry) in registry.entries().iter().enumerate() {
        println!("{:>3}  {:<24}  {}", i + 1, entry.name, entry.mac);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("INFO"))
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Millis))
        .init();

    let mut registry = Registry::load(&args.devices_file)?;

    match args.command {
        Command::List => print_entries(&registry),
        Command::Add { name, mac } => {
            registry.add(&name, &mac)?;
            print_entries(&registry);
        }
        Command::Edit {
            position,
            name,
            mac,
        } => {
            let entry = entry_at(&registry, position)?;
            registry.update(
                entry.id,
                name.as_deref().unwrap_or(&entry.name),
                mac.as_deref().unwrap_or(&entry.mac),
            )?;
            print_entries(&registry);
        }
        Command::Remove { position } => {
            let entry = entry_at(&registry, position)?;
            let removed = registry.remove(entry.id)?;
            info!("removed {} ({})", removed.name, removed.mac);
            print_entries(&registry);
        }
        Command::Wake {
            target,
            broadcast,
            port,
            interface,
        } => {
            let mac_text = resolve_wake_target(&registry, &target);
            let params = WakeParams {
                broadcast,
                port,
                interface,
            };
            wol::wake(&mac_text, &params)?;
            info!(
                "wake-on-lan packet sent to {} via {}:{} (interface: {})",
                mac_text,
                broadcast,
                port,
                interface.map_or_else(|| "default".to_string(), |i| i.to_string()),
            );
        }
    }
    Ok(())
}
