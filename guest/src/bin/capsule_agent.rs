//! capsule-agent - control agent running inside the VM.
//!
//! Mounts the basic filesystems, opens the control port and serves host
//! requests. End of stream on the port is retried, so the agent keeps
//! serving across host reconnects.

use capsule_channel::Channel;
use capsule_guest::{Dispatcher, GuestChannel, IoctlNetwork, RuncRuntime, serial};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capsule-agent")]
#[command(about = "Capsule guest agent")]
struct Cli {
    /// Serial device used when no port with --port-name is found
    #[arg(long, default_value = "/dev/vport2p1")]
    serial_device: PathBuf,

    /// Name of the virtio serial port carrying the control channel
    #[arg(long, default_value = "cvm.channel.0")]
    port_name: String,

    /// Where the host's shared directory is mounted
    #[arg(long, default_value = "/cvmfs")]
    share_mount: PathBuf,

    /// Root below which the basic filesystems are mounted
    #[arg(long, default_value = "/")]
    root: PathBuf,

    #[arg(long, default_value = "runc")]
    runc: PathBuf,

    /// Directory for container bundles and runc state
    #[arg(long, default_value = "/run/capsule")]
    state_dir: PathBuf,

    /// OCI config used as a template for every container
    #[arg(long, default_value = "/config.json")]
    base_spec: PathBuf,
}

fn open_port(path: &Path) -> std::io::Result<(tokio::fs::File, tokio::fs::File)> {
    let port = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
    // Separate handles so a pending read never holds up a write.
    let writer = port.try_clone()?;
    Ok((
        tokio::fs::File::from_std(port),
        tokio::fs::File::from_std(writer),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting capsule agent");

    capsule_mount::mount_basic_filesystems(&cli.root)?;
    if let Err(e) = capsule_network::ioctl::set_link_up("lo") {
        tracing::warn!("Failed to bring up loopback: {}", e);
    }

    let port = serial::resolve_port(&cli.port_name, &cli.serial_device);
    let (reader, writer) = open_port(&port)?;
    tracing::info!("Opened control port {}", port.display());

    let mut channel: GuestChannel = Channel::reopening(reader, writer);
    let dispatcher = Dispatcher::new(
        IoctlNetwork,
        RuncRuntime::new(&cli.runc, &cli.state_dir, &cli.base_spec),
        &cli.share_mount,
    );
    dispatcher.run(&mut channel).await?;

    // As init, exiting would take the whole VM down with it.
    if std::process::id() == 1 {
        tracing::info!("Control channel failed, idling");
        std::future::pending::<()>().await;
    }

    Ok(())
}
