use crate::error::GuestError;
use crate::net::{GuestNetwork, parse_ipv4};
use crate::runtime::ContainerRuntime;
use capsule_channel::{Ack, AddContainer, Channel, GuestMessage, HostMessage, SetIp};
use std::path::PathBuf;

pub type GuestChannel = Channel<HostMessage, GuestMessage>;

/// Fresh 12-character id for a container started in this guest.
pub fn session_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Answers host requests, one at a time, in arrival order.
pub struct Dispatcher<N, R> {
    network: N,
    runtime: R,
    share_mount: PathBuf,
}

impl<N: GuestNetwork, R: ContainerRuntime> Dispatcher<N, R> {
    pub fn new(network: N, runtime: R, share_mount: impl Into<PathBuf>) -> Self {
        Self {
            network,
            runtime,
            share_mount: share_mount.into(),
        }
    }

    /// Announce readiness and serve requests until the inbound pump stops.
    ///
    /// Over a [`Channel::reopening`] port that only happens on a read error,
    /// so the loop outlives host disconnects.
    pub async fn run(&self, channel: &mut GuestChannel) -> Result<(), GuestError> {
        channel.send(GuestMessage::AgentReady).await?;
        tracing::info!("Agent ready");

        while let Some(msg) = channel.recv().await {
            let ack = self.handle(msg).await;
            channel.send(GuestMessage::Ack(ack)).await?;
        }

        tracing::warn!("Control channel closed");
        Ok(())
    }

    pub async fn handle(&self, msg: HostMessage) -> Ack {
        match msg {
            HostMessage::SetIp(req) => {
                tracing::info!(iface = %req.iface, address = %req.address, netmask = %req.netmask, "Recv SET_IP");
                match self.set_ip(&req) {
                    Ok(()) => {
                        tracing::info!("Set ip success");
                        Ack::ok()
                    }
                    Err(e) => {
                        tracing::error!("Set ip error: {}", e);
                        Ack::error(e.to_string())
                    }
                }
            }
            HostMessage::AddContainer(req) => {
                tracing::info!(rootfs = %req.rootfs, args = ?req.args, "Recv ADD_CONTAINER");
                match self.add_container(&req).await {
                    Ok(id) => {
                        tracing::info!(container_id = %id, "Create container success");
                        Ack::ok()
                    }
                    Err(e) => {
                        tracing::error!("Create container error: {}", e);
                        Ack::error(e.to_string())
                    }
                }
            }
        }
    }

    fn set_ip(&self, req: &SetIp) -> Result<(), GuestError> {
        let address = parse_ipv4(&req.address)?;
        let netmask = parse_ipv4(&req.netmask)?;
        self.network.set_ip(&req.iface, address, netmask)
    }

    async fn add_container(&self, req: &AddContainer) -> Result<String, GuestError> {
        // The runtime still gets a chance if the share is unavailable.
        if let Err(e) = capsule_mount::mount_share(&self.share_mount) {
            tracing::error!("Mount error: {}", e);
        }

        let id = session_id();
        self.runtime
            .create_container(&id, &req.rootfs, &req.args, &req.env)
            .await?;
        Ok(id)
    }
}
