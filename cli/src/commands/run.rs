use crate::utils::split_command;
use capsule_shim::{ProcessConfig, StartCallback, StartOpts, Supervisor, SupervisorConfig};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct RunArgs {
    /// Container ID
    #[arg(long)]
    id: String,

    /// Container root filesystem; its parent directory is shared with the VM
    #[arg(long)]
    rootfs: PathBuf,

    /// Network namespace holding the container's interface
    #[arg(long)]
    netns: PathBuf,

    /// Environment variables (KEY=VALUE)
    #[arg(short, long)]
    env: Vec<String>,

    /// Guest kernel
    #[arg(long)]
    kernel: Option<PathBuf>,

    /// Guest initrd containing the agent
    #[arg(long)]
    initrd: Option<PathBuf>,

    /// Memory in MiB
    #[arg(long)]
    memory: Option<u32>,

    #[arg(long)]
    vcpus: Option<u32>,

    /// Command to run in the container
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

impl RunArgs {
    fn apply(&self, mut config: SupervisorConfig) -> SupervisorConfig {
        if let Some(kernel) = &self.kernel {
            config.hypervisor.kernel = kernel.clone();
        }
        if let Some(initrd) = &self.initrd {
            config.hypervisor.initrd = initrd.clone();
        }
        if let Some(memory) = self.memory {
            config.hypervisor.memory_mib = memory;
        }
        if let Some(vcpus) = self.vcpus {
            config.hypervisor.vcpus = vcpus;
        }
        config
    }
}

pub async fn run_session(
    config: SupervisorConfig,
    args: RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let supervisor = Supervisor::new(args.apply(config)).await?;
    tracing::info!("Using {}", supervisor.name());

    let (entrypoint, arguments) = split_command(&args.command).ok_or("No command given")?;
    let opts = StartOpts {
        container_id: args.id.clone(),
        rootfs: args.rootfs,
        netns: args.netns,
        process: ProcessConfig {
            entrypoint,
            arguments,
            env: args.env,
        },
    };

    let callback: StartCallback = Box::new(|process: &ProcessConfig, pid: u32| {
        tracing::info!(pid, command = ?process.argv(), "Workload started");
    });

    let id = args.id;
    let mut start = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start(opts, Some(callback)).await }
    });

    let result = tokio::select! {
        res = &mut start => res??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(container_id = %id, "Interrupted, terminating VM");
            if let Err(e) = supervisor.terminate(&id).await {
                tracing::warn!(container_id = %id, "Failed to terminate: {}", e);
            }
            start.await??
        }
    };

    supervisor.clean(&id).await?;

    match result.error {
        Some(error) => Err(format!("Session {} failed: {}", id, error).into()),
        None => Ok(()),
    }
}
