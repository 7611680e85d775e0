use crate::error::GuestError;
use async_trait::async_trait;
use oci_spec::runtime::{LinuxNamespaceType, RootBuilder, Spec};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs;
use tokio::process::Command;

/// Creates and starts containers inside the guest.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create_container(
        &self,
        id: &str,
        rootfs: &str,
        args: &[String],
        env: &[String],
    ) -> Result<(), GuestError>;
}

/// Runs containers with `runc run --detach`.
#[derive(Debug, Clone)]
pub struct RuncRuntime {
    runc: PathBuf,
    state_dir: PathBuf,
    base_spec: PathBuf,
}

impl Default for RuncRuntime {
    fn default() -> Self {
        Self::new("runc", "/run/capsule", "/config.json")
    }
}

fn oci_err(e: impl std::fmt::Display) -> GuestError {
    GuestError::OciSpec(e.to_string())
}

impl RuncRuntime {
    /// `base_spec` is an OCI config used as a template when present.
    pub fn new(
        runc: impl Into<PathBuf>,
        state_dir: impl Into<PathBuf>,
        base_spec: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runc: runc.into(),
            state_dir: state_dir.into(),
            base_spec: base_spec.into(),
        }
    }

    fn load_spec(&self) -> Result<Spec, GuestError> {
        if self.base_spec.exists() {
            tracing::debug!("Loading base spec from {}", self.base_spec.display());
            return Spec::load(&self.base_spec).map_err(oci_err);
        }
        Ok(Spec::default())
    }

    fn generate_spec(&self, rootfs: &str, args: &[String], env: &[String]) -> Result<Spec, GuestError> {
        let mut spec = self.load_spec()?;

        let root = RootBuilder::default()
            .path(rootfs)
            .readonly(false)
            .build()
            .map_err(oci_err)?;

        let mut process = spec.process().clone().unwrap_or_default();
        process.set_args(Some(args.to_vec()));
        if !env.is_empty() {
            process.set_env(Some(env.to_vec()));
        }
        process.set_terminal(Some(false));

        spec.set_root(Some(root));
        spec.set_process(Some(process));
        share_vm_network(&mut spec);
        Ok(spec)
    }
}

/// The container joins the VM's network namespace, where eth0 carries the
/// transplanted address.
fn share_vm_network(spec: &mut Spec) {
    let Some(mut linux) = spec.linux().clone() else {
        return;
    };
    let namespaces = linux.namespaces().clone().map(|namespaces| {
        namespaces
            .into_iter()
            .filter(|ns| !matches!(ns.typ(), LinuxNamespaceType::Network))
            .collect()
    });
    linux.set_namespaces(namespaces);
    spec.set_linux(Some(linux));
}

#[async_trait]
impl ContainerRuntime for RuncRuntime {
    async fn create_container(
        &self,
        id: &str,
        rootfs: &str,
        args: &[String],
        env: &[String],
    ) -> Result<(), GuestError> {
        if args.is_empty() {
            return Err(GuestError::Runtime("no command given".to_string()));
        }
        if !Path::new(rootfs).is_dir() {
            return Err(GuestError::Runtime(format!("rootfs {} does not exist", rootfs)));
        }

        let bundle = self.state_dir.join(id);
        fs::create_dir_all(&bundle).await?;

        let spec = self.generate_spec(rootfs, args, env)?;
        fs::write(bundle.join("config.json"), serde_json::to_string_pretty(&spec)?).await?;

        tracing::info!(container_id = %id, bundle = ?bundle, "Starting container with runc run");

        let status = Command::new(&self.runc)
            .arg("--root")
            .arg(self.state_dir.join("runc"))
            .arg("run")
            .arg("--bundle")
            .arg(&bundle)
            .arg("--pid-file")
            .arg(bundle.join("container.pid"))
            .arg("--no-pivot")
            .arg("--detach")
            .arg(id)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| GuestError::Runtime(format!("Failed to spawn runc: {}", e)))?;

        if !status.success() {
            tracing::error!(container_id = %id, status = ?status, "runc run failed");
            return Err(GuestError::Runtime(format!(
                "runc run failed with status: {}",
                status
            )));
        }

        tracing::info!(container_id = %id, "Container started");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args() -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), "echo hi".to_string()]
    }

    #[test]
    fn test_generate_spec_overrides_process() {
        let dir = TempDir::new().unwrap();
        let runtime = RuncRuntime::new("runc", dir.path(), dir.path().join("missing.json"));

        let spec = runtime
            .generate_spec("/cvmfs/rootfs", &args(), &["A=1".to_string()])
            .unwrap();

        assert_eq!(spec.root().as_ref().unwrap().path(), Path::new("/cvmfs/rootfs"));
        let process = spec.process().as_ref().unwrap();
        assert_eq!(process.args().as_ref().unwrap(), &args());
        assert_eq!(process.env().as_ref().unwrap(), &vec!["A=1".to_string()]);
    }

    #[test]
    fn test_empty_env_keeps_base_env() {
        let dir = TempDir::new().unwrap();
        let runtime = RuncRuntime::new("runc", dir.path(), dir.path().join("missing.json"));

        let base_env = Spec::default().process().clone().unwrap().env().clone();
        let spec = runtime.generate_spec("/cvmfs/rootfs", &args(), &[]).unwrap();
        assert_eq!(spec.process().as_ref().unwrap().env(), &base_env);
    }

    fn namespace_types(spec: &Spec) -> Vec<LinuxNamespaceType> {
        spec.linux()
            .as_ref()
            .and_then(|linux| linux.namespaces().clone())
            .unwrap_or_default()
            .iter()
            .map(|ns| ns.typ())
            .collect()
    }

    #[test]
    fn test_container_shares_vm_network() {
        let dir = TempDir::new().unwrap();
        let runtime = RuncRuntime::new("runc", dir.path(), dir.path().join("missing.json"));
        assert!(namespace_types(&Spec::default()).contains(&LinuxNamespaceType::Network));

        let spec = runtime.generate_spec("/cvmfs/rootfs", &args(), &[]).unwrap();
        let types = namespace_types(&spec);
        assert!(!types.contains(&LinuxNamespaceType::Network));
        assert!(types.contains(&LinuxNamespaceType::Mount));
        assert!(types.contains(&LinuxNamespaceType::Pid));
    }

    #[test]
    fn test_template_network_namespace_is_dropped() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("config.json");
        Spec::default().save(&base).unwrap();

        let runtime = RuncRuntime::new("runc", dir.path(), &base);
        let spec = runtime.generate_spec("/cvmfs/rootfs", &args(), &[]).unwrap();
        assert!(!namespace_types(&spec).contains(&LinuxNamespaceType::Network));
    }

    #[test]
    fn test_base_spec_is_loaded() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("config.json");
        let mut template = Spec::default();
        template.set_hostname(Some("from-template".to_string()));
        template.save(&base).unwrap();

        let runtime = RuncRuntime::new("runc", dir.path(), &base);
        let spec = runtime.generate_spec("/cvmfs/rootfs", &args(), &[]).unwrap();
        assert_eq!(spec.hostname().as_deref(), Some("from-template"));
    }

    #[tokio::test]
    async fn test_create_container_writes_bundle() {
        let dir = TempDir::new().unwrap();
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(&rootfs).unwrap();
        let runtime = RuncRuntime::new("true", dir.path().join("state"), dir.path().join("none.json"));

        runtime
            .create_container("abc123def456", &rootfs.to_string_lossy(), &args(), &[])
            .await
            .unwrap();

        let config = dir.path().join("state/abc123def456/config.json");
        let spec = Spec::load(&config).unwrap();
        assert_eq!(spec.root().as_ref().unwrap().path(), &rootfs);
    }

    #[tokio::test]
    async fn test_runc_failure() {
        let dir = TempDir::new().unwrap();
        let rootfs = dir.path().join("rootfs");
        std::fs::create_dir_all(&rootfs).unwrap();
        let runtime = RuncRuntime::new("false", dir.path().join("state"), dir.path().join("none.json"));

        let err = runtime
            .create_container("abc123def456", &rootfs.to_string_lossy(), &args(), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("runc run failed"));
    }

    #[tokio::test]
    async fn test_missing_rootfs() {
        let dir = TempDir::new().unwrap();
        let runtime = RuncRuntime::new("true", dir.path(), dir.path().join("none.json"));

        let err = runtime
            .create_container("abc123def456", "/nonexistent/rootfs", &args(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GuestError::Runtime(_)));
        assert!(!dir.path().join("abc123def456").exists());
    }
}
