//! Locating the virtio serial port that carries the control channel.

use std::path::{Path, PathBuf};

pub const VIRTIO_PORTS: &str = "/sys/class/virtio-ports";

/// Find the device node of the virtio port named `name` by scanning
/// `sys_dir` (normally [`VIRTIO_PORTS`]).
pub fn find_port(sys_dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(sys_dir).ok()?;

    for entry in entries.flatten() {
        let Ok(port_name) = std::fs::read_to_string(entry.path().join("name")) else {
            continue;
        };
        if port_name.trim() == name {
            return Some(Path::new("/dev").join(entry.file_name()));
        }
    }
    None
}

/// The port named `name` if the kernel exposes it, otherwise `fallback`.
pub fn resolve_port(name: &str, fallback: &Path) -> PathBuf {
    match find_port(Path::new(VIRTIO_PORTS), name) {
        Some(path) => {
            tracing::debug!("Found virtio port {} at {}", name, path.display());
            path
        }
        None => fallback.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn port(dir: &Path, dev: &str, name: &str) {
        std::fs::create_dir_all(dir.join(dev)).unwrap();
        std::fs::write(dir.join(dev).join("name"), format!("{}\n", name)).unwrap();
    }

    #[test]
    fn test_find_port_by_name() {
        let dir = TempDir::new().unwrap();
        port(dir.path(), "vport1p1", "org.qemu.guest_agent.0");
        port(dir.path(), "vport2p1", "cvm.channel.0");
        std::fs::create_dir_all(dir.path().join("vport3p1")).unwrap();

        assert_eq!(
            find_port(dir.path(), "cvm.channel.0"),
            Some(PathBuf::from("/dev/vport2p1"))
        );
        assert_eq!(find_port(dir.path(), "missing"), None);
    }

    #[test]
    fn test_missing_sys_dir() {
        assert_eq!(find_port(Path::new("/nonexistent/virtio-ports"), "cvm.channel.0"), None);
    }
}
