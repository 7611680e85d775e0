use capsule_shim::SupervisorConfig;
use std::path::Path;

/// Configuration from `path`, or the defaults. Missing fields take their
/// default values.
pub fn load_config(path: Option<&Path>) -> Result<SupervisorConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(SupervisorConfig::default());
    };

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    let config = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
    Ok(config)
}

/// Split a command line into the entrypoint and its arguments.
pub fn split_command(command: &[String]) -> Option<(String, Vec<String>)> {
    let (entrypoint, arguments) = command.split_first()?;
    Some((entrypoint.clone(), arguments.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = load_config(None).unwrap();
        assert_eq!(config, SupervisorConfig::default());
    }

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capsule.json");
        std::fs::write(&path, r#"{"hypervisor": {"vcpus": 2}}"#).unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.hypervisor.vcpus, 2);
        assert_eq!(config.hypervisor.memory_mib, 128);
    }

    #[test]
    fn test_load_config_errors() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(dir.path().join("missing.json").as_path())).is_err());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_config(Some(path.as_path())).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));
    }

    #[test]
    fn test_split_command() {
        let command = vec!["/bin/sh".to_string(), "-c".to_string(), "true".to_string()];
        let (entrypoint, arguments) = split_command(&command).unwrap();
        assert_eq!(entrypoint, "/bin/sh");
        assert_eq!(arguments, vec!["-c", "true"]);
        assert!(split_command(&[]).is_none());
    }
}
