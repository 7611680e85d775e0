use crate::error::GuestError;
use capsule_network::ioctl;
use std::net::Ipv4Addr;

/// Applies an IPv4 configuration to a guest interface.
pub trait GuestNetwork: Send + Sync {
    fn set_ip(&self, iface: &str, address: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), GuestError>;
}

/// Configures interfaces with `SIOCSIFADDR`, `SIOCSIFNETMASK` and
/// `SIOCSIFFLAGS`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IoctlNetwork;

impl GuestNetwork for IoctlNetwork {
    fn set_ip(&self, iface: &str, address: Ipv4Addr, netmask: Ipv4Addr) -> Result<(), GuestError> {
        let err = |source| GuestError::Network {
            iface: iface.to_string(),
            source,
        };

        ioctl::set_address(iface, address).map_err(err)?;
        ioctl::set_netmask(iface, netmask).map_err(err)?;
        ioctl::set_link_up(iface).map_err(err)?;
        Ok(())
    }
}

pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, GuestError> {
    s.parse()
        .map_err(|_| GuestError::InvalidAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        assert_eq!(parse_ipv4("10.0.0.5").unwrap(), Ipv4Addr::new(10, 0, 0, 5));
        assert!(matches!(parse_ipv4("10.0.0"), Err(GuestError::InvalidAddress(_))));
        assert!(parse_ipv4("").is_err());
    }

    #[test]
    fn test_missing_interface() {
        let err = IoctlNetwork
            .set_ip("nonexistent0", Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(255, 0, 0, 0))
            .unwrap_err();
        assert!(matches!(err, GuestError::Network { ref iface, .. } if iface == "nonexistent0"));
    }
}
