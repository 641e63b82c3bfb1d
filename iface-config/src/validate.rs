use crate::error::ConfigError;
use std::net::Ipv6Addr;
use std::str::FromStr;

pub const MIN_MTU: u32 = 1280;
pub const MAX_MTU: u32 = 65535;

/// Accepts canonical, compressed, zone-id (`fe80::1%eth0`), and
/// IPv4-mapped (`::ffff:192.0.2.1`) IPv6 literals.
pub fn validate_ipv6(address: &str) -> Result<(), ConfigError> {
    let unzoned = address.split('%').next().unwrap_or(address);
    Ipv6Addr::from_str(unzoned)
        .map(|_| ())
        .map_err(|_| ConfigError::InvalidArgument(format!("{address} is not a valid IPv6 address")))
}

pub fn validate_mtu(mtu: u32) -> Result<(), ConfigError> {
    if (MIN_MTU..=MAX_MTU).contains(&mtu) {
        Ok(())
    } else {
        Err(ConfigError::InvalidArgument(format!(
            "MTU must be between {MIN_MTU} and {MAX_MTU}"
        )))
    }
}

pub fn validate_route(cidr: &str) -> Result<(), ConfigError> {
    if cidr.is_empty() {
        Err(ConfigError::InvalidArgument("route must be non-empty".into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_canonical_compressed_zone_and_v4_mapped() {
        assert!(validate_ipv6("fd00:0:0:0:0:0:0:1").is_ok());
        assert!(validate_ipv6("fd00::1").is_ok());
        assert!(validate_ipv6("fe80::1%eth0").is_ok());
        assert!(validate_ipv6("::ffff:192.0.2.1").is_ok());
    }

    #[test]
    fn rejects_garbage() {
        assert!(validate_ipv6("not-an-ip").is_err());
        assert!(validate_ipv6("").is_err());
    }

    #[test]
    fn mtu_range_matches_scenario_6() {
        assert!(validate_mtu(1500).is_ok());
        assert!(validate_mtu(100).is_err());
        assert!(validate_mtu(1279).is_err());
        assert!(validate_mtu(65536).is_err());
    }

    #[test]
    fn route_rejects_empty_string() {
        assert!(validate_route("fd00::1/128").is_ok());
        assert!(validate_route("").is_err());
    }
}
