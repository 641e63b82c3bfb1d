//! `ifconfig <name> inet6 ... up` / `ifconfig <name> mtu ...` /
//! `route -n add|delete -inet6 ...` / `netstat -I <name> -b`.

use crate::error::ConfigError;
use crate::exec::run;
use crate::{validate, Configurator, InterfaceStats, Route};

const IDEMPOTENT: &[&str] = &["File exists", "already exists"];

pub struct DarwinConfigurator;

impl Configurator for DarwinConfigurator {
    fn configure(&self, iface: &str, address: &str, mtu: u32) -> Result<(), ConfigError> {
        validate::validate_ipv6(address)?;
        validate::validate_mtu(mtu)?;

        run(
            "ifconfig",
            &[
                iface.into(),
                "inet6".into(),
                address.into(),
                "prefixlen".into(),
                "64".into(),
                "up".into(),
            ],
            IDEMPOTENT,
        )?;

        run("ifconfig", &[iface.into(), "mtu".into(), mtu.to_string()], &[])?;

        Ok(())
    }

    fn add_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError> {
        validate::validate_route(&route.cidr)?;
        run(
            "route",
            &[
                "-n".into(),
                "add".into(),
                "-inet6".into(),
                route.cidr.clone(),
                "-interface".into(),
                iface.into(),
            ],
            IDEMPOTENT,
        )?;
        Ok(())
    }

    fn remove_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError> {
        validate::validate_route(&route.cidr)?;
        run(
            "route",
            &[
                "-n".into(),
                "delete".into(),
                "-inet6".into(),
                route.cidr.clone(),
                "-interface".into(),
                iface.into(),
            ],
            &["not in table"],
        )?;
        Ok(())
    }

    fn stats(&self, iface: &str) -> Result<InterfaceStats, ConfigError> {
        let output = run("netstat", &["-I".into(), iface.into(), "-b".into()], &[])?;
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if raw.is_empty() {
            return Err(ConfigError::StatsUnavailable);
        }
        Ok(InterfaceStats { raw })
    }
}
