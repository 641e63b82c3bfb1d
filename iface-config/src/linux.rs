//! `ip -6 addr add` / `ip link set ... mtu` / `ip -6 route add|del` /
//! `ip -s link show`, matching the observable command surface bit-exact.

use crate::error::ConfigError;
use crate::exec::run;
use crate::{validate, Configurator, InterfaceStats, Route};

const IDEMPOTENT: &[&str] = &["File exists"];

pub struct LinuxConfigurator;

impl Configurator for LinuxConfigurator {
    fn configure(&self, iface: &str, address: &str, mtu: u32) -> Result<(), ConfigError> {
        validate::validate_ipv6(address)?;
        validate::validate_mtu(mtu)?;

        run(
            "ip",
            &[
                "-6".into(),
                "addr".into(),
                "add".into(),
                format!("{address}/64"),
                "dev".into(),
                iface.into(),
            ],
            IDEMPOTENT,
        )?;

        run(
            "ip",
            &[
                "link".into(),
                "set".into(),
                "dev".into(),
                iface.into(),
                "up".into(),
                "mtu".into(),
                mtu.to_string(),
            ],
            &[],
        )?;

        Ok(())
    }

    fn add_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError> {
        validate::validate_route(&route.cidr)?;
        run(
            "ip",
            &[
                "-6".into(),
                "route".into(),
                "add".into(),
                route.cidr.clone(),
                "dev".into(),
                iface.into(),
            ],
            IDEMPOTENT,
        )?;
        Ok(())
    }

    fn remove_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError> {
        validate::validate_route(&route.cidr)?;
        run(
            "ip",
            &[
                "-6".into(),
                "route".into(),
                "del".into(),
                route.cidr.clone(),
                "dev".into(),
                iface.into(),
            ],
            &["No such process"],
        )?;
        Ok(())
    }

    fn stats(&self, iface: &str) -> Result<InterfaceStats, ConfigError> {
        let output = run("ip", &["-s".into(), "link".into(), "show".into(), iface.into()], &[])?;
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if raw.is_empty() {
            return Err(ConfigError::StatsUnavailable);
        }
        Ok(InterfaceStats { raw })
    }
}
