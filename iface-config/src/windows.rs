//! PowerShell adapter-management equivalents: `New-NetIPAddress`,
//! `Set-NetIPInterface`, `New-NetRoute`/`Remove-NetRoute`,
//! `Get-NetAdapterStatistics`.

use crate::error::ConfigError;
use crate::exec::run_with;
use crate::{validate, Configurator, InterfaceStats, Route};
use std::os::windows::process::CommandExt;

// Hides the console window PowerShell would otherwise flash open.
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const IDEMPOTENT: &[&str] = &["already exists", "ObjectAlreadyExists"];

pub struct WindowsConfigurator;

fn run_powershell(script: &str, idempotent: &[&str]) -> Result<std::process::Output, ConfigError> {
    run_with(
        "powershell",
        &["-NoProfile".into(), "-Command".into(), script.into()],
        idempotent,
        |command| {
            command.creation_flags(CREATE_NO_WINDOW);
        },
    )
}

impl Configurator for WindowsConfigurator {
    fn configure(&self, iface: &str, address: &str, mtu: u32) -> Result<(), ConfigError> {
        validate::validate_ipv6(address)?;
        validate::validate_mtu(mtu)?;

        run_powershell(
            &format!(
                "New-NetIPAddress -InterfaceAlias \"{iface}\" -IPAddress \"{address}\" -PrefixLength 64"
            ),
            IDEMPOTENT,
        )?;

        run_powershell(
            &format!("Set-NetIPInterface -InterfaceAlias \"{iface}\" -NlMtuBytes {mtu}"),
            &[],
        )?;

        Ok(())
    }

    fn add_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError> {
        validate::validate_route(&route.cidr)?;
        run_powershell(
            &format!(
                "New-NetRoute -InterfaceAlias \"{iface}\" -DestinationPrefix \"{}\"",
                route.cidr
            ),
            IDEMPOTENT,
        )?;
        Ok(())
    }

    fn remove_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError> {
        validate::validate_route(&route.cidr)?;
        run_powershell(
            &format!(
                "Remove-NetRoute -InterfaceAlias \"{iface}\" -DestinationPrefix \"{}\" -Confirm:$false",
                route.cidr
            ),
            &["No MSFT_NetRoute objects found", "NoMatchingRoute"],
        )?;
        Ok(())
    }

    fn stats(&self, iface: &str) -> Result<InterfaceStats, ConfigError> {
        let output = run_powershell(
            &format!("Get-NetAdapterStatistics -Name \"{iface}\" | Format-List"),
            &[],
        )?;
        let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if raw.is_empty() {
            return Err(ConfigError::StatsUnavailable);
        }
        Ok(InterfaceStats { raw })
    }
}
