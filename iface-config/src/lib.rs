//! Declarative address/MTU/route configuration for a created virtual
//! interface, expressed entirely as OS-native administrative commands so
//! the observable command surface matches bit-exact across platforms.

mod error;
mod exec;
mod validate;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod darwin;
#[cfg(windows)]
mod windows;

pub use error::ConfigError;
pub use validate::{validate_ipv6, validate_mtu, validate_route, MAX_MTU, MIN_MTU};

/// An IPv6 route destination, e.g. `fd00::1/128`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub cidr: String,
}

impl Route {
    pub fn new(cidr: impl Into<String>) -> Self {
        Self { cidr: cidr.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceStats {
    /// Raw stdout of the platform's stats command; exact field layout is
    /// platform-specific and intentionally left unparsed beyond presence.
    pub raw: String,
}

/// Configures address, MTU, and routes on an already-open interface.
pub trait Configurator {
    fn configure(&self, iface: &str, address: &str, mtu: u32) -> Result<(), ConfigError>;
    fn add_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError>;
    fn remove_route(&self, iface: &str, route: &Route) -> Result<(), ConfigError>;
    fn stats(&self, iface: &str) -> Result<InterfaceStats, ConfigError>;
}

/// Returns the `Configurator` for the host OS this binary was compiled for.
pub fn platform_configurator() -> Box<dyn Configurator> {
    #[cfg(target_os = "linux")]
    return Box::new(linux::LinuxConfigurator);

    #[cfg(target_os = "macos")]
    return Box::new(darwin::DarwinConfigurator);

    #[cfg(windows)]
    return Box::new(windows::WindowsConfigurator);

    #[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
    return Box::new(UnsupportedConfigurator);
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
struct UnsupportedConfigurator;

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
impl Configurator for UnsupportedConfigurator {
    fn configure(&self, _iface: &str, _address: &str, _mtu: u32) -> Result<(), ConfigError> {
        Err(ConfigError::ToolingMissing("no configurator for this OS".into()))
    }

    fn add_route(&self, _iface: &str, _route: &Route) -> Result<(), ConfigError> {
        Err(ConfigError::ToolingMissing("no configurator for this OS".into()))
    }

    fn remove_route(&self, _iface: &str, _route: &Route) -> Result<(), ConfigError> {
        Err(ConfigError::ToolingMissing("no configurator for this OS".into()))
    }

    fn stats(&self, _iface: &str) -> Result<InterfaceStats, ConfigError> {
        Err(ConfigError::ToolingMissing("no configurator for this OS".into()))
    }
}
