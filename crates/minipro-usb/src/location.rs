//! Physical USB location of a programmer

use std::fmt;
use std::str::FromStr;

use crate::error::UsbError;

/// Bus id plus hub port chain
///
/// A location stays the same when the device resets and re-enumerates,
/// unlike the device address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsbLocation {
    /// Platform bus identifier (e.g. `"3"` on Linux)
    pub bus_id: String,
    /// Port numbers from the root hub to the device
    pub port_chain: Vec<u8>,
}

impl UsbLocation {
    pub fn new(bus_id: impl Into<String>, port_chain: Vec<u8>) -> Self {
        Self {
            bus_id: bus_id.into(),
            port_chain,
        }
    }

    /// Parse a bus id and a dotted port chain such as `1.4.2`
    pub fn parse(bus_id: &str, ports: &str) -> Result<Self, UsbError> {
        if bus_id.is_empty() {
            return Err(UsbError::InvalidLocation("empty bus id".to_string()));
        }
        let port_chain = ports
            .split('.')
            .map(|p| {
                p.trim()
                    .parse::<u8>()
                    .map_err(|_| UsbError::InvalidLocation(format!("bad port number '{}'", p)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(bus_id, port_chain))
    }

    /// Whether `info` sits at this location
    pub fn matches(&self, info: &nusb::DeviceInfo) -> bool {
        info.bus_id() == self.bus_id && info.port_chain() == self.port_chain.as_slice()
    }
}

impl fmt::Display for UsbLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bus {} port ", self.bus_id)?;
        for (i, port) in self.port_chain.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", port)?;
        }
        Ok(())
    }
}

/// `<bus>-<port.port...>`, the sysfs style
impl FromStr for UsbLocation {
    type Err = UsbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bus, ports) = s
            .split_once('-')
            .ok_or_else(|| UsbError::InvalidLocation(format!("expected <bus>-<ports>, got '{}'", s)))?;
        Self::parse(bus, ports)
    }
}
