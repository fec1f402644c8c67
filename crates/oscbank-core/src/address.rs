//! OSC address scheme for channel banks
//!
//! Every channel is addressed as `/<scope>/<index>`. The scope is picked once
//! per run: the model tag when no serial is configured, otherwise the device
//! serial. The same address is used for inbound routing and outbound reports.

use thiserror::Error;

use crate::channel::DeviceSerial;

/// Scope used when no device serial is configured
pub const DEFAULT_MODEL_TAG: &str = "phidget1012";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {0:?} is outside scope /{1}")]
    WrongScope(String, String),
    #[error("address {0:?} has no valid channel index")]
    BadIndex(String),
}

/// Address family in effect for the whole run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressScheme {
    /// `/<model_tag>/<index>`, bound to the first device of the model
    Model(String),
    /// `/<serial>/<index>`, pinned to one device
    Device(DeviceSerial),
}

impl AddressScheme {
    /// Select the address family from the configured serial
    pub fn new(serial: Option<DeviceSerial>, model_tag: &str) -> Self {
        match serial {
            Some(serial) => Self::Device(serial),
            None => Self::Model(strip_whitespace(model_tag)),
        }
    }

    /// First address segment
    pub fn scope(&self) -> String {
        match self {
            Self::Model(tag) => tag.clone(),
            Self::Device(serial) => serial.to_string(),
        }
    }

    pub fn device_serial(&self) -> Option<DeviceSerial> {
        match self {
            Self::Model(_) => None,
            Self::Device(serial) => Some(*serial),
        }
    }

    /// Address of a channel
    pub fn address_for(&self, index: usize) -> String {
        strip_whitespace(&format!("/{}/{}", self.scope(), index))
    }

    /// Recover the channel index from an address produced by this scheme
    pub fn channel_index(&self, address: &str) -> Result<usize, AddressError> {
        let scope = self.scope();
        let rest = address
            .strip_prefix('/')
            .and_then(|a| a.strip_prefix(scope.as_str()))
            .and_then(|a| a.strip_prefix('/'))
            .ok_or_else(|| AddressError::WrongScope(address.to_string(), scope.clone()))?;

        let index: usize = rest
            .parse()
            .map_err(|_| AddressError::BadIndex(address.to_string()))?;

        // Reject aliases such as "/phidget1012/05"
        if self.address_for(index) != address {
            return Err(AddressError::BadIndex(address.to_string()));
        }
        Ok(index)
    }

    /// Every `(index, address)` pair of a bank of `count` channels
    pub fn addresses(&self, count: usize) -> impl Iterator<Item = (usize, String)> + '_ {
        (0..count).map(move |index| (index, self.address_for(index)))
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::DEFAULT_CHANNEL_COUNT;

    #[test]
    fn test_model_scoped_address() {
        let scheme = AddressScheme::new(None, DEFAULT_MODEL_TAG);
        assert_eq!(scheme.address_for(5), "/phidget1012/5");
        assert_eq!(scheme.device_serial(), None);
    }

    #[test]
    fn test_device_scoped_address() {
        let scheme = AddressScheme::new(Some(DeviceSerial(498255)), DEFAULT_MODEL_TAG);
        assert_eq!(scheme.address_for(15), "/498255/15");
        assert_eq!(scheme.device_serial(), Some(DeviceSerial(498255)));
    }

    #[test]
    fn test_whitespace_is_stripped() {
        let scheme = AddressScheme::new(None, " phidget 1012 ");
        assert_eq!(scheme.address_for(2), "/phidget1012/2");
    }

    #[test]
    fn test_round_trip_both_families() {
        let schemes = [
            AddressScheme::new(None, DEFAULT_MODEL_TAG),
            AddressScheme::new(Some(DeviceSerial(498255)), DEFAULT_MODEL_TAG),
        ];
        for scheme in &schemes {
            for (index, address) in scheme.addresses(DEFAULT_CHANNEL_COUNT) {
                assert_eq!(scheme.channel_index(&address), Ok(index));
            }
        }
    }

    #[test]
    fn test_foreign_addresses_rejected() {
        let scheme = AddressScheme::new(None, DEFAULT_MODEL_TAG);
        assert!(matches!(
            scheme.channel_index("/999/5"),
            Err(AddressError::WrongScope(..))
        ));
        assert!(matches!(
            scheme.channel_index("/phidget1012/05"),
            Err(AddressError::BadIndex(_))
        ));
        assert!(matches!(
            scheme.channel_index("/phidget1012/5/"),
            Err(AddressError::BadIndex(_))
        ));
        assert!(scheme.channel_index("/phidget10125").is_err());
    }

    #[test]
    fn test_addresses_are_distinct() {
        let scheme = AddressScheme::new(None, DEFAULT_MODEL_TAG);
        let addresses: std::collections::HashSet<String> =
            scheme.addresses(DEFAULT_CHANNEL_COUNT).map(|(_, a)| a).collect();
        assert_eq!(addresses.len(), DEFAULT_CHANNEL_COUNT);
    }
}
