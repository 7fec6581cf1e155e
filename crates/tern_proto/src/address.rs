//! Remote endpoint addressing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One cryptographic endpoint: a peer account plus one of its devices.
///
/// Always handled by value. Two addresses naming the same (jid, device id)
/// pair ARE the same endpoint, so the type derives structural equality and
/// hashing and is used directly as a map key throughout the stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    /// Bare JID of the peer account (no resource suffix).
    pub jid: String,
    /// Wire-visible device id, unique within the account.
    pub device_id: u32,
}

impl DeviceAddress {
    pub fn new(jid: impl Into<String>, device_id: u32) -> Self {
        Self { jid: jid.into(), device_id }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.jid, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn distinct_instances_are_one_map_key() {
        let mut map = HashMap::new();
        map.insert(DeviceAddress::new("bob@example.com", 1), "a");
        map.insert(DeviceAddress::new(String::from("bob@example.com"), 1), "b");
        assert_eq!(map.len(), 1);
        assert_eq!(map[&DeviceAddress::new("bob@example.com", 1)], "b");
    }

    #[test]
    fn display_is_jid_colon_device() {
        let addr = DeviceAddress::new("bob@example.com", 42);
        assert_eq!(addr.to_string(), "bob@example.com:42");
    }
}
