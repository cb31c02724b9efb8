use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical meter on the shared bus, distinguished by its device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeterRole {
    Mains,
    Production,
    Storage,
}

impl MeterRole {
    pub fn device_id(self) -> u8 {
        match self {
            MeterRole::Mains => 1,
            MeterRole::Production => 2,
            MeterRole::Storage => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MeterRole::Mains => "mains",
            MeterRole::Production => "production",
            MeterRole::Storage => "storage",
        }
    }
}

impl fmt::Display for MeterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (device {})", self.name(), self.device_id())
    }
}
