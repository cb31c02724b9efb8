use chrono::{DateTime, SubsecRound, Utc};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::registers::{
    lookup, readable_registers, ACTIVE_POWER, EXPORT_ACTIVE_ENERGY, IMPORT_ACTIVE_ENERGY,
    REGISTER_WIDTH,
};
use super::role::MeterRole;
use crate::modbus::client::ModbusClientTrait;

/// Two big-endian words into one IEEE-754 single precision value.
pub fn words_to_f32(high: u16, low: u16) -> f32 {
    f32::from_bits(((high as u32) << 16) | low as u32)
}

/// Values of one meter for one cycle. `None` marks a failed read.
#[derive(Debug, Clone)]
pub struct MeterReadings {
    pub role: MeterRole,
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<u16, Option<f32>>,
}

impl MeterReadings {
    pub fn new(role: MeterRole) -> Self {
        Self {
            role,
            timestamp: Utc::now().trunc_subsecs(0),
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, address: u16) -> Option<f32> {
        self.values.get(&address).copied().flatten()
    }

    pub fn failed_count(&self) -> usize {
        self.values.values().filter(|v| v.is_none()).count()
    }
}

/// One SDM meter addressed through the shared bus session.
#[derive(Clone)]
pub struct EnergyMeter {
    role: MeterRole,
    bus: Arc<dyn ModbusClientTrait>,
}

impl EnergyMeter {
    pub fn new(role: MeterRole, bus: Arc<dyn ModbusClientTrait>) -> Self {
        Self { role, bus }
    }

    pub fn role(&self) -> MeterRole {
        self.role
    }

    /// Read one measurement. Any bus failure is logged and yields `None`.
    pub async fn read_register(&self, address: u16) -> Option<f32> {
        match self
            .bus
            .read_input_registers(self.role.device_id(), address, REGISTER_WIDTH)
            .await
        {
            Ok(words) if words.len() >= 2 => {
                let value = words_to_f32(words[0], words[1]);
                debug!("{} register {}: {}", self.role, address, value);
                Some(value)
            }
            Ok(words) => {
                warn!(
                    "{}: register {} returned {} words instead of {}",
                    self.role,
                    register_label(address),
                    words.len(),
                    REGISTER_WIDTH
                );
                None
            }
            Err(e) => {
                warn!("{}: reading {} failed: {}", self.role, register_label(address), e);
                None
            }
        }
    }

    /// Read the given registers one after another.
    pub async fn read_registers(&self, addresses: &[u16]) -> MeterReadings {
        let mut readings = MeterReadings::new(self.role);
        for &address in addresses {
            let value = self.read_register(address).await;
            readings.values.insert(address, value);
        }
        if readings.failed_count() > 0 {
            warn!(
                "{}: {} of {} registers unavailable this cycle",
                self.role,
                readings.failed_count(),
                addresses.len()
            );
        }
        readings
    }

    /// Every register the deployed firmware implements.
    pub async fn read_all(&self) -> MeterReadings {
        let addresses: Vec<u16> = readable_registers().map(|r| r.address).collect();
        self.read_registers(&addresses).await
    }

    /// Active power plus import and export energy.
    pub async fn read_summary(&self) -> MeterReadings {
        self.read_registers(&[ACTIVE_POWER, IMPORT_ACTIVE_ENERGY, EXPORT_ACTIVE_ENERGY])
            .await
    }

    pub async fn read_power(&self) -> Option<f32> {
        self.read_register(ACTIVE_POWER).await
    }
}

fn register_label(address: u16) -> String {
    match lookup(address) {
        Some(register) => format!("{} [{}]", register.name, address),
        None => format!("register {}", address),
    }
}
