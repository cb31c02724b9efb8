use chrono::{DateTime, Utc};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::MetersConfig;
use crate::devices::registers::{
    field_name, readable_registers, ACTIVE_POWER, EXPORT_ACTIVE_ENERGY, IMPORT_ACTIVE_ENERGY,
};
use crate::devices::{EnergyMeter, MeterReadings, MeterRole};
use crate::modbus::ModbusClientTrait;
use crate::output::{labelled_line, quick_summary, OutputRecord};

pub const METER_DATA: &str = "meter_data";
pub const POWER_DATA: &str = "power_data";
pub const ENERGY_DATA: &str = "energy_data";

/// Reading of an optional meter for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterValue {
    NotConfigured,
    Failed,
    Value(f64),
}

impl MeterValue {
    fn from_reading(configured: bool, reading: Option<f64>) -> Self {
        match (configured, reading) {
            (false, _) => MeterValue::NotConfigured,
            (true, None) => MeterValue::Failed,
            (true, Some(v)) => MeterValue::Value(v),
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            MeterValue::Value(v) => Some(v),
            _ => None,
        }
    }

    // A meter that is not installed contributes no power
    fn term(self) -> Option<f64> {
        match self {
            MeterValue::NotConfigured => Some(0.0),
            MeterValue::Failed => None,
            MeterValue::Value(v) => Some(v),
        }
    }

    fn configured(self) -> Option<Option<f64>> {
        match self {
            MeterValue::NotConfigured => None,
            other => Some(other.value()),
        }
    }
}

/// Power sharing between grid, production and storage, in W.
/// Positive means the household draws from its own production and storage.
pub fn self_consumption(mains: f64, production: f64, storage: f64) -> f64 {
    let own = -(production + storage);
    if mains < 0.0 {
        own - mains.abs()
    } else {
        own.max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PowerData {
    pub mains: Option<f64>,
    pub production: MeterValue,
    pub storage: MeterValue,
    pub self_consumption: Option<f64>,
}

impl PowerData {
    pub fn new(mains: Option<f64>, production: MeterValue, storage: MeterValue) -> Self {
        let has_local_meter = production != MeterValue::NotConfigured
            || storage != MeterValue::NotConfigured;
        let self_consumption = match (mains, production.term(), storage.term()) {
            (Some(m), Some(p), Some(s)) if has_local_meter => Some(self_consumption(m, p, s)),
            _ => None,
        };
        Self {
            mains,
            production,
            storage,
            self_consumption,
        }
    }

    pub fn to_record(&self, timestamp: DateTime<Utc>) -> OutputRecord {
        let mut record = OutputRecord::new(POWER_DATA, timestamp);
        record.add_optional("mains", self.mains);
        record.add_optional("production", self.production.value());
        record.add_optional("storage", self.storage.value());
        record.add_optional("self_consumption", self.self_consumption);
        record
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyData {
    pub mains_import: Option<f64>,
    pub mains_export: Option<f64>,
    pub production: Option<f64>,
    pub storage_in: Option<f64>,
    pub storage_out: Option<f64>,
}

impl EnergyData {
    pub fn to_record(&self, timestamp: DateTime<Utc>) -> OutputRecord {
        let mut record = OutputRecord::new(ENERGY_DATA, timestamp);
        record.add_optional("mains_import", self.mains_import);
        record.add_optional("mains_export", self.mains_export);
        record.add_optional("production", self.production);
        record.add_optional("storage_in", self.storage_in);
        record.add_optional("storage_out", self.storage_out);
        record
    }
}

/// Result of a full cycle: the non-empty records plus the derived values.
#[derive(Debug, Clone)]
pub struct FullCycle {
    pub timestamp: DateTime<Utc>,
    pub records: Vec<OutputRecord>,
    pub power: PowerData,
    pub energy: EnergyData,
}

impl FullCycle {
    pub fn record(&self, measurement: &str) -> Option<&OutputRecord> {
        self.records.iter().find(|r| r.measurement == measurement)
    }
}

/// Field names come from the register map; only present values are kept.
pub fn meter_data_record(readings: &MeterReadings) -> OutputRecord {
    let mut record = OutputRecord::new(METER_DATA, readings.timestamp).with_tag("line", "home_mains");
    for register in readable_registers() {
        if let Some(value) = readings.get(register.address) {
            record.add_field(&field_name(register.name), value as f64);
        }
    }
    record
}

/// Reads every configured meter in turn. Owns all bus traffic of a cycle.
pub struct Aggregator {
    mains: EnergyMeter,
    production: Option<EnergyMeter>,
    storage: Option<EnergyMeter>,
    settle_delay: Duration,
}

impl Aggregator {
    pub fn new(bus: Arc<dyn ModbusClientTrait>, meters: &MetersConfig) -> Self {
        let optional = |enabled: bool, role: MeterRole| {
            enabled.then(|| EnergyMeter::new(role, bus.clone()))
        };
        let production = optional(meters.production, MeterRole::Production);
        let storage = optional(meters.storage, MeterRole::Storage);

        for meter in [&production, &storage].into_iter().flatten() {
            info!("🔧 Meter configured: {}", meter.role());
        }

        Self {
            mains: EnergyMeter::new(MeterRole::Mains, bus),
            production,
            storage,
            settle_delay: Duration::from_millis(meters.settle_delay_ms),
        }
    }

    /// Everything from mains, power and energy from the other meters.
    pub async fn full_cycle(&self) -> FullCycle {
        debug!("full cycle started");
        let mains = self.mains.read_all().await;
        let mains_power = mains.get(ACTIVE_POWER).map(f64::from);
        info!("{}", labelled_line("Mains Power (W)", mains_power));

        let production = self.read_summary(&self.production).await;
        if let Some(readings) = &production {
            info!("{}", labelled_line("Production Power (W)", power_of(readings)));
        }
        let storage = self.read_summary(&self.storage).await;
        if let Some(readings) = &storage {
            info!("{}", labelled_line("Storage Power (W)", power_of(readings)));
        }

        let power = PowerData::new(
            mains_power,
            MeterValue::from_reading(production.is_some(), production.as_ref().and_then(power_of)),
            MeterValue::from_reading(storage.is_some(), storage.as_ref().and_then(power_of)),
        );
        if power.self_consumption.is_some() {
            info!("{}", labelled_line("Self-consumed Power (W)", power.self_consumption));
        }

        let energy = EnergyData {
            mains_import: mains.get(IMPORT_ACTIVE_ENERGY).map(f64::from),
            mains_export: mains.get(EXPORT_ACTIVE_ENERGY).map(f64::from),
            production: energy_of(&production, EXPORT_ACTIVE_ENERGY),
            storage_in: energy_of(&storage, IMPORT_ACTIVE_ENERGY),
            storage_out: energy_of(&storage, EXPORT_ACTIVE_ENERGY),
        };

        let timestamp = mains.timestamp;
        let records: Vec<OutputRecord> = [
            meter_data_record(&mains),
            power.to_record(timestamp),
            energy.to_record(timestamp),
        ]
        .into_iter()
        .filter(|r| !r.is_empty())
        .collect();

        FullCycle {
            timestamp,
            records,
            power,
            energy,
        }
    }

    /// Active power only, logged as a single line.
    pub async fn quick_cycle(&self) -> PowerData {
        let mains = self.mains.read_power().await.map(f64::from);
        let production = self.read_power(&self.production).await;
        let storage = self.read_power(&self.storage).await;

        info!("{}", quick_summary(mains, production.configured(), storage.configured()));
        PowerData::new(mains, production, storage)
    }

    async fn read_summary(&self, meter: &Option<EnergyMeter>) -> Option<MeterReadings> {
        match meter {
            Some(meter) => {
                sleep(self.settle_delay).await;
                Some(meter.read_summary().await)
            }
            None => None,
        }
    }

    async fn read_power(&self, meter: &Option<EnergyMeter>) -> MeterValue {
        match meter {
            Some(meter) => {
                sleep(self.settle_delay).await;
                MeterValue::from_reading(true, meter.read_power().await.map(f64::from))
            }
            None => MeterValue::NotConfigured,
        }
    }
}

fn power_of(readings: &MeterReadings) -> Option<f64> {
    readings.get(ACTIVE_POWER).map(f64::from)
}

fn energy_of(readings: &Option<MeterReadings>, address: u16) -> Option<f64> {
    readings.as_ref().and_then(|r| r.get(address)).map(f64::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::ModbusError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedBus {
        values: HashMap<(u8, u16), f32>,
        reads: Mutex<Vec<(u8, u16)>>,
    }

    impl ScriptedBus {
        fn with(mut self, device: u8, address: u16, value: f32) -> Self {
            self.values.insert((device, address), value);
            self
        }

        fn with_full_mains(mut self) -> Self {
            for register in readable_registers() {
                self.values.insert((1, register.address), register.address as f32 + 0.5);
            }
            self
        }
    }

    #[async_trait]
    impl ModbusClientTrait for ScriptedBus {
        async fn read_input_registers(
            &self,
            slave_id: u8,
            start_addr: u16,
            _count: u16,
        ) -> Result<Vec<u16>, ModbusError> {
            self.reads.lock().unwrap().push((slave_id, start_addr));
            match self.values.get(&(slave_id, start_addr)) {
                Some(v) => {
                    let bits = v.to_bits();
                    Ok(vec![(bits >> 16) as u16, bits as u16])
                }
                None => Err(ModbusError::Timeout),
            }
        }
    }

    fn meters(production: bool, storage: bool) -> MetersConfig {
        MetersConfig {
            production,
            storage,
            ..MetersConfig::default()
        }
    }

    #[test]
    fn test_self_consumption_while_exporting() {
        assert_eq!(self_consumption(-500.0, -300.0, -100.0), -100.0);
    }

    #[test]
    fn test_self_consumption_while_importing() {
        assert_eq!(self_consumption(200.0, -300.0, 0.0), 300.0);
        assert_eq!(self_consumption(200.0, 50.0, 0.0), 0.0);
    }

    #[test]
    fn test_unconfigured_meter_counts_as_zero() {
        let power = PowerData::new(Some(200.0), MeterValue::Value(-300.0), MeterValue::NotConfigured);
        assert_eq!(power.self_consumption, Some(300.0));

        let record = power.to_record(Utc::now());
        assert_eq!(record.field("storage"), None);
        assert_eq!(record.field("production"), Some(-300.0));
    }

    #[test]
    fn test_failed_meter_suppresses_self_consumption() {
        let power = PowerData::new(Some(200.0), MeterValue::Value(-300.0), MeterValue::Failed);
        assert_eq!(power.self_consumption, None);

        let mains_only = PowerData::new(Some(200.0), MeterValue::NotConfigured, MeterValue::NotConfigured);
        assert_eq!(mains_only.self_consumption, None);

        let no_mains = PowerData::new(None, MeterValue::Value(-300.0), MeterValue::Value(0.0));
        assert_eq!(no_mains.self_consumption, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_with_all_meters() {
        let bus = ScriptedBus::default()
            .with_full_mains()
            .with(1, ACTIVE_POWER, -500.0)
            .with(2, ACTIVE_POWER, -300.0)
            .with(2, IMPORT_ACTIVE_ENERGY, 0.1)
            .with(2, EXPORT_ACTIVE_ENERGY, 812.5)
            .with(3, ACTIVE_POWER, -100.0)
            .with(3, IMPORT_ACTIVE_ENERGY, 40.0)
            .with(3, EXPORT_ACTIVE_ENERGY, 38.5);
        let aggregator = Aggregator::new(Arc::new(bus), &meters(true, true));

        let cycle = aggregator.full_cycle().await;
        assert_eq!(cycle.records.len(), 3);

        let meter_data = cycle.record(METER_DATA).unwrap();
        assert_eq!(meter_data.fields.len(), 20);
        assert_eq!(meter_data.tags.get("line").map(String::as_str), Some("home_mains"));
        assert_eq!(meter_data.field("active_power"), Some(-500.0));
        assert_eq!(meter_data.field("voltage"), Some(0.5));

        let power_data = cycle.record(POWER_DATA).unwrap();
        assert_eq!(power_data.field("self_consumption"), Some(-100.0));
        assert_eq!(power_data.fields.len(), 4);

        assert_eq!(cycle.energy.mains_import, Some(72.5));
        assert_eq!(cycle.energy.mains_export, Some(74.5));
        assert_eq!(cycle.energy.production, Some(812.5));
        assert_eq!(cycle.energy.storage_in, Some(40.0));
        assert_eq!(cycle.energy.storage_out, Some(38.5));
        assert_eq!(cycle.timestamp.timestamp_subsec_nanos(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_registers_are_absent() {
        let bus = ScriptedBus::default()
            .with(1, 0, 230.0)
            .with(1, IMPORT_ACTIVE_ENERGY, 1500.0)
            .with(2, EXPORT_ACTIVE_ENERGY, 800.0);
        let aggregator = Aggregator::new(Arc::new(bus), &meters(true, false));

        let cycle = aggregator.full_cycle().await;
        let meter_data = cycle.record(METER_DATA).unwrap();
        assert_eq!(meter_data.fields.len(), 2);
        assert_eq!(meter_data.field("active_power"), None);

        // No power reading succeeded at all
        assert!(cycle.record(POWER_DATA).is_none());
        assert_eq!(cycle.power.production, MeterValue::Failed);

        let energy = cycle.record(ENERGY_DATA).unwrap();
        assert_eq!(energy.field("mains_import"), Some(1500.0));
        assert_eq!(energy.field("mains_export"), None);
        assert_eq!(energy.field("production"), Some(800.0));
        assert_eq!(energy.fields.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_bus_yields_no_records() {
        let aggregator = Aggregator::new(Arc::new(ScriptedBus::default()), &meters(false, true));
        let cycle = aggregator.full_cycle().await;
        assert!(cycle.records.is_empty());
        assert_eq!(cycle.power.storage, MeterValue::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_cycle_reads_only_power() {
        let bus = Arc::new(
            ScriptedBus::default()
                .with(1, ACTIVE_POWER, 200.0)
                .with(3, ACTIVE_POWER, -50.0),
        );
        let aggregator = Aggregator::new(bus.clone(), &meters(false, true));
        let started = tokio::time::Instant::now();

        let power = aggregator.quick_cycle().await;
        assert_eq!(power.mains, Some(200.0));
        assert_eq!(power.production, MeterValue::NotConfigured);
        assert_eq!(power.storage, MeterValue::Value(-50.0));
        assert_eq!(power.self_consumption, Some(50.0));

        let reads = bus.reads.lock().unwrap().clone();
        assert_eq!(reads, vec![(1, ACTIVE_POWER), (3, ACTIVE_POWER)]);
        // One settle pause before the storage meter
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_millis(100));
    }
}
