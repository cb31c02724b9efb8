use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One datapoint bound for the time-series store.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub measurement: String,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
}

impl OutputRecord {
    pub fn new(measurement: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.to_string(),
            timestamp,
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn add_field(&mut self, name: &str, value: f64) {
        self.fields.insert(name.to_string(), value);
    }

    /// Insert the field only when a value is present.
    pub fn add_optional(&mut self, name: &str, value: Option<f64>) {
        if let Some(v) = value {
            self.add_field(name, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

#[cfg(feature = "influxdb")]
pub use line_protocol::batch_to_line_protocol;

#[cfg(feature = "influxdb")]
mod line_protocol {
    use super::OutputRecord;
    use crate::utils::error::SinkError;
    use influxdb::{Query, Timestamp, WriteQuery};

    impl OutputRecord {
        /// Write query with second precision. Non-finite values are left
        /// out; `None` if nothing writable remains.
        pub fn to_write_query(&self) -> Option<WriteQuery> {
            let seconds = u128::try_from(self.timestamp.timestamp()).ok()?;
            let mut fields = self.fields.iter().filter(|(_, v)| v.is_finite()).peekable();
            fields.peek()?;

            let mut query = WriteQuery::new(Timestamp::Seconds(seconds), self.measurement.as_str());
            for (key, value) in &self.tags {
                query = query.add_tag(key.as_str(), value.as_str());
            }
            for (name, value) in fields {
                query = query.add_field(name.as_str(), *value);
            }
            Some(query)
        }
    }

    /// Newline separated body for one write request.
    pub fn batch_to_line_protocol(records: &[OutputRecord]) -> Result<String, SinkError> {
        let mut lines = Vec::with_capacity(records.len());
        for query in records.iter().filter_map(OutputRecord::to_write_query) {
            let line = query.build().map_err(|e| SinkError::Encoding(e.to_string()))?;
            lines.push(line.get());
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_optional_fields() {
        let mut record = OutputRecord::new("power_data", ts());
        assert!(record.is_empty());
        record.add_optional("mains", Some(120.0));
        record.add_optional("production", None);

        assert!(!record.is_empty());
        assert_eq!(record.field("mains"), Some(120.0));
        assert_eq!(record.field("production"), None);
    }

    #[cfg(feature = "influxdb")]
    #[test]
    fn test_line_protocol() {
        let mut record = OutputRecord::new("meter_data", ts()).with_tag("line", "home_mains");
        record.add_field("voltage", 231.5);
        record.add_field("active_power", -500.0);

        assert_eq!(
            batch_to_line_protocol(&[record]).unwrap(),
            "meter_data,line=home_mains active_power=-500,voltage=231.5 1714564800"
        );
    }

    #[cfg(feature = "influxdb")]
    #[test]
    fn test_non_finite_values_are_not_written() {
        let mut power = OutputRecord::new("power_data", ts());
        power.add_field("mains", 120.0);
        power.add_field("storage", f64::NAN);
        let mut energy = OutputRecord::new("energy_data", ts());
        energy.add_field("mains_import", f64::INFINITY);

        assert!(energy.to_write_query().is_none());
        assert_eq!(
            batch_to_line_protocol(&[power, energy]).unwrap(),
            "power_data mains=120 1714564800"
        );
    }

    #[cfg(feature = "influxdb")]
    #[test]
    fn test_batch_is_one_line_per_record() {
        let mut first = OutputRecord::new("power_data", ts());
        first.add_field("mains", 1.0);
        let mut second = OutputRecord::new("energy_data", ts());
        second.add_field("mains_import", 2.0);

        let body = batch_to_line_protocol(&[first, second]).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("energy_data "));
        assert_eq!(batch_to_line_protocol(&[]).unwrap(), "");
    }
}
