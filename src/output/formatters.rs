use serde_json::{Map, Value};

use super::records::OutputRecord;

const ABSENT: &str = "<None>";

/// Fixed width value for the cycle log, `<None>` when the read failed.
pub fn pretty_float(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:9.3}", v),
        None => ABSENT.to_string(),
    }
}

fn watts(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:5.0} W", v),
        None => ABSENT.to_string(),
    }
}

/// `"         Mains Power (W):   231.500"`
pub fn labelled_line(label: &str, value: Option<f64>) -> String {
    format!("{:>24}: {}", label, pretty_float(value))
}

/// One line summary of a quick cycle. Unconfigured meters are left out.
pub fn quick_summary(
    mains: Option<f64>,
    production: Option<Option<f64>>,
    storage: Option<Option<f64>>,
) -> String {
    let mut line = format!("mains: {}", watts(mains));
    if let Some(p) = production {
        line.push_str(&format!(", production: {}", watts(p)));
    }
    if let Some(s) = storage {
        line.push_str(&format!(", storage: {}", watts(s)));
    }
    line
}

/// Compact JSON for live subscribers:
/// `{"measurement":"power_data","time":1714564800,"mains":-500.0}`
pub fn publish_message(record: &OutputRecord) -> String {
    let mut object = Map::new();
    object.insert("measurement".to_string(), Value::from(record.measurement.clone()));
    object.insert("time".to_string(), Value::from(record.timestamp.timestamp()));
    for (name, value) in &record.fields {
        if value.is_finite() {
            object.insert(name.clone(), Value::from(*value));
        }
    }
    Value::Object(object).to_string()
}
