//! Input register map of the Eastron SDM230 single phase meter.
//!
//! Every measurement occupies two consecutive input registers holding a
//! big-endian IEEE-754 single precision float.

/// Active power in W, signed (negative means export)
pub const ACTIVE_POWER: u16 = 12;
/// Import active energy in kWh
pub const IMPORT_ACTIVE_ENERGY: u16 = 72;
/// Export active energy in kWh
pub const EXPORT_ACTIVE_ENERGY: u16 = 74;

/// Words per measurement
pub const REGISTER_WIDTH: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub address: u16,
    pub name: &'static str,
}

pub const REGISTERS: &[Register] = &[
    Register { address: 0, name: "Voltage (V)" },
    Register { address: 6, name: "Current (A)" },
    Register { address: 12, name: "Active Power (W)" },
    Register { address: 18, name: "Apparent Power (VA)" },
    Register { address: 24, name: "Reactive Power (VAr)" },
    Register { address: 30, name: "Power Factor (cos\u{3b8})" },
    Register { address: 36, name: "Phase Angle (degrees)" },
    Register { address: 70, name: "Frequency (Hz)" },
    Register { address: 72, name: "Import Active Energy (kWh)" },
    Register { address: 74, name: "Export Active Energy (kWh)" },
    Register { address: 76, name: "Import Reactive Energy (kVARh)" },
    Register { address: 78, name: "Export Reactive Energy (kVARh)" },
    Register { address: 84, name: "Total system power demand (W)" },
    Register { address: 86, name: "Maximum total system power demand (W)" },
    Register { address: 88, name: "Current system positive power demand (W)" },
    Register { address: 90, name: "Maximum system positive power demand (W)" },
    Register { address: 92, name: "Current system reverse power demand (W)" },
    Register { address: 94, name: "Maximum system reverse power demand (W)" },
    Register { address: 258, name: "Current demand (A)" },
    Register { address: 264, name: "Maximum current demand (A)" },
    Register { address: 342, name: "Total Active Energy (kWh)" },
    Register { address: 344, name: "Total Reactive Energy (kVARh)" },
    Register { address: 384, name: "Current resettable total active energy (kWh)" },
    Register { address: 386, name: "Current resettable total reactive energy (kVARh)" },
];

// Not implemented by the deployed firmware; reading them only times out.
pub const BLACKLIST: &[u16] = &[342, 344, 384, 386];

pub fn is_blacklisted(address: u16) -> bool {
    BLACKLIST.contains(&address)
}

/// Registers a full cycle reads from the mains meter, in address order.
pub fn readable_registers() -> impl Iterator<Item = &'static Register> {
    REGISTERS.iter().filter(|r| !is_blacklisted(r.address))
}

pub fn lookup(address: u16) -> Option<&'static Register> {
    REGISTERS.iter().find(|r| r.address == address)
}

/// Display name without its unit, lower-cased with underscores:
/// `"Import Active Energy (kWh)"` becomes `import_active_energy`.
pub fn field_name(display_name: &str) -> String {
    let stem = match display_name.find('(') {
        Some(idx) => &display_name[..idx],
        None => display_name,
    };
    stem.trim().to_lowercase().replace(' ', "_")
}
