pub mod meter;
pub mod registers;
pub mod role;

pub use meter::{words_to_f32, EnergyMeter, MeterReadings};
pub use registers::{field_name, Register, REGISTERS};
pub use role::MeterRole;
