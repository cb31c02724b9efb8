use async_trait::async_trait;
use log::{debug, error, info, warn};
use serialport::{ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use super::protocol::{parse_read_response, remaining_len, ModbusRequest, MAX_READ_COUNT};
use crate::config::settings::{ParityConfig, SerialConfig};
use crate::utils::error::ModbusError;

#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    /// Read `count` consecutive input registers (function 0x04).
    async fn read_input_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError>;

    /// Release the underlying connection.
    fn close(&self) {}
}

/// Modbus RTU master over a serial line. All devices on the bus share the
/// single port; requests are serialised by the port lock.
pub struct ModbusClient {
    port: Mutex<Option<Box<dyn SerialPort>>>,
    port_name: String,
    retries: u32,
}

impl ModbusClient {
    pub fn new(serial: &SerialConfig) -> Result<Self, ModbusError> {
        info!("🔌 Connecting to Modbus RTU port: {}", serial.port);
        info!(
            "Configuration: {} baud, 8 data bits, parity {:?}, {} stop bit(s), timeout {} ms, {} retries",
            serial.baud_rate, serial.parity, serial.stop_bits, serial.timeout_ms, serial.retries
        );

        let parity = match serial.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let stop_bits = if serial.stop_bits == 2 {
            serialport::StopBits::Two
        } else {
            serialport::StopBits::One
        };

        let port = serialport::new(&serial.port, serial.baud_rate)
            .timeout(Duration::from_millis(serial.timeout_ms))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(stop_bits)
            .parity(parity)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", serial.port, e);
                ModbusError::ConnectionError(format!("Failed to open port {}: {}", serial.port, e))
            })?;

        info!("✅ Modbus RTU connection established on {}", serial.port);
        Ok(Self {
            port: Mutex::new(Some(port)),
            port_name: serial.port.clone(),
            retries: serial.retries,
        })
    }

    /// Release the serial port. Later requests fail with `ConnectionError`.
    pub fn close(&self) {
        match self.port.lock() {
            Ok(mut port) => {
                if port.take().is_some() {
                    info!("Closed Modbus RTU port {}", self.port_name);
                }
            }
            Err(_) => error!("Cannot close {}: port lock poisoned", self.port_name),
        }
    }

    fn transact(&self, request: &ModbusRequest) -> Result<Vec<u16>, ModbusError> {
        let mut guard = self.port.lock().map_err(|_| ModbusError::LockError)?;
        let port = guard
            .as_mut()
            .ok_or_else(|| ModbusError::ConnectionError(format!("{} is closed", self.port_name)))?;

        let frame = request.encode();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::exchange(port.as_mut(), request, &frame) {
                Ok(words) => return Ok(words),
                Err(e) if e.is_retryable() && attempt <= self.retries => {
                    debug!(
                        "request to device {} failed (attempt {}/{}): {}",
                        request.slave(),
                        attempt,
                        self.retries + 1,
                        e
                    );
                    // Drop any late bytes of the failed answer before resending
                    if let Err(clear_err) = port.clear(ClearBuffer::Input) {
                        warn!("Cannot flush input buffer of {}: {}", self.port_name, clear_err);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn exchange(
        port: &mut dyn SerialPort,
        request: &ModbusRequest,
        frame: &[u8],
    ) -> Result<Vec<u16>, ModbusError> {
        debug!("TX [{}]", hex::encode(frame));
        port.write_all(frame)
            .map_err(|e| ModbusError::CommunicationError(format!("Write failed: {}", e)))?;
        port.flush()
            .map_err(|e| ModbusError::CommunicationError(format!("Flush failed: {}", e)))?;

        let mut header = [0u8; 3];
        port.read_exact(&mut header)?;

        let mut response = Vec::with_capacity(request.expected_response_len());
        response.extend_from_slice(&header);
        let mut rest = vec![0u8; remaining_len(&header)];
        port.read_exact(&mut rest)?;
        response.extend_from_slice(&rest);
        debug!("RX [{}]", hex::encode(&response));

        parse_read_response(request, &response)
    }
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn read_input_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, ModbusError> {
        if count == 0 || count > MAX_READ_COUNT {
            return Err(ModbusError::InvalidResponse(format!(
                "cannot read {} registers in one request",
                count
            )));
        }

        let request = ModbusRequest::ReadInputRegisters {
            slave: slave_id,
            start_register: start_addr,
            quantity: count,
        };
        // Serial I/O blocks; keep it off the async worker threads
        tokio::task::block_in_place(|| self.transact(&request))
    }

    fn close(&self) {
        ModbusClient::close(self)
    }
}
