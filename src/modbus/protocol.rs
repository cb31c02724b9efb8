use bytes::{BufMut, BytesMut};

use super::crc::{crc16_modbus, frame_crc_is_valid};
use crate::utils::error::ModbusError;

pub const READ_INPUT_REGISTERS: u8 = 0x04;
const EXCEPTION_FLAG: u8 = 0x80;

/// Largest register count a single RTU read may request.
pub const MAX_READ_COUNT: u16 = 125;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModbusRequest {
    ReadInputRegisters {
        slave: u8,
        start_register: u16,
        quantity: u16,
    },
}

impl ModbusRequest {
    pub fn slave(&self) -> u8 {
        match self {
            ModbusRequest::ReadInputRegisters { slave, .. } => *slave,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            ModbusRequest::ReadInputRegisters { .. } => READ_INPUT_REGISTERS,
        }
    }

    /// Complete RTU frame including the CRC.
    pub fn encode(&self) -> BytesMut {
        let mut frame = BytesMut::with_capacity(8);
        match self {
            ModbusRequest::ReadInputRegisters {
                slave,
                start_register,
                quantity,
            } => {
                frame.put_u8(*slave);
                frame.put_u8(READ_INPUT_REGISTERS);
                frame.put_u16(*start_register);
                frame.put_u16(*quantity);
            }
        }
        let crc = crc16_modbus(&frame);
        frame.put_u16_le(crc);
        frame
    }

    /// Length of a successful response frame.
    pub fn expected_response_len(&self) -> usize {
        match self {
            ModbusRequest::ReadInputRegisters { quantity, .. } => 5 + (*quantity as usize) * 2,
        }
    }
}

/// Header of a response: tells how many bytes are still to be read once the
/// first three bytes (slave, function, byte count or exception code) arrived.
pub fn remaining_len(header: &[u8; 3]) -> usize {
    if header[1] & EXCEPTION_FLAG != 0 {
        2
    } else {
        header[2] as usize + 2
    }
}

/// Validate a complete response frame and extract its register words.
pub fn parse_read_response(request: &ModbusRequest, frame: &[u8]) -> Result<Vec<u16>, ModbusError> {
    if frame.len() < 5 {
        return Err(ModbusError::InvalidResponse(format!(
            "frame too short: {} bytes",
            frame.len()
        )));
    }
    if !frame_crc_is_valid(frame) {
        return Err(ModbusError::CrcError);
    }
    if frame[0] != request.slave() {
        return Err(ModbusError::InvalidResponse(format!(
            "answer from device {} while {} was addressed",
            frame[0],
            request.slave()
        )));
    }
    if frame[1] == request.function_code() | EXCEPTION_FLAG {
        return Err(ModbusError::Exception {
            slave: frame[0],
            code: frame[2],
        });
    }
    if frame[1] != request.function_code() {
        return Err(ModbusError::InvalidResponse(format!(
            "unexpected function code 0x{:02x}",
            frame[1]
        )));
    }

    let byte_count = frame[2] as usize;
    let ModbusRequest::ReadInputRegisters { quantity, .. } = request;
    if byte_count != (*quantity as usize) * 2 || frame.len() != byte_count + 5 {
        return Err(ModbusError::InvalidResponse(format!(
            "byte count {} does not match {} requested registers",
            byte_count, quantity
        )));
    }

    Ok(frame[3..3 + byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ModbusRequest {
        ModbusRequest::ReadInputRegisters {
            slave: 1,
            start_register: 0,
            quantity: 2,
        }
    }

    fn with_crc(data: &[u8]) -> Vec<u8> {
        let mut frame = data.to_vec();
        frame.extend_from_slice(&crc16_modbus(data).to_le_bytes());
        frame
    }

    #[test]
    fn test_encode_read_input_registers() {
        let frame = request().encode();
        assert_eq!(&frame[..], &[0x01, 0x04, 0x00, 0x00, 0x00, 0x02, 0x71, 0xCB]);
        assert_eq!(request().expected_response_len(), 9);
    }

    #[test]
    fn test_parse_valid_response() {
        let frame = with_crc(&[0x01, 0x04, 0x04, 0x43, 0x66, 0x80, 0x00]);
        let words = parse_read_response(&request(), &frame).unwrap();
        assert_eq!(words, vec![0x4366, 0x8000]);
    }

    #[test]
    fn test_parse_exception_response() {
        let frame = with_crc(&[0x01, 0x84, 0x02]);
        assert_eq!(remaining_len(&[0x01, 0x84, 0x02]), 2);
        match parse_read_response(&request(), &frame) {
            Err(ModbusError::Exception { slave: 1, code: 2 }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_slave_and_bad_crc() {
        let frame = with_crc(&[0x02, 0x04, 0x04, 0x43, 0x66, 0x80, 0x00]);
        assert!(matches!(
            parse_read_response(&request(), &frame),
            Err(ModbusError::InvalidResponse(_))
        ));

        let mut corrupted = with_crc(&[0x01, 0x04, 0x04, 0x43, 0x66, 0x80, 0x00]);
        corrupted[4] ^= 0xFF;
        assert!(matches!(
            parse_read_response(&request(), &corrupted),
            Err(ModbusError::CrcError)
        ));
    }

    #[test]
    fn test_parse_rejects_short_payload() {
        let frame = with_crc(&[0x01, 0x04, 0x02, 0x43, 0x66]);
        assert!(matches!(
            parse_read_response(&request(), &frame),
            Err(ModbusError::InvalidResponse(_))
        ));
    }
}
