//! Scalar encode/decode through the instruction-word stream.
//!
//! All multi-byte payload fields travel big-endian on the wire; floats as
//! their IEEE-754 bit pattern. The CRC is the one little-endian exception
//! and is handled by the buffer itself.

use crate::error::BusError;

use super::ModbusBuffer;

/// Scalars that can be written to and read from a [`ModbusBuffer`] as a
/// run of payload bytes.
pub trait FrameScalar: Sized {
    fn write_to(self, buffer: &mut ModbusBuffer);
    fn read_from(buffer: &mut ModbusBuffer) -> Result<Self, BusError>;
}

macro_rules! impl_frame_scalar {
    ($($ty:ty),+ $(,)?) => {$(
        impl FrameScalar for $ty {
            fn write_to(self, buffer: &mut ModbusBuffer) {
                buffer.write_bytes(&self.to_be_bytes());
            }

            fn read_from(buffer: &mut ModbusBuffer) -> Result<Self, BusError> {
                Ok(<$ty>::from_be_bytes(buffer.read_array()?))
            }
        }
    )+};
}

impl_frame_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32);

#[cfg(test)]
mod tests {
    use crate::modbus::{FrameDialect, ModbusBuffer};

    #[test]
    fn u32_is_big_endian() {
        let mut buffer = ModbusBuffer::new(FrameDialect::ILC);
        buffer.write(0x0102_0304_u32);
        buffer.reset();
        assert_eq!(buffer.read::<u8>().unwrap(), 1);
        assert_eq!(buffer.read::<u8>().unwrap(), 2);
        assert_eq!(buffer.read::<u8>().unwrap(), 3);
        assert_eq!(buffer.read::<u8>().unwrap(), 4);
    }

    #[test]
    fn signed_roundtrip() {
        let mut buffer = ModbusBuffer::new(FrameDialect::ILC);
        buffer.write(-12345_i32);
        buffer.write(-2_i8);
        buffer.write(i64::MIN + 1);
        buffer.reset();
        assert_eq!(buffer.read::<i32>().unwrap(), -12345);
        assert_eq!(buffer.read::<i8>().unwrap(), -2);
        assert_eq!(buffer.read::<i64>().unwrap(), i64::MIN + 1);
    }

    #[test]
    fn float_bit_pattern_roundtrip() {
        for v in [3.141592_f32, -4.56, 0.0, f32::MIN_POSITIVE, 1e30] {
            let mut buffer = ModbusBuffer::new(FrameDialect::RAW);
            buffer.write(v);
            buffer.reset();
            assert_eq!(buffer.read::<f32>().unwrap().to_bits(), v.to_bits());
        }
    }
}
