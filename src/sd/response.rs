use bitfield::Bit;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct R1(pub u8);

impl Default for R1 {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum R1Status {
    InIdleState = 0,
    EraseReset,
    IllegalCommand,
    CommandCRCError,
    EraseSequenceError,
    AddressError,
    ParameterError,
}

impl R1 {
    /// What the bus reads back when no card drives MISO.
    pub const NONE: Self = Self(0xFF);
    pub const READY: Self = Self(0x00);
    pub const IDLE: Self = Self(0x01);

    pub fn valid(self) -> bool {
        !self.0.bit(7)
    }

    pub fn ready(self) -> bool {
        self == Self::READY
    }

    pub fn idle(self) -> bool {
        self == Self::IDLE
    }

    pub fn has(self, status: R1Status) -> bool {
        self.0.bit(status as usize)
    }

    pub fn error(self) -> Option<R1Status> {
        if !self.valid() {
            return None;
        }
        let value = (self.0 >> 2) & 0b11111;
        let error_bit = value ^ ((value.wrapping_sub(1)) & value);
        let error = match error_bit {
            0b00001 => R1Status::IllegalCommand,
            0b00010 => R1Status::CommandCRCError,
            0b00100 => R1Status::EraseSequenceError,
            0b01000 => R1Status::AddressError,
            0b10000 => R1Status::ParameterError,
            _ => return None,
        };
        Some(error)
    }
}

/// OCR payload of CMD58.
#[derive(Copy, Clone, Default, Debug)]
#[repr(C)]
pub struct R3(pub u32);

impl R3 {
    pub fn card_capacity_status(self) -> bool {
        self.0.bit(30)
    }
}

/// SEND_IF_COND echo.
#[derive(Copy, Clone, Default, Debug)]
pub struct R7(pub u32);

impl R7 {
    pub fn voltage_accepted(self) -> bool {
        (self.0 >> 8) & 0xF == 0b0001 // 2.7-3.6V
    }

    pub fn echo_back_check_pattern(self) -> u8 {
        self.0 as u8
    }
}

#[cfg(test)]
mod test {
    use super::{R1Status, R1, R3, R7};
    use hex_literal::hex;

    #[test]
    fn test_r1() {
        assert!(R1(0x01).idle());
        assert!(R1(0x00).ready());
        assert!(!R1::NONE.valid());
        assert_eq!(R1(0x05).error(), Some(R1Status::IllegalCommand));
        assert!(R1(0x05).has(R1Status::InIdleState));
        assert_eq!(R1(0x40).error(), Some(R1Status::ParameterError));
        assert_eq!(R1(0x01).error(), None);
        assert_eq!(R1::NONE.error(), None);
    }

    #[test]
    fn test_ocr_capacity_status() {
        assert!(R3(u32::from_be_bytes(hex!("C0 FF 80 00"))).card_capacity_status());
        assert!(!R3(u32::from_be_bytes(hex!("80 FF 80 00"))).card_capacity_status());
    }

    #[test]
    fn test_r7() {
        let r7 = R7(u32::from_be_bytes(hex!("00 00 01 AA")));
        assert!(r7.voltage_accepted());
        assert_eq!(r7.echo_back_check_pattern(), 0xAA);
        assert!(!R7(u32::from_be_bytes(hex!("00 00 02 AA"))).voltage_accepted());
    }
}
