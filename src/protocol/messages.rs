//! Shock command wire format
//!
//! Every command is a fixed 9-byte write:
//!
//! ```text
//! 35 11 0c 01 ss ss 11 ff 32
//!        |     |____|    |
//!        |     strength  frequency
//!        channel (1 = A, 2 = B)
//! ```
//!
//! Strength is big-endian and keeps only its low 16 bits; frequency keeps its
//! low 8 bits. Larger values wrap rather than widen the frame.

use thiserror::Error;

/// Encoded command length in bytes
pub const COMMAND_LEN: usize = 9;

const HEADER: [u8; 2] = [0x35, 0x11];
const CHANNEL_TRAILER: u8 = 0x01;
const FREQ_MARKER: u8 = 0x11;
const TERMINATOR: u8 = 0x32;

/// Command decode errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Expected 9 bytes, got {0}")]
    Length(usize),

    #[error("Unexpected byte 0x{found:02X} at offset {offset}")]
    Marker { offset: usize, found: u8 },

    #[error("Unknown channel nibble 0x{0:02X}")]
    UnknownChannel(u8),

    #[error("Invalid hex: {0}")]
    Hex(String),
}

/// Stimulation output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Channel byte in the wire frame
    pub fn nibble(self) -> u8 {
        match self {
            Channel::A => 0x01,
            Channel::B => 0x02,
        }
    }

    pub fn from_nibble(nibble: u8) -> Result<Self, CommandError> {
        match nibble {
            0x01 => Ok(Channel::A),
            0x02 => Ok(Channel::B),
            other => Err(CommandError::UnknownChannel(other)),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::A => f.write_str("A"),
            Channel::B => f.write_str("B"),
        }
    }
}

/// One stimulation pulse request for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShockCommand {
    pub channel: Channel,
    pub strength: u32,
    pub frequency: u32,
}

impl ShockCommand {
    pub fn new(channel: Channel, strength: u32, frequency: u32) -> Self {
        Self {
            channel,
            strength,
            frequency,
        }
    }

    /// Zero-strength, zero-frequency command sent for degenerate input
    pub fn silence(channel: Channel) -> Self {
        Self::new(channel, 0, 0)
    }

    /// Whether encoding will truncate strength or frequency
    pub fn overflows(&self) -> bool {
        self.strength > u16::MAX as u32 || self.frequency > u8::MAX as u32
    }

    /// Encode into the 9-byte wire frame
    pub fn encode(&self) -> [u8; COMMAND_LEN] {
        let strength = (self.strength as u16).to_be_bytes();
        [
            HEADER[0],
            HEADER[1],
            self.channel.nibble(),
            CHANNEL_TRAILER,
            strength[0],
            strength[1],
            FREQ_MARKER,
            self.frequency as u8,
            TERMINATOR,
        ]
    }

    /// Encoded frame as uppercase hex text, e.g. `35110101000C114B32`
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.encode())
    }

    /// Decode a wire frame
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandError> {
        if bytes.len() != COMMAND_LEN {
            return Err(CommandError::Length(bytes.len()));
        }

        let expect = |offset: usize, wanted: u8| {
            if bytes[offset] == wanted {
                Ok(())
            } else {
                Err(CommandError::Marker {
                    offset,
                    found: bytes[offset],
                })
            }
        };
        expect(0, HEADER[0])?;
        expect(1, HEADER[1])?;
        expect(3, CHANNEL_TRAILER)?;
        expect(6, FREQ_MARKER)?;
        expect(8, TERMINATOR)?;

        Ok(Self {
            channel: Channel::from_nibble(bytes[2])?,
            strength: u16::from_be_bytes([bytes[4], bytes[5]]) as u32,
            frequency: bytes[7] as u32,
        })
    }

    /// Decode hex text produced by [`ShockCommand::to_hex`]
    pub fn from_hex(text: &str) -> Result<Self, CommandError> {
        let bytes = hex::decode(text).map_err(|e| CommandError::Hex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_channel_a_reference_frame() {
        let cmd = ShockCommand::new(Channel::A, 12, 75);

        assert_eq!(cmd.to_hex(), "35110101000C114B32");
        assert_eq!(
            cmd.encode(),
            [0x35, 0x11, 0x01, 0x01, 0x00, 0x0C, 0x11, 0x4B, 0x32]
        );
        assert_eq!(ShockCommand::from_hex("35110101000C114B32"), Ok(cmd));
    }

    #[test]
    fn channel_b_uses_second_nibble() {
        let cmd = ShockCommand::new(Channel::B, 0x1234, 100);

        assert_eq!(cmd.to_hex(), "351102011234116432");
        assert_eq!(ShockCommand::decode(&cmd.encode()), Ok(cmd));
    }

    #[test]
    fn silence_encodes_zero_fields() {
        assert_eq!(ShockCommand::silence(Channel::A).to_hex(), "351101010000110032");
        assert_eq!(ShockCommand::silence(Channel::B).to_hex(), "351102010000110032");
    }

    #[test]
    fn oversized_strength_wraps_to_sixteen_bits() {
        let cmd = ShockCommand::new(Channel::A, 0x1_0005, 60);

        assert!(cmd.overflows());
        assert_eq!(cmd.encode().len(), COMMAND_LEN);
        assert_eq!(cmd.to_hex(), "351101010005113C32");

        let decoded = ShockCommand::decode(&cmd.encode()).unwrap();
        assert_eq!(decoded.strength, 5);
        assert!(!ShockCommand::new(Channel::A, 65_535, 255).overflows());
    }

    #[test]
    fn decode_rejects_malformed_frames() {
        assert_eq!(
            ShockCommand::decode(&[0x35, 0x11]),
            Err(CommandError::Length(2))
        );
        assert_eq!(
            ShockCommand::from_hex("36110101000C114B32"),
            Err(CommandError::Marker { offset: 0, found: 0x36 })
        );
        assert_eq!(
            ShockCommand::from_hex("35110301000C114B32"),
            Err(CommandError::UnknownChannel(0x03))
        );
        assert_eq!(
            ShockCommand::from_hex("35110101000C114B33"),
            Err(CommandError::Marker { offset: 8, found: 0x33 })
        );
        assert!(matches!(
            ShockCommand::from_hex("zz"),
            Err(CommandError::Hex(_))
        ));
    }
}
