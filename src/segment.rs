//! Wire codec: bit-exact header parsing/serialization and dispatch by flag.
//!
//! Header layout (big-endian, 6 bytes):
//! `flags(1) | header_length(1) | sequence(1) | ack_number(1) | checksum(2)`.
//! `checksum` is written as zero and ignored on receipt (CHK is reserved,
//! not enforced).

use crate::error::RudpError;

pub const FLAG_SYN: u8 = 0x80;
pub const FLAG_ACK: u8 = 0x40;
pub const FLAG_EAK: u8 = 0x20;
pub const FLAG_RST: u8 = 0x10;
pub const FLAG_NUL: u8 = 0x08;
pub const FLAG_CHK: u8 = 0x04;
pub const FLAG_FIN: u8 = 0x02;

pub const HEADER_LEN: usize = 6;
/// SYN carries the negotiated profile inline in its header extension, so a
/// SYN's `header_length` is always this value.
pub const SYN_HEADER_LEN: usize = HEADER_LEN + SynParams::WIRE_LEN;

/// Profile parameters negotiated in a SYN segment's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynParams {
    pub max_send_queue_size: u8,
    pub max_recv_queue_size: u8,
    pub max_segment_size: u16,
    pub max_outstanding_segs: u8,
    pub max_retrans: u8,
    pub max_cumulative_acks: u8,
    pub max_out_of_sequence: u8,
    pub max_auto_reset: u8,
    pub null_segment_timeout: u16,
    pub retransmission_timeout: u16,
    pub cumulative_ack_timeout: u16,
}

impl SynParams {
    pub const WIRE_LEN: usize = 16;

    fn encode(&self, out: &mut [u8]) {
        out[0] = self.max_send_queue_size;
        out[1] = self.max_recv_queue_size;
        out[2..4].copy_from_slice(&self.max_segment_size.to_be_bytes());
        out[4] = self.max_outstanding_segs;
        out[5] = self.max_retrans;
        out[6] = self.max_cumulative_acks;
        out[7] = self.max_out_of_sequence;
        out[8] = self.max_auto_reset;
        out[9..11].copy_from_slice(&self.null_segment_timeout.to_be_bytes());
        out[11..13].copy_from_slice(&self.retransmission_timeout.to_be_bytes());
        out[13..15].copy_from_slice(&self.cumulative_ack_timeout.to_be_bytes());
        // out[15] reserved/padding, written as zero.
        out[15] = 0;
    }

    fn decode(bytes: &[u8]) -> Self {
        SynParams {
            max_send_queue_size: bytes[0],
            max_recv_queue_size: bytes[1],
            max_segment_size: u16::from_be_bytes([bytes[2], bytes[3]]),
            max_outstanding_segs: bytes[4],
            max_retrans: bytes[5],
            max_cumulative_acks: bytes[6],
            max_out_of_sequence: bytes[7],
            max_auto_reset: bytes[8],
            null_segment_timeout: u16::from_be_bytes([bytes[9], bytes[10]]),
            retransmission_timeout: u16::from_be_bytes([bytes[11], bytes[12]]),
            cumulative_ack_timeout: u16::from_be_bytes([bytes[13], bytes[14]]),
        }
    }
}

/// A single RUDP PDU. Modeled as a tagged sum rather than a class
/// hierarchy: each variant carries exactly the fields its wire form needs,
/// and dispatch is a flat match instead of virtual calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Syn {
        seq: u8,
        ack: Option<u8>,
        params: SynParams,
    },
    Nul {
        seq: u8,
        ack: Option<u8>,
    },
    Eak {
        seq: u8,
        ack: Option<u8>,
        acks: Vec<u8>,
    },
    Rst {
        seq: u8,
        ack: Option<u8>,
    },
    Fin {
        seq: u8,
        ack: Option<u8>,
    },
    Ack {
        seq: u8,
        ack: u8,
    },
    Dat {
        seq: u8,
        ack: u8,
        payload: Vec<u8>,
    },
}

impl Segment {
    pub fn seq(&self) -> u8 {
        match self {
            Segment::Syn { seq, .. }
            | Segment::Nul { seq, .. }
            | Segment::Eak { seq, .. }
            | Segment::Rst { seq, .. }
            | Segment::Fin { seq, .. }
            | Segment::Ack { seq, .. }
            | Segment::Dat { seq, .. } => *seq,
        }
    }

    pub fn ack(&self) -> Option<u8> {
        match self {
            Segment::Syn { ack, .. }
            | Segment::Nul { ack, .. }
            | Segment::Eak { ack, .. }
            | Segment::Rst { ack, .. }
            | Segment::Fin { ack, .. } => *ack,
            Segment::Ack { ack, .. } | Segment::Dat { ack, .. } => Some(*ack),
        }
    }

    /// Does this segment consume a sequence number from the send space?
    /// SYN, NUL, FIN and DAT each occupy one slot; bare ACK/EAK/RST do not.
    pub fn consumes_sequence(&self) -> bool {
        matches!(
            self,
            Segment::Syn { .. } | Segment::Nul { .. } | Segment::Fin { .. } | Segment::Dat { .. }
        )
    }

    pub fn serialize(&self) -> Vec<u8> {
        let (flags_variant, header_len, body_len) = match self {
            Segment::Syn { .. } => (FLAG_SYN, SYN_HEADER_LEN, SynParams::WIRE_LEN),
            Segment::Nul { .. } => (FLAG_NUL, HEADER_LEN, 0),
            Segment::Eak { acks, .. } => (FLAG_EAK, HEADER_LEN, acks.len()),
            Segment::Rst { .. } => (FLAG_RST, HEADER_LEN, 0),
            Segment::Fin { .. } => (FLAG_FIN, HEADER_LEN, 0),
            Segment::Ack { .. } => (0, HEADER_LEN, 0),
            Segment::Dat { payload, .. } => (0, HEADER_LEN, payload.len()),
        };

        let mut flags = flags_variant;
        if self.ack().is_some() {
            flags |= FLAG_ACK;
        }

        let mut out = vec![0u8; HEADER_LEN + body_len];
        out[0] = flags;
        out[1] = header_len as u8;
        out[2] = self.seq();
        out[3] = self.ack().unwrap_or(0);
        out[4] = 0;
        out[5] = 0;

        match self {
            Segment::Syn { params, .. } => {
                out.resize(SYN_HEADER_LEN, 0);
                params.encode(&mut out[HEADER_LEN..SYN_HEADER_LEN]);
            }
            Segment::Eak { acks, .. } => {
                out[HEADER_LEN..].copy_from_slice(acks);
            }
            Segment::Dat { payload, .. } => {
                out[HEADER_LEN..].copy_from_slice(payload);
            }
            _ => {}
        }

        out
    }

    /// Dispatch priority: SYN, NUL, EAK, RST, FIN, then ACK/DAT by length.
    /// Unknown flag combinations (none of SYN/NUL/EAK/RST/FIN/ACK set) are
    /// rejected.
    pub fn parse(bytes: &[u8]) -> Result<Segment, RudpError> {
        if bytes.len() < HEADER_LEN {
            return Err(RudpError::Malformed(format!(
                "segment of {} bytes is shorter than the {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let flags = bytes[0];
        let header_length = bytes[1] as usize;
        let seq = bytes[2];
        let ack_byte = bytes[3];
        let has_ack = flags & FLAG_ACK != 0;
        let ack = has_ack.then_some(ack_byte);

        if flags & FLAG_SYN != 0 {
            if bytes.len() < SYN_HEADER_LEN {
                return Err(RudpError::Malformed(format!(
                    "SYN segment of {} bytes is missing its {}-byte profile body",
                    bytes.len(),
                    SynParams::WIRE_LEN
                )));
            }
            let params = SynParams::decode(&bytes[HEADER_LEN..SYN_HEADER_LEN]);
            return Ok(Segment::Syn { seq, ack, params });
        }

        if flags & FLAG_NUL != 0 {
            return Ok(Segment::Nul { seq, ack });
        }

        if flags & FLAG_EAK != 0 {
            let body_start = header_length.clamp(HEADER_LEN, bytes.len());
            let acks = bytes[body_start..].to_vec();
            return Ok(Segment::Eak { seq, ack, acks });
        }

        if flags & FLAG_RST != 0 {
            return Ok(Segment::Rst { seq, ack });
        }

        if flags & FLAG_FIN != 0 {
            return Ok(Segment::Fin { seq, ack });
        }

        if has_ack {
            if bytes.len() == HEADER_LEN {
                return Ok(Segment::Ack { seq, ack: ack_byte });
            }
            let body_start = header_length.clamp(HEADER_LEN, bytes.len());
            return Ok(Segment::Dat {
                seq,
                ack: ack_byte,
                payload: bytes[body_start..].to_vec(),
            });
        }

        Err(RudpError::Malformed(format!(
            "no recognized flag bits set in 0x{flags:02x}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_params() -> SynParams {
        SynParams {
            max_send_queue_size: 32,
            max_recv_queue_size: 32,
            max_segment_size: 128,
            max_outstanding_segs: 3,
            max_retrans: 0,
            max_cumulative_acks: 3,
            max_out_of_sequence: 3,
            max_auto_reset: 3,
            null_segment_timeout: 2000,
            retransmission_timeout: 600,
            cumulative_ack_timeout: 300,
        }
    }

    fn round_trip(s: Segment) {
        let bytes = s.serialize();
        let parsed = Segment::parse(&bytes).expect("parse of a just-serialized segment");
        assert_eq!(parsed, s);
    }

    #[test]
    fn round_trips_every_variant() {
        round_trip(Segment::Syn {
            seq: 0,
            ack: None,
            params: sample_params(),
        });
        round_trip(Segment::Syn {
            seq: 7,
            ack: Some(6),
            params: sample_params(),
        });
        round_trip(Segment::Nul { seq: 4, ack: Some(3) });
        round_trip(Segment::Eak {
            seq: 10,
            ack: Some(9),
            acks: vec![12, 14, 15],
        });
        round_trip(Segment::Eak {
            seq: 1,
            ack: None,
            acks: vec![],
        });
        round_trip(Segment::Rst { seq: 9, ack: None });
        round_trip(Segment::Fin { seq: 20, ack: Some(19) });
        round_trip(Segment::Ack { seq: 5, ack: 4 });
        round_trip(Segment::Dat {
            seq: 5,
            ack: 4,
            payload: vec![1, 2, 3],
        });
        round_trip(Segment::Dat {
            seq: 5,
            ack: 4,
            payload: vec![],
        });
    }

    #[test]
    fn rejects_short_buffers() {
        assert!(Segment::parse(&[0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn rejects_unknown_flag_combination() {
        let bytes = [FLAG_CHK, 6, 0, 0, 0, 0];
        assert!(Segment::parse(&bytes).is_err());
    }

    #[test]
    fn distinguishes_bare_ack_from_dat_by_length() {
        let ack = Segment::Ack { seq: 1, ack: 0 };
        assert_eq!(ack.serialize().len(), HEADER_LEN);

        let dat = Segment::Dat {
            seq: 1,
            ack: 0,
            payload: vec![9],
        };
        assert_eq!(dat.serialize().len(), HEADER_LEN + 1);
    }

    #[test]
    fn syn_header_length_matches_minimum_segment_size() {
        // The profile table's floor for max_segment_size (22) exists
        // precisely because that's header(6) + SYN body(16).
        assert_eq!(SYN_HEADER_LEN, 22);
    }
}
