//! Immutable connection configuration, validated at construction.

use crate::error::RudpError;

/// Validated, immutable protocol parameters. Construct via [`Profile::default`]
/// or [`ProfileBuilder`]; there is no way to obtain a `Profile` holding an
/// out-of-range value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
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

impl Default for Profile {
    fn default() -> Self {
        Profile {
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
}

impl Profile {
    pub fn to_syn_params(self) -> crate::segment::SynParams {
        crate::segment::SynParams {
            max_send_queue_size: self.max_send_queue_size,
            max_recv_queue_size: self.max_recv_queue_size,
            max_segment_size: self.max_segment_size,
            max_outstanding_segs: self.max_outstanding_segs,
            max_retrans: self.max_retrans,
            max_cumulative_acks: self.max_cumulative_acks,
            max_out_of_sequence: self.max_out_of_sequence,
            max_auto_reset: self.max_auto_reset,
            null_segment_timeout: self.null_segment_timeout,
            retransmission_timeout: self.retransmission_timeout,
            cumulative_ack_timeout: self.cumulative_ack_timeout,
        }
    }

}

/// Builder that routes every field through the same range checks
/// `Profile::default()` skips. Unset fields fall back to the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileBuilder {
    profile: OptionalProfile,
}

#[derive(Debug, Clone, Copy, Default)]
struct OptionalProfile {
    max_send_queue_size: Option<u8>,
    max_recv_queue_size: Option<u8>,
    max_segment_size: Option<u16>,
    max_outstanding_segs: Option<u8>,
    max_retrans: Option<u8>,
    max_cumulative_acks: Option<u8>,
    max_out_of_sequence: Option<u8>,
    max_auto_reset: Option<u8>,
    null_segment_timeout: Option<u16>,
    retransmission_timeout: Option<u16>,
    cumulative_ack_timeout: Option<u16>,
}

macro_rules! builder_setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.profile.$name = Some(value);
            self
        }
    };
}

impl ProfileBuilder {
    builder_setter!(max_send_queue_size, u8);
    builder_setter!(max_recv_queue_size, u8);
    builder_setter!(max_segment_size, u16);
    builder_setter!(max_outstanding_segs, u8);
    builder_setter!(max_retrans, u8);
    builder_setter!(max_cumulative_acks, u8);
    builder_setter!(max_out_of_sequence, u8);
    builder_setter!(max_auto_reset, u8);
    builder_setter!(null_segment_timeout, u16);
    builder_setter!(retransmission_timeout, u16);
    builder_setter!(cumulative_ack_timeout, u16);

    pub fn build(self) -> Result<Profile, RudpError> {
        let defaults = Profile::default();
        let p = self.profile;

        let max_send_queue_size = p.max_send_queue_size.unwrap_or(defaults.max_send_queue_size);
        let max_recv_queue_size = p.max_recv_queue_size.unwrap_or(defaults.max_recv_queue_size);
        let max_segment_size = p.max_segment_size.unwrap_or(defaults.max_segment_size);
        let max_outstanding_segs = p
            .max_outstanding_segs
            .unwrap_or(defaults.max_outstanding_segs);
        let max_retrans = p.max_retrans.unwrap_or(defaults.max_retrans);
        let max_cumulative_acks = p.max_cumulative_acks.unwrap_or(defaults.max_cumulative_acks);
        let max_out_of_sequence = p
            .max_out_of_sequence
            .unwrap_or(defaults.max_out_of_sequence);
        let max_auto_reset = p.max_auto_reset.unwrap_or(defaults.max_auto_reset);
        let null_segment_timeout = p
            .null_segment_timeout
            .unwrap_or(defaults.null_segment_timeout);
        let retransmission_timeout = p
            .retransmission_timeout
            .unwrap_or(defaults.retransmission_timeout);
        let cumulative_ack_timeout = p
            .cumulative_ack_timeout
            .unwrap_or(defaults.cumulative_ack_timeout);

        check_range("max_send_queue_size", max_send_queue_size, 1, 255)?;
        check_range("max_recv_queue_size", max_recv_queue_size, 1, 255)?;
        check_range("max_segment_size", max_segment_size, 22, 65535)?;
        check_range("max_outstanding_segs", max_outstanding_segs, 1, 255)?;
        check_range("max_retrans", max_retrans, 0, 255)?;
        check_range("max_cumulative_acks", max_cumulative_acks, 0, 255)?;
        check_range("max_out_of_sequence", max_out_of_sequence, 0, 255)?;
        check_range("max_auto_reset", max_auto_reset, 0, 255)?;
        check_range("null_segment_timeout", null_segment_timeout, 0, 65535)?;
        check_range("retransmission_timeout", retransmission_timeout, 100, 65535)?;
        check_range("cumulative_ack_timeout", cumulative_ack_timeout, 100, 65535)?;

        Ok(Profile {
            max_send_queue_size,
            max_recv_queue_size,
            max_segment_size,
            max_outstanding_segs,
            max_retrans,
            max_cumulative_acks,
            max_out_of_sequence,
            max_auto_reset,
            null_segment_timeout,
            retransmission_timeout,
            cumulative_ack_timeout,
        })
    }
}

fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<(), RudpError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        Err(RudpError::Config {
            field,
            value: value.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_valid() {
        assert!(ProfileBuilder::default()
            .max_segment_size(Profile::default().max_segment_size)
            .build()
            .is_ok());
    }

    #[test]
    fn rejects_segment_size_below_floor() {
        let err = ProfileBuilder::default().max_segment_size(21).build();
        assert!(matches!(err, Err(RudpError::Config { field: "max_segment_size", .. })));
    }

    #[test]
    fn rejects_zero_outstanding_segs() {
        let err = ProfileBuilder::default().max_outstanding_segs(0).build();
        assert!(matches!(
            err,
            Err(RudpError::Config {
                field: "max_outstanding_segs",
                ..
            })
        ));
    }

    #[test]
    fn rejects_retransmission_timeout_below_floor() {
        let err = ProfileBuilder::default()
            .retransmission_timeout(99)
            .build();
        assert!(err.is_err());
    }

    #[test]
    fn accepts_zero_max_retrans_as_unlimited() {
        assert!(ProfileBuilder::default().max_retrans(0).build().is_ok());
    }
}
