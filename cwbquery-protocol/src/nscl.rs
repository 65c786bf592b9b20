use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};

/// Width of the compact `NNSSSSSCCCLL` form.
pub const NSCL_LEN: usize = 12;

/// Network, station, channel and location of a data channel.
///
/// Fields are kept exactly as they appear on the wire, including the space
/// padding of the fixed-width SEED fields, so `"WEL  "` and `"WEL"` are
/// different stations. Ordering compares network, then station, then
/// channel, then location.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nscl {
    // Field order drives the derived `Ord`.
    network: String,
    station: String,
    channel: String,
    location: String,
}

impl Nscl {
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        channel: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            channel: channel.into(),
            location: location.into(),
        }
    }

    /// Parse the 12-character compact form `NNSSSSSCCCLL`.
    pub fn from_compact(s: &str) -> Result<Self> {
        if s.len() != NSCL_LEN || !s.is_ascii() {
            return Err(ProtocolError::InvalidNscl(s.to_owned()));
        }
        Ok(Self::new(&s[0..2], &s[2..7], &s[7..10], &s[10..12]))
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Dotted form with padding trimmed, e.g. `NZ.WEL.HHZ.10`.
    pub fn to_dotted(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network.trim_end(),
            self.station.trim_end(),
            self.channel.trim_end(),
            self.location.trim_end()
        )
    }
}

impl fmt::Display for Nscl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}",
            self.network, self.station, self.channel, self.location
        )
    }
}

impl FromStr for Nscl {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_compact(s)
    }
}
