//! miniSEED v2 fixed-header decoding.
//!
//! Only the header fields needed to route and order records are decoded
//! here. Sample data is left to [`miniseed_rs`] via
//! [`Record::decode_samples`].
//!
//! Fixed header layout (byte offsets):
//! - 0..6: sequence number (ASCII digits)
//! - 6: data quality indicator, 7: reserved
//! - 8..13: station, 13..15: location, 15..18: channel, 18..20: network
//! - 20..30: BTime start (year, day-of-year, h, m, s, unused, ticks)
//! - 30..32: number of samples
//! - 32..34: sample rate factor, 34..36: sample rate multiplier
//! - 39: number of blockettes that follow
//! - 44..46: offset of data, 46..48: offset of first blockette

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::chunk::CHUNK_LEN;
use crate::error::{ProtocolError, Result};
use crate::nscl::Nscl;

pub const FIXED_HEADER_LEN: usize = 48;

/// Indicator of a data record. Anything sorting below it is a control record.
pub const DATA_INDICATOR: &[u8; 2] = b"D ";

/// Smallest and largest record length exponents allowed by Blockette 1000.
pub const MIN_RECORD_EXP: u8 = 7;
pub const MAX_RECORD_EXP: u8 = 16;

const BLOCKETTE_1000: u16 = 1000;
const DATA_OFFSET: usize = 64;
const ENCODING_INT32: u8 = 3;
const MAX_BLOCKETTES: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn u16(self, data: &[u8], off: usize) -> u16 {
        let b = [data[off], data[off + 1]];
        match self {
            Self::Big => u16::from_be_bytes(b),
            Self::Little => u16::from_le_bytes(b),
        }
    }

    fn i16(self, data: &[u8], off: usize) -> i16 {
        self.u16(data, off) as i16
    }

    /// SEED writers may use either order; the BTime year tells them apart.
    fn detect(data: &[u8]) -> Self {
        let year = Self::Big.u16(data, 20);
        if (1900..=2100).contains(&year) {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// A decoded miniSEED record header plus its raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    nscl: Nscl,
    sequence: Option<u32>,
    indicator: [u8; 2],
    start: DateTime<Utc>,
    num_samples: u16,
    rate_factor: i16,
    rate_multiplier: i16,
    block_len: usize,
    raw: Vec<u8>,
}

impl Record {
    /// Decode a record from `data`.
    ///
    /// `data` may hold only the first chunk of a longer record; check
    /// [`is_complete`](Self::is_complete) and decode again once the rest of
    /// [`block_len`](Self::block_len) bytes are available.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(ProtocolError::RecordTooShort {
                expected: FIXED_HEADER_LEN,
                actual: data.len(),
            });
        }

        let nscl = decode_nscl(data)?;
        let order = ByteOrder::detect(data);
        let start = decode_btime(data, order)?;
        let block_len = decode_block_len(data, order)?;

        let sequence = std::str::from_utf8(&data[0..6])
            .ok()
            .and_then(|s| s.trim().parse().ok());

        let raw_len = block_len.min(data.len());

        Ok(Self {
            nscl,
            sequence,
            indicator: [data[6], data[7]],
            start,
            num_samples: order.u16(data, 30),
            rate_factor: order.i16(data, 32),
            rate_multiplier: order.i16(data, 34),
            block_len,
            raw: data[..raw_len].to_vec(),
        })
    }

    pub fn nscl(&self) -> &Nscl {
        &self.nscl
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    /// Two-byte indicator: quality code plus the reserved byte.
    pub fn indicator(&self) -> &[u8; 2] {
        &self.indicator
    }

    /// Data quality code, e.g. `'D'`, `'R'`, `'Q'` or `'M'`.
    pub fn quality(&self) -> char {
        self.indicator[0] as char
    }

    /// True unless the indicator sorts before [`DATA_INDICATOR`].
    pub fn is_data(&self) -> bool {
        self.indicator >= *DATA_INDICATOR
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start
    }

    /// Time of the last sample, or the start time if the rate is unknown.
    pub fn end_time(&self) -> DateTime<Utc> {
        let rate = self.sample_rate();
        if rate <= 0.0 || self.num_samples == 0 {
            return self.start;
        }
        let span_us = (f64::from(self.num_samples - 1) / rate * 1e6).round();
        // Absurdly low rates put the end past anything chrono can represent.
        if !span_us.is_finite() || span_us >= i64::MAX as f64 {
            return DateTime::<Utc>::MAX_UTC;
        }
        self.start
            .checked_add_signed(Duration::microseconds(span_us as i64))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn num_samples(&self) -> u16 {
        self.num_samples
    }

    /// Nominal sample rate in Hz from the factor/multiplier pair.
    pub fn sample_rate(&self) -> f64 {
        let f = f64::from(self.rate_factor);
        let m = f64::from(self.rate_multiplier);
        match (self.rate_factor, self.rate_multiplier) {
            (0, _) => 0.0,
            (_, 0) => f.abs(),
            (fa, ma) if fa > 0 && ma > 0 => f * m,
            (fa, _) if fa > 0 => -f / m,
            (_, ma) if ma > 0 => -m / f,
            _ => 1.0 / (f * m),
        }
    }

    /// Total record length declared by Blockette 1000 (512 if absent).
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Whether the decoded buffer held the whole declared record.
    pub fn is_complete(&self) -> bool {
        self.raw.len() == self.block_len
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Fully decode the record, including samples.
    pub fn decode_samples(&self) -> Result<miniseed_rs::MseedRecord> {
        Ok(miniseed_rs::decode(&self.raw)?)
    }
}

/// Total record length declared by the header in `data`.
///
/// Reads only the blockette chain, so it succeeds for records whose name or
/// start time would fail [`Record::decode`]. Returns [`CHUNK_LEN`] when no
/// Blockette 1000 is present.
pub fn declared_len(data: &[u8]) -> Result<usize> {
    if data.len() < FIXED_HEADER_LEN {
        return Err(ProtocolError::RecordTooShort {
            expected: FIXED_HEADER_LEN,
            actual: data.len(),
        });
    }
    decode_block_len(data, ByteOrder::detect(data))
}

fn decode_nscl(data: &[u8]) -> Result<Nscl> {
    let name = &data[8..20];
    if !name
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b' ' || b == b'-' || b == b'_')
    {
        return Err(ProtocolError::IllegalChannelName(
            String::from_utf8_lossy(name).into_owned(),
        ));
    }
    // Names are ASCII past the check above.
    let field = |range: std::ops::Range<usize>| String::from_utf8_lossy(&data[range]).into_owned();
    Ok(Nscl::new(
        field(18..20),
        field(8..13),
        field(15..18),
        field(13..15),
    ))
}

fn decode_btime(data: &[u8], order: ByteOrder) -> Result<DateTime<Utc>> {
    let year = order.u16(data, 20);
    let doy = order.u16(data, 22);
    let (hour, minute, second) = (data[24], data[25], data[26]);
    let ticks = order.u16(data, 28);

    let invalid = || {
        ProtocolError::InvalidStartTime(format!(
            "{year}-{doy:03} {hour:02}:{minute:02}:{second:02}.{ticks:04}"
        ))
    };

    if second > 60 || ticks > 9999 {
        return Err(invalid());
    }

    let date = NaiveDate::from_yo_opt(i32::from(year), u32::from(doy)).ok_or_else(invalid)?;
    // Leap seconds are folded into the following minute.
    let base = date
        .and_hms_opt(u32::from(hour), u32::from(minute), u32::from(second.min(59)))
        .ok_or_else(invalid)?;
    let extra = Duration::seconds(i64::from(second.saturating_sub(59)))
        + Duration::microseconds(i64::from(ticks) * 100);

    Ok(Utc.from_utc_datetime(&base) + extra)
}

fn decode_block_len(data: &[u8], order: ByteOrder) -> Result<usize> {
    let limit = data.len().min(CHUNK_LEN);
    let mut off = usize::from(order.u16(data, 46));

    for _ in 0..MAX_BLOCKETTES {
        if off < FIXED_HEADER_LEN || off + 4 > limit {
            break;
        }
        let kind = order.u16(data, off);
        if kind == BLOCKETTE_1000 && off + 7 <= limit {
            let exp = data[off + 6];
            if !(MIN_RECORD_EXP..=MAX_RECORD_EXP).contains(&exp) {
                return Err(ProtocolError::InvalidRecordLength(exp));
            }
            return Ok(1usize << exp);
        }
        let next = usize::from(order.u16(data, off + 2));
        if next <= off {
            break;
        }
        off = next;
    }

    Ok(CHUNK_LEN)
}

/// Header fields for building a record, mainly for test fixtures and mocks.
#[derive(Clone, Debug)]
pub struct RecordHeader {
    pub nscl: Nscl,
    pub sequence: u32,
    pub indicator: [u8; 2],
    pub start: DateTime<Utc>,
    pub num_samples: u16,
    pub rate_factor: i16,
    pub rate_multiplier: i16,
    /// Record length as a power of two between 128 and 65536.
    pub block_len: usize,
    /// INT32 samples written at the data offset.
    pub samples: Vec<i32>,
}

impl RecordHeader {
    pub fn new(nscl: Nscl, start: DateTime<Utc>) -> Self {
        Self {
            nscl,
            sequence: 1,
            indicator: *DATA_INDICATOR,
            start,
            num_samples: 0,
            rate_factor: 100,
            rate_multiplier: 1,
            block_len: CHUNK_LEN,
            samples: Vec::new(),
        }
    }

    /// Set the payload and the matching sample count.
    pub fn with_samples(mut self, samples: Vec<i32>) -> Self {
        self.num_samples = u16::try_from(samples.len()).unwrap_or(u16::MAX);
        self.samples = samples;
        self
    }

    /// Encode a big-endian INT32 record of `block_len` bytes with
    /// Blockette 1000. Data past `samples` is zeroed.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let exp = self.block_len.trailing_zeros();
        if !self.block_len.is_power_of_two()
            || !(u32::from(MIN_RECORD_EXP)..=u32::from(MAX_RECORD_EXP)).contains(&exp)
        {
            return Err(ProtocolError::InvalidRecordLength(exp as u8));
        }

        let data_len = DATA_OFFSET + 4 * self.samples.len();
        if data_len > self.block_len {
            return Err(ProtocolError::RecordTooShort {
                expected: data_len,
                actual: self.block_len,
            });
        }

        let mut out = vec![0u8; self.block_len];
        let seq = format!("{:06}", self.sequence % 1_000_000);
        out[0..6].copy_from_slice(seq.as_bytes());
        out[6..8].copy_from_slice(&self.indicator);
        put_field(&mut out[8..13], self.nscl.station())?;
        put_field(&mut out[13..15], self.nscl.location())?;
        put_field(&mut out[15..18], self.nscl.channel())?;
        put_field(&mut out[18..20], self.nscl.network())?;

        let start = self.start.naive_utc();
        out[20..22].copy_from_slice(&(start.year() as u16).to_be_bytes());
        out[22..24].copy_from_slice(&(start.ordinal() as u16).to_be_bytes());
        out[24] = start.hour() as u8;
        out[25] = start.minute() as u8;
        out[26] = start.second() as u8;
        let ticks = start.nanosecond() / 100_000;
        out[28..30].copy_from_slice(&(ticks as u16).to_be_bytes());

        out[30..32].copy_from_slice(&self.num_samples.to_be_bytes());
        out[32..34].copy_from_slice(&self.rate_factor.to_be_bytes());
        out[34..36].copy_from_slice(&self.rate_multiplier.to_be_bytes());
        out[39] = 1;
        out[44..46].copy_from_slice(&(DATA_OFFSET as u16).to_be_bytes());
        out[46..48].copy_from_slice(&(FIXED_HEADER_LEN as u16).to_be_bytes());

        let b = FIXED_HEADER_LEN;
        out[b..b + 2].copy_from_slice(&BLOCKETTE_1000.to_be_bytes());
        // next blockette offset stays 0
        out[b + 4] = ENCODING_INT32;
        out[b + 5] = 1; // big-endian
        out[b + 6] = exp as u8;

        for (i, sample) in self.samples.iter().enumerate() {
            let at = DATA_OFFSET + 4 * i;
            out[at..at + 4].copy_from_slice(&sample.to_be_bytes());
        }

        Ok(out)
    }
}

fn put_field(dst: &mut [u8], value: &str) -> Result<()> {
    if value.len() > dst.len() || !value.is_ascii() {
        return Err(ProtocolError::IllegalChannelName(value.to_owned()));
    }
    dst.fill(b' ');
    dst[..value.len()].copy_from_slice(value.as_bytes());
    Ok(())
}
