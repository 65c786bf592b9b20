use chrono::{DateTime, Utc};
use cwbquery_rs_protocol::{Nscl, Record};

/// Consecutive records received for one channel.
///
/// Records keep their wire order. Every record shares the same [`Nscl`];
/// the only empty batch is the one returned for a reply with no data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelBatch {
    records: Vec<Record>,
}

impl ChannelBatch {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        debug_assert!(records.windows(2).all(|w| w[0].nscl() == w[1].nscl()));
        Self { records }
    }

    /// Channel of the batch, `None` if empty.
    pub fn nscl(&self) -> Option<&Nscl> {
        self.records.first().map(Record::nscl)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of sample counts over all records.
    pub fn num_samples(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.num_samples())).sum()
    }

    /// Earliest start and latest end time across the batch.
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.records.iter().map(Record::start_time).min()?;
        let end = self.records.iter().map(Record::end_time).max()?;
        Some((start, end))
    }

    /// Order records by start time. Stable for equal start times.
    pub fn sort_by_start(&mut self) {
        self.records.sort_by_key(Record::start_time);
    }
}

impl IntoIterator for ChannelBatch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a ChannelBatch {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
