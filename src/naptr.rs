//! NAPTR record model and answer-set handling (RFC 2915).
//!
//! Answers are kept in a [`RecordSet`]: an arena of record slots plus an
//! index of live entries in answer order. Handles stay valid across removals
//! and sorting, which gives the same walk/remove/sort contract as an
//! intrusive linked list without the pointer surgery.

use std::ops::Range;

use rand::Rng;
use tracing::debug;

use crate::rewrite::split_regexp;
use crate::wire::{self, RecordType, Response, WireError};

pub const MAX_SERVICE_LEN: usize = 127;
pub const MAX_REGEX_PATTERN_LEN: usize = 63;
pub const MAX_REGEX_REPLACE_LEN: usize = 63;
pub const MAX_REPLACEMENT_LEN: usize = 127;

/// One parsed NAPTR resource record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NaptrRecord {
    /// RFC 2915 ranking, ascending, compared before `preference`
    pub order: u16,
    /// RFC 2915 ranking within one `order` value
    pub preference: u16,
    /// First byte of the flags string; `'a'` address lookup, `'s'` SRV
    pub flag: Option<char>,
    /// Service descriptor, e.g. `"x-3gpp-pgw:x-s5-gtp"`
    pub service: String,
    /// Pattern half of the Regexp field
    pub regex_pattern: String,
    /// Replace half of the Regexp field
    pub regex_replace: String,
    /// Literal next-domain value; `"."` means "use the regexp instead"
    pub replacement: String,
    /// False when the record's replacement name failed to decode. Invalid
    /// records are still part of the set; see `ResolverOptions`.
    pub valid: bool,
}

impl std::fmt::Display for NaptrRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "order={} pref={} flag={:?} service='{}' regexp='{}'/'{}' replacement='{}'",
            self.order,
            self.preference,
            self.flag,
            self.service,
            self.regex_pattern,
            self.regex_replace,
            self.replacement
        )
    }
}

/// Decodes one NAPTR rdata section against the full message.
///
/// Field extraction is best effort: a truncated or undecodable record comes
/// back with whatever fields were read and `valid == false` instead of an
/// error, so one bad answer never discards the rest of the response.
fn parse_naptr_rdata(msg: &[u8], rdata: &Range<usize>) -> NaptrRecord {
    let mut rec = NaptrRecord {
        valid: true,
        ..Default::default()
    };
    let end = rdata.end;
    let mut pos = rdata.start;

    let take = |n: usize, pos: &mut usize| -> Option<Range<usize>> {
        if *pos + n > end {
            return None;
        }
        let r = *pos..*pos + n;
        *pos += n;
        Some(r)
    };

    let Some(r) = take(2, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    rec.order = u16::from_be_bytes([msg[r.start], msg[r.start + 1]]);

    let Some(r) = take(2, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    rec.preference = u16::from_be_bytes([msg[r.start], msg[r.start + 1]]);

    let Some(r) = take(1, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    let flags_len = msg[r.start] as usize;
    let Some(r) = take(flags_len, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    rec.flag = msg[r.clone()].first().map(|&b| b as char);

    let Some(r) = take(1, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    let service_len = msg[r.start] as usize;
    let Some(r) = take(service_len, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    rec.service = truncated(&msg[r], MAX_SERVICE_LEN);

    let Some(r) = take(1, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    let regexp_len = msg[r.start] as usize;
    let Some(r) = take(regexp_len, &mut pos) else {
        rec.valid = false;
        return rec;
    };
    let raw_regexp = truncated(&msg[r], MAX_REGEX_PATTERN_LEN + MAX_REGEX_REPLACE_LEN + 3);
    let (pattern, replace) = split_regexp(&raw_regexp);
    rec.regex_pattern = cap(pattern, MAX_REGEX_PATTERN_LEN);
    rec.regex_replace = cap(replace, MAX_REGEX_REPLACE_LEN);

    match wire::unpack_domain_name(msg, pos) {
        Ok((name, _)) => rec.replacement = cap(name, MAX_REPLACEMENT_LEN),
        Err(e) => {
            debug!("failed to decode NAPTR replacement name: {}", e);
            rec.valid = false;
        }
    }

    rec
}

fn truncated(bytes: &[u8], max: usize) -> String {
    let s = String::from_utf8_lossy(bytes);
    s.chars().take(max).collect()
}

fn cap(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        s
    } else {
        s.chars().take(max).collect()
    }
}

/// Stable reference to a record in a [`RecordSet`]; survives removal of
/// other records and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHandle(usize);

/// An owned set of NAPTR records preserving DNS answer order.
///
/// # Examples
///
/// ```
/// use epcdns::naptr::{NaptrRecord, RecordSet};
///
/// let rec = |order, preference| NaptrRecord { order, preference, ..Default::default() };
/// let mut set = RecordSet::from_records(vec![rec(2, 5), rec(1, 9), rec(1, 3)]);
/// set.sort();
///
/// let keys: Vec<(u16, u16)> = set.iter().map(|r| (r.order, r.preference)).collect();
/// assert_eq!(keys, vec![(1, 3), (1, 9), (2, 5)]);
/// ```
#[derive(Debug, Default)]
pub struct RecordSet {
    slots: Vec<Option<NaptrRecord>>,
    live: Vec<usize>,
}

impl RecordSet {
    pub fn from_records(records: Vec<NaptrRecord>) -> Self {
        let live = (0..records.len()).collect();
        Self {
            slots: records.into_iter().map(Some).collect(),
            live,
        }
    }

    /// Parses a response message, keeping every NAPTR answer in answer
    /// order. Answers of any other type in the same response are skipped.
    pub fn from_response(msg: &[u8]) -> Result<Self, WireError> {
        let response = Response::parse(msg)?;
        let records = response
            .answers
            .iter()
            .filter(|a| a.rtype == RecordType::Naptr as u16)
            .map(|a| parse_naptr_rdata(msg, &a.rdata))
            .collect();
        Ok(Self::from_records(records))
    }

    pub fn count(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn head(&self) -> Option<RecordHandle> {
        self.live.first().map(|&i| RecordHandle(i))
    }

    pub fn get(&self, handle: RecordHandle) -> Option<&NaptrRecord> {
        self.slots.get(handle.0).and_then(|s| s.as_ref())
    }

    /// Handle of the record following `handle`, in current set order.
    pub fn next(&self, handle: RecordHandle) -> Option<RecordHandle> {
        let pos = self.position(handle)?;
        self.live.get(pos + 1).map(|&i| RecordHandle(i))
    }

    /// Removes a record.
    ///
    /// Returns the handle now occupying the removed record's position (its
    /// successor), the new tail when the tail was removed, or `None` when
    /// the set becomes empty or `handle` was already removed. The removed
    /// record is dropped; `get` on its handle returns `None` afterwards.
    pub fn remove(&mut self, handle: RecordHandle) -> Option<RecordHandle> {
        let pos = self.position(handle)?;
        self.live.remove(pos);
        self.slots[handle.0] = None;

        if self.live.is_empty() {
            None
        } else if pos < self.live.len() {
            Some(RecordHandle(self.live[pos]))
        } else {
            Some(RecordHandle(self.live[self.live.len() - 1]))
        }
    }

    /// Stable sort by ascending `(order, preference)`. Records with equal
    /// keys keep their relative (answer) order.
    pub fn sort(&mut self) {
        let slots = &self.slots;
        self.live.sort_by_key(|&i| {
            let rec = slots[i].as_ref().expect("live index points at a record");
            (rec.order, rec.preference)
        });
    }

    /// Records in current set order.
    pub fn iter(&self) -> impl Iterator<Item = &NaptrRecord> {
        self.live
            .iter()
            .map(|&i| self.slots[i].as_ref().expect("live index points at a record"))
    }

    /// Picks uniformly at random among the leading records that share the
    /// head's `order` value. Meaningful after [`RecordSet::sort`]; used to
    /// spread load across equal-priority peers. The caller supplies the RNG
    /// so selection stays reproducible under test.
    pub fn random_select<R: Rng>(&self, rng: &mut R) -> Option<RecordHandle> {
        let head = self.head()?;
        let best_order = self.get(head)?.order;
        let candidates = self
            .iter()
            .take_while(|r| r.order == best_order)
            .count();
        let idx = rng.gen_range(0..candidates);
        Some(RecordHandle(self.live[idx]))
    }

    fn position(&self, handle: RecordHandle) -> Option<usize> {
        self.live.iter().position(|&i| i == handle.0)
    }
}
