//! Range and prefix scans
//!
//! A [`ListSelector`] names a key range; [`ListOptions`] control direction,
//! limit, page size and resumption. The resulting [`ListIterator`] is lazy:
//! it fetches one page of `batch_size` entries at a time, each page under a
//! single store read lock, and narrows its bounds past the last key it saw.
//!
//! | Selector | Range |
//! |----------|-------|
//! | `{prefix}` | `[prefix ++ 0x00, prefix ++ 0xFF)` |
//! | `{prefix, start}` | `[start, prefix ++ 0xFF)` |
//! | `{prefix, end}` | `[prefix ++ 0x00, end)` |
//! | `{start, end}` | `[start, end)` |
//!
//! The prefix key itself is never part of a prefix scan.

use std::collections::VecDeque;

use stratakv_core::{
    decode_key, deserialize_value, encode_key, encode_prefix, Key, KvEntry, KvError, KvResult,
    Limits,
};
use stratakv_storage::{OrderedStore, StoredValue};

use crate::cursor::{decode_cursor, encode_cursor};

/// Which keys a list scan covers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListSelector {
    prefix: Option<Key>,
    start: Option<Key>,
    end: Option<Key>,
}

impl ListSelector {
    /// Every key strictly below `prefix` (the empty key selects everything)
    pub fn prefix(prefix: Key) -> Self {
        ListSelector {
            prefix: Some(prefix),
            ..Self::default()
        }
    }

    /// Keys in `[start, end)`
    pub fn range(start: Key, end: Key) -> Self {
        ListSelector {
            prefix: None,
            start: Some(start),
            end: Some(end),
        }
    }

    /// Set the inclusive start key
    pub fn with_start(mut self, start: Key) -> Self {
        self.start = Some(start);
        self
    }

    /// Set the exclusive end key
    pub fn with_end(mut self, end: Key) -> Self {
        self.end = Some(end);
        self
    }

    /// Encode and validate the selector into byte bounds
    pub fn resolve(&self, limits: &Limits) -> KvResult<ResolvedRange> {
        let range = match (&self.prefix, &self.start, &self.end) {
            (Some(_), Some(_), Some(_)) => {
                return Err(KvError::type_error(
                    "Selector can not specify both 'start' and 'end' key when specifying 'prefix'",
                ))
            }
            (Some(prefix), start, end) => {
                let prefix = encode_prefix(prefix)?;
                let start = match start {
                    Some(start) => within_prefix(encode_key(start)?, &prefix, "Start")?,
                    None => with_suffix(&prefix, 0x00),
                };
                let end = match end {
                    Some(end) => within_prefix(encode_key(end)?, &prefix, "End")?,
                    None => with_suffix(&prefix, 0xFF),
                };
                ResolvedRange {
                    start,
                    end,
                    common_prefix: prefix,
                }
            }
            (None, Some(start), Some(end)) => {
                let start = encode_key(start)?;
                let end = encode_key(end)?;
                let common_prefix = common_prefix(&start, &end).to_vec();
                ResolvedRange {
                    start,
                    end,
                    common_prefix,
                }
            }
            _ => {
                return Err(KvError::type_error(
                    "Selector must specify either 'prefix' or both 'start' and 'end' key",
                ))
            }
        };
        limits.validate_read_key(&range.start)?;
        limits.validate_read_key(&range.end)?;
        Ok(range)
    }
}

fn with_suffix(prefix: &[u8], byte: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + 1);
    key.extend_from_slice(prefix);
    key.push(byte);
    key
}

fn within_prefix(key: Vec<u8>, prefix: &[u8], which: &str) -> KvResult<Vec<u8>> {
    if key.len() > prefix.len() && key.starts_with(prefix) {
        Ok(key)
    } else {
        Err(KvError::type_error(format!(
            "{} key is not in the keyspace defined by prefix",
            which
        )))
    }
}

fn common_prefix<'a>(a: &'a [u8], b: &[u8]) -> &'a [u8] {
    let len = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    &a[..len]
}

/// Byte bounds of a selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    /// Inclusive lower bound
    pub start: Vec<u8>,
    /// Exclusive upper bound
    pub end: Vec<u8>,
    /// Bytes shared by every key in the range; cursors are relative to it
    pub common_prefix: Vec<u8>,
}

impl ResolvedRange {
    /// Narrow the range to resume after the key named by `cursor`
    ///
    /// Forward scans resume just above the boundary key, reverse scans just
    /// below it. A cursor naming a key outside the range is a type error.
    pub fn resume_from(mut self, cursor: &str, reverse: bool) -> KvResult<Self> {
        let boundary = [self.common_prefix.as_slice(), &decode_cursor(cursor)?].concat();
        if boundary < self.start || boundary > self.end {
            return Err(KvError::type_error("Cursor is out of bounds for the selector"));
        }
        if reverse {
            self.end = boundary;
        } else {
            self.start = with_suffix(&boundary, 0x00);
        }
        Ok(self)
    }
}

/// Options of a list scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Descending key order
    pub reverse: bool,
    /// Maximum number of entries to yield
    pub limit: Option<usize>,
    /// Entries fetched per page (1..=1000)
    pub batch_size: Option<usize>,
    /// Resume after the key named by this cursor
    pub cursor: Option<String>,
}

impl ListOptions {
    /// Scan in descending order
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Yield at most `limit` entries
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Fetch `batch_size` entries per page
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Resume from a cursor returned by an earlier scan
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// Source of scan pages
///
/// Implemented by the store itself and by the database handle, which adds
/// its lifecycle check in front of every page.
pub trait PageSource {
    /// One page of live entries in `[start, end)`
    fn fetch_page(
        &self,
        start: &[u8],
        end: &[u8],
        reverse: bool,
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, StoredValue)>>;
}

impl PageSource for OrderedStore {
    fn fetch_page(
        &self,
        start: &[u8],
        end: &[u8],
        reverse: bool,
        limit: usize,
    ) -> KvResult<Vec<(Vec<u8>, StoredValue)>> {
        Ok(self.scan(start, end, reverse, limit))
    }
}

/// Lazy iterator over the entries of a list scan
pub struct ListIterator<'a> {
    source: &'a dyn PageSource,
    range: ResolvedRange,
    reverse: bool,
    remaining: Option<usize>,
    batch_size: usize,
    buffer: VecDeque<(Vec<u8>, StoredValue)>,
    exhausted: bool,
    started: bool,
    last_key: Option<Vec<u8>>,
}

impl std::fmt::Debug for ListIterator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListIterator")
            .field("range", &self.range)
            .field("reverse", &self.reverse)
            .field("remaining", &self.remaining)
            .field("batch_size", &self.batch_size)
            .field("buffer", &self.buffer)
            .field("exhausted", &self.exhausted)
            .field("started", &self.started)
            .field("last_key", &self.last_key)
            .finish_non_exhaustive()
    }
}

impl<'a> ListIterator<'a> {
    /// Validate `selector` and `options` and prepare a scan over `source`
    ///
    /// Nothing is read until the first call to `next()`.
    pub fn new(
        source: &'a dyn PageSource,
        selector: &ListSelector,
        options: ListOptions,
        limits: &Limits,
    ) -> KvResult<Self> {
        let batch_size = limits.resolve_batch_size(options.batch_size, options.limit)?;
        let mut range = selector.resolve(limits)?;
        if let Some(cursor) = &options.cursor {
            range = range.resume_from(cursor, options.reverse)?;
        }
        Ok(ListIterator {
            source,
            range,
            reverse: options.reverse,
            remaining: options.limit,
            batch_size,
            buffer: VecDeque::new(),
            exhausted: false,
            started: false,
            last_key: None,
        })
    }

    /// Token that resumes the scan just after the last yielded entry
    ///
    /// Fails before the first `next()`; empty if nothing was yielded.
    pub fn cursor(&self) -> KvResult<String> {
        if !self.started {
            return Err(KvError::type_error(
                "Cannot get cursor before first iteration",
            ));
        }
        match &self.last_key {
            None => Ok(String::new()),
            Some(key) => encode_cursor(&key[self.range.common_prefix.len()..]),
        }
    }

    /// Entries per page
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fill(&mut self) -> KvResult<()> {
        let want = match self.remaining {
            Some(remaining) => remaining.min(self.batch_size),
            None => self.batch_size,
        };
        let page = self
            .source
            .fetch_page(&self.range.start, &self.range.end, self.reverse, want)?;
        if page.len() < want {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            if self.reverse {
                self.range.end = last.clone();
            } else {
                self.range.start = with_suffix(last, 0x00);
            }
        }
        self.buffer.extend(page);
        Ok(())
    }

    fn to_entry(key: &[u8], stored: &StoredValue) -> KvResult<KvEntry> {
        Ok(KvEntry {
            key: decode_key(key)?,
            value: deserialize_value(stored.bytes())?,
            versionstamp: stored.versionstamp(),
        })
    }
}

impl<'a> Iterator for ListIterator<'a> {
    type Item = KvResult<KvEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.started = true;
        if self.remaining == Some(0) {
            return None;
        }
        if self.buffer.is_empty() {
            if self.exhausted {
                return None;
            }
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        let (key, stored) = self.buffer.pop_front()?;
        let entry = Self::to_entry(&key, &stored);
        self.last_key = Some(key);
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(entry)
    }
}
