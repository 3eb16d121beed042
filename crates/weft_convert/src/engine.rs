//! The conversion engine.
//!
//! [`Converter`] resolves a requested conversion into single-hop steps
//! and executes them against a [`BufferCache`]. It prefers metadata:
//! conversion memos and celltype proofs carried by a buffer's
//! [`BufferInfo`] decide many hops without fetching the buffer at all.

use std::str::FromStr;

use tracing::debug;
use weft_cache::{BufferCache, BufferInfo, CacheError};
use weft_common::{Buffer, CellType, Checksum};

use crate::error::ConversionError;
use crate::table::{classify, expand_conversion, ConversionKind};
use crate::value::{self, StepOutcome};

/// Running totals over a converter's lifetime, kept for diagnostics and
/// for asserting that memoization actually short-circuits work.
#[derive(Clone, Copy, Default, Debug)]
pub struct ConversionCounters {
    /// Single-hop conversions that decoded or transformed buffer content.
    pub conversions_executed: u64,
    /// Buffers fetched from the cache (local or remote) to decide a hop.
    pub buffer_fetches: u64,
    /// Hops decided by a conversion memo without touching the buffer.
    pub memo_hits: u64,
}

/// Outcome of a metadata-only conversion probe.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TryConvertResult {
    /// The checksum is already valid for the target celltype.
    Same,
    /// A memoized result exists for this conversion.
    Converted(Checksum),
    /// Known metadata cannot decide the conversion; buffer content is
    /// needed.
    Undecidable,
    /// Known metadata rules the conversion out.
    Impossible,
}

/// Executes celltype conversions against a buffer cache.
#[derive(Default, Debug)]
pub struct Converter {
    counters: ConversionCounters,
}

impl Converter {
    /// Creates a converter with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulated counters.
    pub fn counters(&self) -> ConversionCounters {
        self.counters
    }

    /// Probes a conversion using only cached metadata. Never fetches a
    /// buffer and never mutates the cache beyond a metadata lookup.
    pub fn try_convert(
        &mut self,
        cache: &mut BufferCache,
        checksum: Checksum,
        from: CellType,
        to: CellType,
    ) -> TryConvertResult {
        if from == to {
            return TryConvertResult::Same;
        }
        match classify(from, to) {
            ConversionKind::Trivial => return TryConvertResult::Same,
            ConversionKind::Forbidden => return TryConvertResult::Impossible,
            _ => {}
        }
        let Some(info) = cache.buffer_info(checksum) else {
            return TryConvertResult::Undecidable;
        };
        if let Some(memo) = info.conversion_memo(from, to) {
            self.counters.memo_hits += 1;
            return TryConvertResult::Converted(memo);
        }
        if !info.admits(to) {
            return TryConvertResult::Impossible;
        }
        if matches!(classify(from, to), ConversionKind::Reinterpret) && info.proves(to) {
            return TryConvertResult::Same;
        }
        TryConvertResult::Undecidable
    }

    /// Converts a checksum from one celltype to another, returning the
    /// checksum of the converted buffer (which is the input checksum
    /// whenever the conversion preserves it).
    ///
    /// The buffer for an executed hop is fetched through the cache; a
    /// miss surfaces as [`ConversionError::BufferUnavailable`] so the
    /// caller can recover the buffer and retry.
    pub fn convert(
        &mut self,
        cache: &mut BufferCache,
        checksum: Checksum,
        from: CellType,
        to: CellType,
    ) -> Result<Checksum, ConversionError> {
        if from == to {
            return Ok(checksum);
        }
        let steps = expand_conversion(from, to)?;
        debug!(%checksum, %from, %to, hops = steps.len(), "converting");
        let mut cur = checksum;
        for (f, t) in steps {
            cur = self.convert_step(cache, cur, f, t, (from, to))?;
        }
        Ok(cur)
    }

    fn convert_step(
        &mut self,
        cache: &mut BufferCache,
        cur: Checksum,
        f: CellType,
        t: CellType,
        requested: (CellType, CellType),
    ) -> Result<Checksum, ConversionError> {
        match classify(f, t) {
            ConversionKind::Trivial => Ok(cur),
            ConversionKind::Forbidden => Err(ConversionError::Forbidden {
                from: requested.0,
                to: requested.1,
            }),
            ConversionKind::Reinterpret => {
                if let Some(info) = cache.buffer_info(cur) {
                    if info.proves(t) {
                        return Ok(cur);
                    }
                    if !info.admits(t) {
                        return Err(ConversionError::Content {
                            checksum: cur,
                            from: f,
                            to: t,
                            reason: format!("buffer facts rule out {t}"),
                        });
                    }
                }
                let buf = self.fetch(cache, cur)?;
                value::reinterpret(&buf, f, t).map_err(|reason| ConversionError::Content {
                    checksum: cur,
                    from: f,
                    to: t,
                    reason,
                })?;
                self.counters.conversions_executed += 1;
                self.record_facts(cache, cur, &buf)?;
                Ok(cur)
            }
            ConversionKind::Reformat => {
                if let Some(memo) = self.memo(cache, cur, f, t) {
                    return Ok(memo);
                }
                let buf = self.fetch(cache, cur)?;
                let outcome =
                    value::reformat(&buf, f, t).map_err(|reason| ConversionError::Content {
                        checksum: cur,
                        from: f,
                        to: t,
                        reason,
                    })?;
                self.counters.conversions_executed += 1;
                self.finish_step(cache, cur, f, t, outcome)
            }
            ConversionKind::Possible => {
                let buf = self.fetch(cache, cur)?;
                let outcome =
                    value::possible(&buf, f, t).map_err(|reason| ConversionError::Content {
                        checksum: cur,
                        from: f,
                        to: t,
                        reason,
                    })?;
                self.counters.conversions_executed += 1;
                self.finish_step(cache, cur, f, t, outcome)
            }
            ConversionKind::Values => self.convert_values(cache, cur, f, t),
            ConversionKind::Equivalent(..) | ConversionKind::Chain(..) => {
                unreachable!("indirect kinds are resolved before execution")
            }
        }
    }

    fn convert_values(
        &mut self,
        cache: &mut BufferCache,
        cur: Checksum,
        f: CellType,
        t: CellType,
    ) -> Result<Checksum, ConversionError> {
        match (f, t) {
            (_, CellType::Checksum) => {
                // a checksum cell holds a reference: the hex rendering of
                // the source checksum
                let buf = Buffer::from_text(&cur.hex());
                let new = buf.checksum();
                self.counters.conversions_executed += 1;
                self.store(cache, new, buf, cur, f, t)?;
                Ok(new)
            }
            (CellType::Checksum, _) => {
                let buf = self.fetch(cache, cur)?;
                let text = std::str::from_utf8(&buf).map_err(|_| ConversionError::Content {
                    checksum: cur,
                    from: f,
                    to: t,
                    reason: "checksum buffer is not UTF-8".to_string(),
                })?;
                let referent =
                    Checksum::from_str(text.trim()).map_err(|e| ConversionError::Content {
                        checksum: cur,
                        from: f,
                        to: t,
                        reason: format!("checksum buffer does not hold a digest: {e}"),
                    })?;
                if let Some(info) = cache.buffer_info(referent) {
                    if !info.admits(t) {
                        return Err(ConversionError::Content {
                            checksum: cur,
                            from: f,
                            to: t,
                            reason: format!("referenced buffer facts rule out {t}"),
                        });
                    }
                }
                self.counters.conversions_executed += 1;
                Ok(referent)
            }
            (CellType::Plain, CellType::Binary) | (CellType::Binary, CellType::Plain) => {
                if let Some(memo) = self.memo(cache, cur, f, t) {
                    return Ok(memo);
                }
                let buf = self.fetch(cache, cur)?;
                let result = if f == CellType::Plain {
                    value::plain_to_binary(&buf)
                } else {
                    value::binary_to_plain(&buf)
                };
                let out = result.map_err(|reason| ConversionError::Content {
                    checksum: cur,
                    from: f,
                    to: t,
                    reason,
                })?;
                self.counters.conversions_executed += 1;
                self.finish_step(cache, cur, f, t, StepOutcome::New(out))
            }
            _ => unreachable!("({f}, {t}) is not a value-level conversion"),
        }
    }

    fn memo(
        &mut self,
        cache: &mut BufferCache,
        checksum: Checksum,
        f: CellType,
        t: CellType,
    ) -> Option<Checksum> {
        let memo = cache.buffer_info(checksum)?.conversion_memo(f, t)?;
        // a memo for an evicted result is useless; reconvert instead
        if !cache.is_resident(memo) && !cache.remote().has_buffer(memo) {
            return None;
        }
        self.counters.memo_hits += 1;
        Some(memo)
    }

    fn fetch(
        &mut self,
        cache: &mut BufferCache,
        checksum: Checksum,
    ) -> Result<Buffer, ConversionError> {
        self.counters.buffer_fetches += 1;
        cache
            .get_buffer(checksum)
            .map_err(|source| ConversionError::BufferUnavailable { checksum, source })
    }

    fn finish_step(
        &mut self,
        cache: &mut BufferCache,
        cur: Checksum,
        f: CellType,
        t: CellType,
        outcome: StepOutcome,
    ) -> Result<Checksum, ConversionError> {
        match outcome {
            StepOutcome::Same => {
                let mut memo = BufferInfo::default();
                memo.set_conversion_memo(f, t, cur);
                self.push_info(cache, cur, &memo, f, t)?;
                Ok(cur)
            }
            StepOutcome::New(bytes) => {
                let buf = Buffer::new(bytes);
                let new = buf.checksum();
                self.store(cache, new, buf, cur, f, t)?;
                Ok(new)
            }
        }
    }

    fn store(
        &mut self,
        cache: &mut BufferCache,
        new: Checksum,
        buf: Buffer,
        cur: Checksum,
        f: CellType,
        t: CellType,
    ) -> Result<(), ConversionError> {
        let classified = BufferInfo::classify(&buf);
        cache
            .cache_buffer(new, buf)
            .map_err(|e| internal(cur, f, t, e))?;
        self.push_info(cache, new, &classified, f, t)?;
        // forward memo on the source, reverse memo on the result, in the
        // pairs that carry a slot
        let mut forward = BufferInfo::default();
        forward.set_conversion_memo(f, t, new);
        self.push_info(cache, cur, &forward, f, t)?;
        let mut reverse = BufferInfo::default();
        reverse.set_conversion_memo(t, f, cur);
        self.push_info(cache, new, &reverse, f, t)?;
        Ok(())
    }

    fn record_facts(
        &mut self,
        cache: &mut BufferCache,
        checksum: Checksum,
        buf: &Buffer,
    ) -> Result<(), ConversionError> {
        let classified = BufferInfo::classify(buf);
        cache
            .update_buffer_info(checksum, &classified)
            .map_err(|e| internal(checksum, CellType::Bytes, CellType::Bytes, e))
    }

    fn push_info(
        &mut self,
        cache: &mut BufferCache,
        checksum: Checksum,
        info: &BufferInfo,
        f: CellType,
        t: CellType,
    ) -> Result<(), ConversionError> {
        cache
            .update_buffer_info(checksum, info)
            .map_err(|e| internal(checksum, f, t, e))
    }
}

fn internal(
    checksum: Checksum,
    f: CellType,
    t: CellType,
    err: weft_common::InternalError,
) -> ConversionError {
    ConversionError::Content {
        checksum,
        from: f,
        to: t,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_cache::NoRemote;
    use weft_common::CellType::{Binary, Bool, Bytes, Code, Plain, Str, Text};

    fn cache() -> BufferCache {
        BufferCache::new(Box::new(NoRemote))
    }

    fn seed(cache: &mut BufferCache, bytes: &[u8]) -> Checksum {
        let buf = Buffer::new(bytes.to_vec());
        let cs = buf.checksum();
        cache.incref_buffer(cs, buf).unwrap();
        cs
    }

    #[test]
    fn identity_is_a_no_op() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"[1,2]");
        assert_eq!(conv.convert(&mut cache, cs, Plain, Plain).unwrap(), cs);
        assert_eq!(conv.counters().buffer_fetches, 0);
    }

    #[test]
    fn trivial_hop_preserves_checksum_without_fetch() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"[1,2]");
        assert_eq!(conv.convert(&mut cache, cs, Plain, Bytes).unwrap(), cs);
        assert_eq!(conv.counters().buffer_fetches, 0);
        assert_eq!(conv.counters().conversions_executed, 0);
    }

    #[test]
    fn forbidden_reports_requested_pair() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"def f(): pass");
        let err = conv.convert(&mut cache, cs, Code, Bool).unwrap_err();
        match err {
            ConversionError::Forbidden { from, to } => {
                assert_eq!((from, to), (Code, Bool));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_to_str_produces_quoted_buffer() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"hello");
        let out = conv.convert(&mut cache, cs, Text, Str).unwrap();
        assert_ne!(out, cs);
        assert_eq!(cache.get_buffer(out).unwrap().as_bytes(), b"\"hello\"");
    }

    #[test]
    fn repeated_conversion_hits_the_memo() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"[1,2,3]");
        let first = conv.convert(&mut cache, cs, Plain, Binary).unwrap();
        assert_eq!(conv.counters().conversions_executed, 1);
        let second = conv.convert(&mut cache, cs, Plain, Binary).unwrap();
        assert_eq!(first, second);
        assert_eq!(conv.counters().conversions_executed, 1);
        assert_eq!(conv.counters().memo_hits, 1);
        // the reverse direction is memoized on the result buffer
        assert_eq!(conv.convert(&mut cache, first, Binary, Plain).unwrap(), cs);
        assert_eq!(conv.counters().conversions_executed, 1);
    }

    #[test]
    fn object_has_no_binary_form() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"{\"a\":1}");
        let err = conv.convert(&mut cache, cs, Plain, Binary).unwrap_err();
        assert!(matches!(err, ConversionError::Content { .. }));
    }

    #[test]
    fn chain_binary_to_str_decodes_raw_bytes() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let encoded = weft_common::ArrayBuf::from_raw_bytes(b"payload").unwrap().encode();
        let cs = seed(&mut cache, &encoded);
        let out = conv.convert(&mut cache, cs, Binary, Str).unwrap();
        assert_eq!(cache.get_buffer(out).unwrap().as_bytes(), b"\"payload\"");
    }

    #[test]
    fn checksum_celltype_references_and_dereferences() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"[1,2]");
        let reference = conv
            .convert(&mut cache, cs, Plain, CellType::Checksum)
            .unwrap();
        let rendered = cache.get_buffer(reference).unwrap();
        assert_eq!(rendered.as_bytes(), cs.hex().as_bytes());
        let back = conv
            .convert(&mut cache, reference, CellType::Checksum, Plain)
            .unwrap();
        assert_eq!(back, cs);
    }

    #[test]
    fn missing_buffer_surfaces_unavailable() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = Buffer::from_text("never cached").checksum();
        let err = conv.convert(&mut cache, cs, Text, Str).unwrap_err();
        assert!(matches!(err, ConversionError::BufferUnavailable { .. }));
    }

    #[test]
    fn try_convert_decides_from_metadata() {
        let mut cache = cache();
        let mut conv = Converter::new();
        let cs = seed(&mut cache, b"[1,2]");
        cache
            .update_buffer_info(cs, &BufferInfo::classify(b"[1,2]"))
            .unwrap();
        assert_eq!(
            conv.try_convert(&mut cache, cs, Bytes, Plain),
            TryConvertResult::Same
        );
        assert_eq!(
            conv.try_convert(&mut cache, cs, Plain, Str),
            TryConvertResult::Impossible
        );
        assert_eq!(
            conv.try_convert(&mut cache, cs, Code, Bool),
            TryConvertResult::Impossible
        );
    }
}
