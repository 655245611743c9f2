use std::borrow::Cow;
use std::fmt;

use anyhow::{Result, anyhow, bail};
use chardetng::EncodingDetector;
use encoding_rs::{EUC_KR, Encoding, GBK, SHIFT_JIS, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EditError;

const BINARY_CHECK_BYTES: usize = 8192;
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingSource {
    Override,
    Bom,
    Utf8,
    Detector,
    Candidate,
    Fallback,
    Default,
}

impl fmt::Display for EncodingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EncodingSource::Override => "override",
            EncodingSource::Bom => "bom",
            EncodingSource::Utf8 => "utf-8",
            EncodingSource::Detector => "detector",
            EncodingSource::Candidate => "candidate",
            EncodingSource::Fallback => "fallback",
            EncodingSource::Default => "default",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EncodingDecision {
    pub encoding: &'static Encoding,
    pub source: EncodingSource,
    pub bom: bool,
    /// Set when no strict decode succeeded and the text was decoded lossily.
    pub uncertain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewlineStyle {
    #[default]
    Lf,
    Crlf,
}

impl NewlineStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            NewlineStyle::Lf => "\n",
            NewlineStyle::Crlf => "\r\n",
        }
    }
}

/// Decoded file content plus everything needed to write it back byte-for-byte.
#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub lines: Vec<String>,
    pub newline: NewlineStyle,
    pub final_newline: bool,
    pub decision: EncodingDecision,
}

impl EncodedFile {
    pub fn text(&self) -> String {
        join_lines(&self.lines, self.newline, self.final_newline)
    }

    pub fn encode(&self) -> Result<Vec<u8>, EditError> {
        encode(&self.lines, self.newline, self.final_newline, &self.decision)
    }

    /// Same encoding and layout, different content.
    pub fn with_lines(&self, lines: Vec<String>) -> EncodedFile {
        EncodedFile {
            lines,
            newline: self.newline,
            final_newline: self.final_newline,
            decision: self.decision,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodingStrategy {
    override_encoding: Option<&'static Encoding>,
    override_label: Option<String>,
    candidates: Vec<&'static Encoding>,
    detector_hint: bool,
    default_newline: NewlineStyle,
}

impl Default for EncodingStrategy {
    fn default() -> Self {
        Self {
            override_encoding: None,
            override_label: None,
            candidates: vec![EUC_KR, SHIFT_JIS, GBK, WINDOWS_1252],
            detector_hint: true,
            default_newline: NewlineStyle::Lf,
        }
    }
}

impl EncodingStrategy {
    pub fn new(override_label: Option<&str>) -> Result<Self> {
        let mut strategy = Self::default();
        if let Some(label) = override_label {
            let trimmed = label.trim();
            let encoding = Encoding::for_label(trimmed.as_bytes())
                .ok_or_else(|| anyhow!("unknown encoding override '{trimmed}'"))?;
            strategy.override_encoding = Some(encoding);
            strategy.override_label = Some(trimmed.to_string());
        }
        Ok(strategy)
    }

    /// Replaces the legacy candidate list; order is priority order.
    pub fn with_candidates<S: AsRef<str>>(mut self, labels: &[S]) -> Result<Self> {
        let mut candidates = Vec::with_capacity(labels.len());
        for label in labels {
            let trimmed = label.as_ref().trim();
            let encoding = Encoding::for_label(trimmed.as_bytes())
                .ok_or_else(|| anyhow!("unknown candidate encoding '{trimmed}'"))?;
            if encoding == UTF_16LE || encoding == UTF_16BE {
                bail!("'{trimmed}' is only accepted through a byte-order mark");
            }
            if !candidates.contains(&encoding) {
                candidates.push(encoding);
            }
        }
        self.candidates = candidates;
        Ok(self)
    }

    pub fn with_detector_hint(mut self, enabled: bool) -> Self {
        self.detector_hint = enabled;
        self
    }

    pub fn with_default_newline(mut self, newline: NewlineStyle) -> Self {
        self.default_newline = newline;
        self
    }

    pub fn default_newline(&self) -> NewlineStyle {
        self.default_newline
    }

    pub fn describe(&self) -> String {
        if let (Some(label), Some(enc)) = (&self.override_label, self.override_encoding) {
            format!(
                "override '{}' ({}), auto-detect disabled",
                label,
                enc.name()
            )
        } else {
            let names: Vec<&str> = self.candidates.iter().map(|enc| enc.name()).collect();
            format!(
                "auto-detect (BOM → UTF-8 → {}{})",
                names.join(" → "),
                if self.detector_hint {
                    ", detector hint"
                } else {
                    ""
                }
            )
        }
    }

    /// Encoding used for files that do not exist yet.
    pub fn default_decision(&self) -> EncodingDecision {
        match self.override_encoding {
            Some(encoding) => EncodingDecision {
                encoding,
                source: EncodingSource::Override,
                bom: false,
                uncertain: false,
            },
            None => EncodingDecision {
                encoding: UTF_8,
                source: EncodingSource::Default,
                bom: false,
                uncertain: false,
            },
        }
    }

    pub fn detect_and_decode(&self, bytes: &[u8]) -> Result<EncodedFile, EditError> {
        let (text, decision) = self.decode_text(bytes)?;
        let (lines, newline, final_newline) = split_lines(&text, self.default_newline);
        Ok(EncodedFile {
            lines,
            newline,
            final_newline,
            decision,
        })
    }

    fn decode_text<'a>(&self, bytes: &'a [u8]) -> Result<(Cow<'a, str>, EncodingDecision), EditError> {
        if let Some(encoding) = self.override_encoding {
            let bom_len = bom_length_for(bytes, encoding);
            let body = &bytes[bom_len..];
            if !is_utf16(encoding) && looks_binary(body) {
                return Err(EditError::BinaryFileRejected);
            }
            return Ok(decode_with(encoding, body, EncodingSource::Override, bom_len > 0));
        }

        if let Some((encoding, bom_len)) = detect_bom(bytes) {
            let body = &bytes[bom_len..];
            if !is_utf16(encoding) && looks_binary(body) {
                return Err(EditError::BinaryFileRejected);
            }
            return Ok(decode_with(encoding, body, EncodingSource::Bom, true));
        }

        if looks_binary(bytes) {
            return Err(EditError::BinaryFileRejected);
        }

        if let Ok(text) = std::str::from_utf8(bytes) {
            return Ok((
                Cow::Borrowed(text),
                EncodingDecision {
                    encoding: UTF_8,
                    source: EncodingSource::Utf8,
                    bom: false,
                    uncertain: false,
                },
            ));
        }

        for (encoding, source) in self.legacy_order(bytes) {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
                if !reproduces(encoding, &text, bytes) {
                    debug!(encoding = encoding.name(), %source, "decode does not re-encode to the same bytes");
                    continue;
                }
                debug!(encoding = encoding.name(), %source, "decoded legacy text");
                return Ok((
                    text,
                    EncodingDecision {
                        encoding,
                        source,
                        bom: false,
                        uncertain: false,
                    },
                ));
            }
        }

        let fallback = self.candidates.first().copied().unwrap_or(WINDOWS_1252);
        let (text, _) = fallback.decode_without_bom_handling(bytes);
        Ok((
            text,
            EncodingDecision {
                encoding: fallback,
                source: EncodingSource::Fallback,
                bom: false,
                uncertain: true,
            },
        ))
    }

    fn legacy_order(&self, bytes: &[u8]) -> Vec<(&'static Encoding, EncodingSource)> {
        let mut order: Vec<(&'static Encoding, EncodingSource)> = Vec::new();
        if self.detector_hint {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            let guess = detector.guess(None, true);
            if self.candidates.contains(&guess) {
                order.push((guess, EncodingSource::Detector));
            }
        }
        for &encoding in &self.candidates {
            if !order.iter().any(|(seen, _)| *seen == encoding) {
                order.push((encoding, EncodingSource::Candidate));
            }
        }
        order
    }
}

fn decode_with<'a>(
    encoding: &'static Encoding,
    body: &'a [u8],
    source: EncodingSource,
    bom: bool,
) -> (Cow<'a, str>, EncodingDecision) {
    match encoding.decode_without_bom_handling_and_without_replacement(body) {
        Some(text) => {
            let uncertain = !reproduces(encoding, &text, body);
            (
                text,
                EncodingDecision {
                    encoding,
                    source,
                    bom,
                    uncertain,
                },
            )
        }
        None => {
            let (text, _) = encoding.decode_without_bom_handling(body);
            (
                text,
                EncodingDecision {
                    encoding,
                    source,
                    bom,
                    uncertain: true,
                },
            )
        }
    }
}

pub fn encode(
    lines: &[String],
    newline: NewlineStyle,
    final_newline: bool,
    decision: &EncodingDecision,
) -> Result<Vec<u8>, EditError> {
    let text = join_lines(lines, newline, final_newline);
    let encoding = decision.encoding;

    if is_utf16(encoding) {
        let little = encoding == UTF_16LE;
        let mut out = Vec::with_capacity(text.len() * 2 + 2);
        if decision.bom {
            out.extend_from_slice(if little { &[0xFF, 0xFE] } else { &[0xFE, 0xFF] });
        }
        for unit in text.encode_utf16() {
            let pair = if little {
                unit.to_le_bytes()
            } else {
                unit.to_be_bytes()
            };
            out.extend_from_slice(&pair);
        }
        return Ok(out);
    }

    if encoding == UTF_8 {
        let mut out = Vec::with_capacity(text.len() + UTF8_BOM.len());
        if decision.bom {
            out.extend_from_slice(&UTF8_BOM);
        }
        out.extend_from_slice(text.as_bytes());
        return Ok(out);
    }

    let (encoded, _, unmappable) = encoding.encode(&text);
    if unmappable {
        return Err(EditError::Unrepresentable {
            encoding: encoding.name(),
        });
    }
    Ok(encoded.into_owned())
}

pub fn join_lines(lines: &[String], newline: NewlineStyle, final_newline: bool) -> String {
    let separator = newline.as_str();
    let mut text = lines.join(separator);
    if final_newline && !lines.is_empty() {
        text.push_str(separator);
    }
    text
}

fn split_lines(text: &str, default: NewlineStyle) -> (Vec<String>, NewlineStyle, bool) {
    let newline = match text.find('\n') {
        Some(idx) if idx > 0 && text.as_bytes()[idx - 1] == b'\r' => NewlineStyle::Crlf,
        Some(_) => NewlineStyle::Lf,
        None => default,
    };
    if text.is_empty() {
        return (Vec::new(), newline, false);
    }

    let final_newline = text.ends_with('\n');
    let body = if final_newline {
        &text[..text.len() - 1]
    } else {
        text
    };
    let pieces: Vec<&str> = body.split('\n').collect();
    let last = pieces.len() - 1;
    let lines = pieces
        .into_iter()
        .enumerate()
        .map(|(idx, piece)| {
            // an unterminated last line keeps a stray '\r'
            let terminated = idx < last || final_newline;
            match newline {
                NewlineStyle::Crlf if terminated => {
                    piece.strip_suffix('\r').unwrap_or(piece).to_string()
                }
                _ => piece.to_string(),
            }
        })
        .collect();
    (lines, newline, final_newline)
}

fn detect_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    if bytes.starts_with(&UTF8_BOM) {
        return Some((UTF_8, 3));
    }
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some((UTF_16LE, 2));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some((UTF_16BE, 2));
    }

    None
}

fn bom_length_for(bytes: &[u8], encoding: &'static Encoding) -> usize {
    match detect_bom(bytes) {
        Some((found, len)) if found == encoding => len,
        _ => 0,
    }
}

/// Whether encoding `text` gives back exactly `bytes`. Several legacy
/// encodings decode duplicate code points that encode back differently.
fn reproduces(encoding: &'static Encoding, text: &str, bytes: &[u8]) -> bool {
    if encoding == UTF_8 || is_utf16(encoding) {
        return true;
    }
    let (encoded, _, unmappable) = encoding.encode(text);
    !unmappable && encoded.as_ref() == bytes
}

fn is_utf16(encoding: &'static Encoding) -> bool {
    encoding == UTF_16LE || encoding == UTF_16BE
}

pub fn looks_binary(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(BINARY_CHECK_BYTES)];
    sample.contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(strategy: &EncodingStrategy, bytes: &[u8]) -> EncodedFile {
        let decoded = strategy.detect_and_decode(bytes).expect("decodes");
        let encoded = decoded.encode().expect("encodes");
        assert_eq!(encoded, bytes, "round trip changed bytes");
        decoded
    }

    #[test]
    fn override_validation() {
        let strategy = EncodingStrategy::new(Some("utf-16le")).expect("valid encoding");
        assert_eq!(strategy.override_label.as_deref(), Some("utf-16le"));
        assert!(EncodingStrategy::new(Some("klingon")).is_err());
    }

    #[test]
    fn utf8_detection_without_bom() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let decoded = round_trip(&strategy, b"hello\nworld\n");
        assert_eq!(decoded.decision.source, EncodingSource::Utf8);
        assert_eq!(decoded.decision.encoding.name(), "UTF-8");
        assert_eq!(decoded.lines, vec!["hello", "world"]);
        assert!(decoded.final_newline);
    }

    #[test]
    fn bom_detection_takes_precedence() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let data = [0xFF, 0xFE, 0x61, 0x00, 0x0A, 0x00];
        let decoded = round_trip(&strategy, &data);
        assert_eq!(decoded.decision.source, EncodingSource::Bom);
        assert_eq!(decoded.decision.encoding.name(), "UTF-16LE");
        assert_eq!(decoded.lines, vec!["a"]);
    }

    #[test]
    fn utf8_bom_written_once() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"one\r\ntwo\r\n");
        let decoded = round_trip(&strategy, &data);
        assert!(decoded.decision.bom);
        assert_eq!(decoded.newline, NewlineStyle::Crlf);
        assert_eq!(decoded.lines, vec!["one", "two"]);
    }

    #[test]
    fn utf16be_round_trip() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let mut data = vec![0xFE, 0xFF];
        for unit in "x\r\ny".encode_utf16() {
            data.extend_from_slice(&unit.to_be_bytes());
        }
        let decoded = round_trip(&strategy, &data);
        assert_eq!(decoded.newline, NewlineStyle::Crlf);
        assert!(!decoded.final_newline);
    }

    #[test]
    fn legacy_candidates_in_priority_order() {
        let strategy = EncodingStrategy::new(None)
            .unwrap()
            .with_detector_hint(false);
        // "한글\n" in EUC-KR
        let data = [0xC7, 0xD1, 0xB1, 0xDB, 0x0A];
        let decoded = round_trip(&strategy, &data);
        assert_eq!(decoded.decision.encoding.name(), "EUC-KR");
        assert_eq!(decoded.decision.source, EncodingSource::Candidate);
        assert_eq!(decoded.lines, vec!["한글"]);
    }

    #[test]
    fn windows_1252_round_trip() {
        let strategy = EncodingStrategy::new(None)
            .unwrap()
            .with_candidates(&["windows-1252"])
            .unwrap();
        let decoded = round_trip(&strategy, b"caf\xE9\r\n");
        assert_eq!(decoded.lines, vec!["café"]);
    }

    #[test]
    fn shift_jis_and_gbk_round_trip() {
        let sjis = EncodingStrategy::new(None)
            .unwrap()
            .with_candidates(&["shift_jis"])
            .unwrap();
        // "日本\n"
        let decoded = round_trip(&sjis, &[0x93, 0xFA, 0x96, 0x7B, 0x0A]);
        assert_eq!(decoded.decision.encoding.name(), "Shift_JIS");
        assert_eq!(decoded.lines, vec!["日本"]);

        let gbk = EncodingStrategy::new(None)
            .unwrap()
            .with_candidates(&["gbk"])
            .unwrap();
        // "中文\n"
        let decoded = round_trip(&gbk, &[0xD6, 0xD0, 0xCE, 0xC4, 0x0A]);
        assert_eq!(decoded.decision.encoding.name(), "GBK");
        assert_eq!(decoded.lines, vec!["中文"]);
    }

    #[test]
    fn decodes_that_re_encode_differently_are_not_trusted() {
        // NEC-selected IBM extension in Shift_JIS; re-encodes as FA 5C
        let data = [0xED, 0x40, 0x0A];

        let defaults = EncodingStrategy::default().with_detector_hint(false);
        let decoded = round_trip(&defaults, &data);
        assert_ne!(decoded.decision.encoding, SHIFT_JIS);
        assert!(!decoded.decision.uncertain);

        let only_sjis = EncodingStrategy::new(None)
            .unwrap()
            .with_candidates(&["shift_jis"])
            .unwrap();
        let decoded = only_sjis.detect_and_decode(&data).unwrap();
        assert!(decoded.decision.uncertain);
        assert_eq!(decoded.decision.source, EncodingSource::Fallback);

        let forced = EncodingStrategy::new(Some("shift_jis")).unwrap();
        let decoded = forced.detect_and_decode(&data).unwrap();
        assert!(decoded.decision.uncertain);
    }

    #[test]
    fn lossy_fallback_is_uncertain() {
        let strategy = EncodingStrategy::new(None)
            .unwrap()
            .with_candidates(&["euc-kr"])
            .unwrap();
        let decoded = strategy.detect_and_decode(&[0x61, 0xFF, 0xFF]).unwrap();
        assert!(decoded.decision.uncertain);
        assert_eq!(decoded.decision.source, EncodingSource::Fallback);
    }

    #[test]
    fn nul_bytes_are_binary() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let err = strategy.detect_and_decode(b"PK\x03\x04\x00\x00").unwrap_err();
        assert_eq!(err.kind(), "binary_file_rejected");
    }

    #[test]
    fn unrepresentable_characters_fail() {
        let strategy = EncodingStrategy::new(None)
            .unwrap()
            .with_candidates(&["windows-1252"])
            .unwrap();
        let decoded = strategy.detect_and_decode(b"caf\xE9").unwrap();
        let edited = decoded.with_lines(vec!["日本".to_string()]);
        let err = edited.encode().unwrap_err();
        assert_eq!(err.kind(), "unrepresentable");
    }

    #[test]
    fn missing_final_newline_preserved() {
        let strategy = EncodingStrategy::new(None).unwrap();
        let decoded = round_trip(&strategy, b"a\nb");
        assert!(!decoded.final_newline);
        assert_eq!(decoded.lines, vec!["a", "b"]);
        round_trip(&strategy, b"");
        round_trip(&strategy, b"\n");
    }
}
