//! 🗓️ Date formats for index patterns: `{ts:YYYY-MM-dd}` and friends.
//!
//! Patterns use the Joda/Java letter vocabulary because that is what people type
//! into index patterns. We translate once into a chrono format string and reuse it.
//! `YYYY` means calendar year here (Joda semantics), not week-based year. If you
//! wanted week years in your index names, we have questions.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::common::Value;

/// 🗓️ A compiled date pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    source: String,
    pieces: Vec<Piece>,
}

/// 🧩 chrono has no 1- or 2-digit fraction, so `S` runs are cut from nanoseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Chrono(String),
    Fraction(usize),
}

impl DateFormat {
    /// 🔧 Translate a Joda-style pattern into a chrono format string.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            bail!("💀 Empty date format. `{{field:}}` formats nothing, beautifully.");
        }
        let chars: Vec<char> = pattern.chars().collect();
        let mut pieces = Vec::new();
        let mut out = String::with_capacity(pattern.len() * 2);
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                // 📜 quoted literal, '' is an escaped quote
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '\'' {
                    out.push('\'');
                    i += 2;
                    continue;
                }
                let mut closed = false;
                while j < chars.len() {
                    if chars[j] == '\'' {
                        if j + 1 < chars.len() && chars[j + 1] == '\'' {
                            out.push('\'');
                            j += 2;
                            continue;
                        }
                        closed = true;
                        break;
                    }
                    push_literal(&mut out, chars[j]);
                    j += 1;
                }
                if !closed {
                    bail!("💀 Unterminated quote in date format '{}'", pattern);
                }
                i = j + 1;
                continue;
            }
            if !c.is_ascii_alphabetic() {
                push_literal(&mut out, c);
                i += 1;
                continue;
            }
            let mut run = 1;
            while i + run < chars.len() && chars[i + run] == c {
                run += 1;
            }
            if c == 'S' {
                if !out.is_empty() {
                    pieces.push(Piece::Chrono(std::mem::take(&mut out)));
                }
                pieces.push(Piece::Fraction(run.min(9)));
                i += run;
                continue;
            }
            let spec = match (c, run) {
                ('y' | 'Y' | 'u', 2) => "%y",
                ('y' | 'Y' | 'u', _) => "%Y",
                ('M', 1) => "%-m",
                ('M', 2) => "%m",
                ('M', 3) => "%b",
                ('M', _) => "%B",
                ('d', 1) => "%-d",
                ('d', _) => "%d",
                ('D', _) => "%j",
                ('H', 1) => "%-H",
                ('H', _) => "%H",
                ('h', 1) => "%-I",
                ('h', _) => "%I",
                ('m', 1) => "%-M",
                ('m', _) => "%M",
                ('s', 1) => "%-S",
                ('s', _) => "%S",
                ('a', _) => "%p",
                ('E', 1..=3) => "%a",
                ('E', _) => "%A",
                ('Z', 1) => "%z",
                ('Z', _) => "%:z",
                ('w', _) => "%V",
                _ => bail!(
                    "💀 Date format '{}' uses '{}' which we don't speak. Supported: y Y u M d D H h m s S a E Z w and 'quoted literals'.",
                    pattern,
                    c
                ),
            };
            out.push_str(spec);
            i += run;
        }
        if !out.is_empty() {
            pieces.push(Piece::Chrono(out));
        }
        Ok(Self {
            source: pattern.to_string(),
            pieces,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 🖨️ Format a field value. Strings are parsed as dates; longs are epoch millis.
    pub fn format_value(&self, value: &Value) -> Result<String> {
        let when = parse_date_value(value)?;
        let mut text = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Chrono(format) => text.push_str(&when.format(format).to_string()),
                Piece::Fraction(digits) => {
                    let nanos = when.format("%9f").to_string();
                    text.extend(nanos.chars().take(*digits));
                }
            }
        }
        Ok(text)
    }
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// 🔍 Turn a tuple value into a UTC timestamp.
///
/// Accepts RFC 3339 (`2012-10-06T19:20:25.000Z`), local ISO date-time
/// (`2012-10-06T19:20:25.000`, taken as UTC), plain dates, and epoch millis.
pub fn parse_date_value(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::Long(millis) => from_millis(*millis),
        Value::String(text) => parse_date_text(text.trim()),
        Value::Null => bail!("💀 Cannot format a null value as a date"),
        other => bail!("💀 Cannot format {:?} as a date", other),
    }
}

fn parse_date_text(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, layout) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .context("💀 Midnight stopped existing")?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        let millis: i64 = text
            .parse()
            .with_context(|| format!("💀 '{}' looks like epoch millis but doesn't fit in an i64", text))?;
        return from_millis(millis);
    }
    bail!(
        "💀 '{}' is not a date we recognise (RFC 3339, ISO date-time, yyyy-MM-dd or epoch millis)",
        text
    )
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .with_context(|| format!("💀 {} epoch millis is outside the calendar", millis))
}
