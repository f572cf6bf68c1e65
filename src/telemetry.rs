//! Telemetry codec.
//!
//! The simulator packs one report into a single dash-delimited string:
//!
//! ```text
//! X-<int>-Y-<int>-BAT-<dec>-GYR-[<dec>,<dec>,<dec>]-WIND-<dec>-DUST-<dec>-SENS-<word>
//! ```
//!
//! The dash is both the field separator and the minus sign, so fields are
//! read positionally by a small scanner: every literal is matched exactly and
//! every number is consumed greedily up to the next literal. Parsing is
//! all-or-nothing; the first mismatch rejects the whole frame.

use std::fmt;

use crate::types::{Sensor, TelemetryRecord};

/// Telemetry did not match the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryParseError {
    /// Grammar segment being read when the mismatch was found.
    pub segment: &'static str,
    /// Byte offset into the (trimmed) input.
    pub offset: usize,
    pub expected: &'static str,
}

impl fmt::Display for TelemetryParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed telemetry: expected {} in segment {} at byte {}",
            self.expected, self.segment, self.offset
        )
    }
}

impl std::error::Error for TelemetryParseError {}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        let input = self.input;
        &input[self.pos..]
    }

    fn fail(&self, segment: &'static str, expected: &'static str) -> TelemetryParseError {
        TelemetryParseError {
            segment,
            offset: self.pos,
            expected,
        }
    }

    fn literal(
        &mut self,
        lit: &'static str,
        segment: &'static str,
    ) -> Result<(), TelemetryParseError> {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(self.fail(segment, lit))
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> usize {
        let bytes = self.rest().as_bytes();
        let n = bytes.iter().take_while(|b| pred(**b)).count();
        self.pos += n;
        n
    }

    fn sign(&mut self) {
        if matches!(self.rest().as_bytes().first(), Some(b'+' | b'-')) {
            self.pos += 1;
        }
    }

    fn integer(&mut self, segment: &'static str) -> Result<i64, TelemetryParseError> {
        let start = self.pos;
        self.sign();
        if self.take_while(|b| b.is_ascii_digit()) == 0 {
            self.pos = start;
            return Err(self.fail(segment, "integer"));
        }
        let input = self.input;
        match input[start..self.pos].parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) => {
                self.pos = start;
                Err(self.fail(segment, "integer in range"))
            }
        }
    }

    /// `[+-]? digits* ('.' digits+)?` with at least one digit overall.
    fn decimal(&mut self, segment: &'static str) -> Result<f64, TelemetryParseError> {
        let start = self.pos;
        self.sign();
        let int_digits = self.take_while(|b| b.is_ascii_digit());
        let mut frac_digits = 0;
        if self.rest().starts_with('.') {
            self.pos += 1;
            frac_digits = self.take_while(|b| b.is_ascii_digit());
            if frac_digits == 0 {
                self.pos = start;
                return Err(self.fail(segment, "digits after decimal point"));
            }
        }
        if int_digits + frac_digits == 0 {
            self.pos = start;
            return Err(self.fail(segment, "decimal"));
        }
        let input = self.input;
        match input[start..self.pos].parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            Ok(_) => {
                self.pos = start;
                Err(self.fail(segment, "finite decimal"))
            }
            Err(_) => {
                self.pos = start;
                Err(self.fail(segment, "decimal"))
            }
        }
    }

    fn word(&mut self, segment: &'static str) -> Result<&'a str, TelemetryParseError> {
        let start = self.pos;
        if self.take_while(|b| b.is_ascii_alphanumeric()) == 0 {
            return Err(self.fail(segment, "alphanumeric word"));
        }
        let input = self.input;
        Ok(&input[start..self.pos])
    }

    fn end(&self) -> Result<(), TelemetryParseError> {
        if self.pos == self.input.len() {
            Ok(())
        } else {
            Err(self.fail("SENS", "end of telemetry"))
        }
    }
}

/// Parse one telemetry string. Surrounding whitespace is ignored; anything
/// else outside the grammar is rejected.
pub fn parse_telemetry(raw: &str) -> Result<TelemetryRecord, TelemetryParseError> {
    let mut s = Scanner::new(raw.trim());

    s.literal("X-", "X")?;
    let x = s.integer("X")?;
    s.literal("-Y-", "Y")?;
    let y = s.integer("Y")?;
    s.literal("-BAT-", "BAT")?;
    let battery = s.decimal("BAT")?;
    s.literal("-GYR-[", "GYR")?;
    let gx = s.decimal("GYR")?;
    s.literal(",", "GYR")?;
    let gy = s.decimal("GYR")?;
    s.literal(",", "GYR")?;
    let gz = s.decimal("GYR")?;
    s.literal("]-WIND-", "WIND")?;
    let wind = s.decimal("WIND")?;
    s.literal("-DUST-", "DUST")?;
    let dust = s.decimal("DUST")?;
    s.literal("-SENS-", "SENS")?;
    let sensor = Sensor::parse(s.word("SENS")?);
    s.end()?;

    Ok(TelemetryRecord {
        x,
        y,
        battery,
        gx,
        gy,
        gz,
        wind,
        dust,
        sensor,
    })
}

/// Render a record back into the wire grammar (sensor in canonical casing).
pub fn format_telemetry(t: &TelemetryRecord) -> String {
    format!(
        "X-{}-Y-{}-BAT-{}-GYR-[{},{},{}]-WIND-{}-DUST-{}-SENS-{}",
        t.x, t.y, t.battery, t.gx, t.gy, t.gz, t.wind, t.dust, t.sensor
    )
}
