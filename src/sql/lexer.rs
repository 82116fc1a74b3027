//! Tokenless lexical layer: a cheap cursor over the raw query text.
//!
//! There is no token stream. Parsers match keywords, operators,
//! identifiers and literals directly against the input, saving and
//! restoring the cursor position to backtrack.

use crate::error::{Result, SqlError};
use crate::value::{ColumnPath, Value};

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub struct ParseContext<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> ParseContext<'a> {
    pub fn new(input: &'a str) -> Self {
        ParseContext { input, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Save the cursor for later backtracking.
    pub fn save(&self) -> usize {
        self.pos
    }

    pub fn restore(&mut self, saved: usize) {
        self.pos = saved;
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    pub fn error(&self, message: impl Into<String>) -> SqlError {
        SqlError::parse(message, self.pos)
    }

    /// The text consumed since `start`, trimmed; used to capture the
    /// surface form of a parsed clause.
    pub fn captured_since(&self, start: usize) -> String {
        self.input[start..self.pos].trim().to_string()
    }

    pub fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    pub(crate) fn advance_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    /// Consume whitespace, `-- …` line comments and `/* … */` block
    /// comments. Returns true if anything was consumed.
    pub fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.advance_char();
                }
                Some('-') if self.rest().starts_with("--") => match self.rest().find('\n') {
                    Some(nl) => self.pos += nl + 1,
                    None => self.pos = self.input.len(),
                },
                Some('/') if self.rest().starts_with("/*") => match self.rest().find("*/") {
                    Some(end) => self.pos += end + 2,
                    None => self.pos = self.input.len(),
                },
                _ => break,
            }
        }
        self.pos != start
    }

    /// Match a literal string exactly, without skipping whitespace.
    pub fn match_literal(&mut self, literal: &str) -> bool {
        if self.rest().starts_with(literal) {
            self.pos += literal.len();
            true
        } else {
            false
        }
    }

    fn match_insensitive(&mut self, text: &str) -> bool {
        let rest = self.rest();
        // the match length may land inside a multibyte character
        if rest.len() >= text.len()
            && rest.is_char_boundary(text.len())
            && rest[..text.len()].eq_ignore_ascii_case(text)
        {
            self.pos += text.len();
            true
        } else {
            false
        }
    }

    /// Case-insensitive keyword match. Skips leading whitespace; an
    /// embedded space in the keyword ("GROUP BY", "NOT IN") stands for
    /// required whitespace; the keyword must not run into a following
    /// identifier character.
    pub fn match_keyword(&mut self, keyword: &str) -> bool {
        let saved = self.pos;
        self.skip_whitespace();
        let mut first = true;
        for part in keyword.split(' ').filter(|p| !p.is_empty()) {
            if !first && !self.skip_whitespace() {
                self.pos = saved;
                return false;
            }
            if !self.match_insensitive(part) {
                self.pos = saved;
                return false;
            }
            first = false;
        }
        if keyword.chars().last().map_or(false, is_identifier_char)
            && self.peek_char().map_or(false, is_identifier_char)
        {
            self.pos = saved;
            return false;
        }
        true
    }

    pub fn expect_keyword(&mut self, keyword: &str, message: &str) -> Result<()> {
        if self.match_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    /// Match-then-rewind lookahead.
    pub fn peek_keyword(&mut self, keyword: &str) -> bool {
        let saved = self.pos;
        let matched = self.match_keyword(keyword);
        self.pos = saved;
        matched
    }

    /// Match an operator at the cursor without skipping leading
    /// whitespace. Alphabetic operators (AND, OR, NOT, ...) must end at
    /// a non-identifier character.
    pub fn match_operator(&mut self, op: &str) -> bool {
        let saved = self.pos;
        if !self.match_insensitive(op) {
            return false;
        }
        let alphabetic = op.chars().all(|c| c.is_ascii_alphabetic());
        if alphabetic && self.peek_char().map_or(false, is_identifier_char) {
            self.pos = saved;
            return false;
        }
        true
    }

    /// A bare or double-quoted identifier. Quoted identifiers use `""`
    /// to escape an embedded quote and may contain arbitrary UTF-8.
    pub fn match_identifier(&mut self) -> Result<Option<String>> {
        match self.peek_char() {
            Some('"') => {
                self.advance_char();
                let body = self.read_quoted_body('"')?;
                Ok(Some(body))
            }
            Some(c) if is_identifier_start(c) => {
                let start = self.pos;
                while self.peek_char().map_or(false, is_identifier_char) {
                    self.advance_char();
                }
                Ok(Some(self.input[start..self.pos].to_string()))
            }
            _ => Ok(None),
        }
    }

    /// Reads up to and including the closing quote, resolving doubled
    /// quotes. The opening quote must already be consumed.
    fn read_quoted_body(&mut self, quote: char) -> Result<String> {
        let mut body = String::new();
        loop {
            match self.advance_char() {
                None => {
                    return Err(self.error("No closing quote character for string"));
                }
                Some(c) if c == quote => {
                    if self.peek_char() == Some(quote) {
                        self.advance_char();
                        body.push(quote);
                    } else {
                        return Ok(body);
                    }
                }
                Some(c) => body.push(c),
            }
        }
    }

    /// A single-quoted string restricted to ASCII. Errors (without
    /// restoring the cursor) if the body contains a non-ASCII
    /// character; use `match_constant` for the unrestricted form.
    pub fn match_ascii_string(&mut self) -> Result<Option<String>> {
        if self.peek_char() != Some('\'') {
            return Ok(None);
        }
        self.advance_char();
        let body = self.read_quoted_body('\'')?;
        if let Some(c) = body.chars().find(|c| !c.is_ascii()) {
            return Err(self.error(format!(
                "non-ASCII character '{}' in ASCII string literal",
                c
            )));
        }
        Ok(Some(body))
    }

    /// A dot-separated column path. Stops before a `*`, so that
    /// `svd.*` leaves the cursor on the star with prefix `svd`.
    pub fn match_column_path(&mut self) -> Result<Option<ColumnPath>> {
        let mut elements = Vec::new();
        match self.match_identifier()? {
            Some(first) => elements.push(first),
            None => return Ok(None),
        }
        loop {
            let saved = self.pos;
            if !self.match_literal(".") {
                break;
            }
            if self.peek_char() == Some('*') {
                // wildcard suffix; the dot belongs to the prefix
                break;
            }
            match self.match_identifier()? {
                Some(next) => elements.push(next),
                None => {
                    self.pos = saved;
                    break;
                }
            }
        }
        Ok(Some(ColumnPath::new(elements)))
    }

    /// A constant literal: boolean/null keywords, NaN and infinity,
    /// interval literals, numbers (strict float before integer), and
    /// single-quoted strings.
    pub fn match_constant(&mut self) -> Result<Option<Value>> {
        if self.match_keyword("TRUE") {
            return Ok(Some(Value::Bool(true)));
        }
        if self.match_keyword("FALSE") {
            return Ok(Some(Value::Bool(false)));
        }
        if self.match_keyword("NULL") {
            return Ok(Some(Value::Null));
        }
        if self.match_keyword("NAN") {
            return Ok(Some(Value::Float(f64::NAN)));
        }
        if self.match_keyword("INFINITY") || self.match_keyword("INF") {
            return Ok(Some(Value::Float(f64::INFINITY)));
        }
        if self.match_keyword("INTERVAL") {
            return self.match_interval().map(Some);
        }
        if let Some(number) = self.match_number()? {
            return Ok(Some(number));
        }
        if self.peek_char() == Some('\'') {
            self.advance_char();
            let body = self.read_quoted_body('\'')?;
            return Ok(Some(Value::String(body)));
        }
        Ok(None)
    }

    /// An unsigned number at the cursor. Produces a float when the
    /// literal carries a decimal point or exponent, an integer
    /// otherwise.
    fn match_number(&mut self) -> Result<Option<Value>> {
        let start = self.pos;
        let mut int_digits = false;
        while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
            self.advance_char();
            int_digits = true;
        }
        let mut is_float = false;
        if self.peek_char() == Some('.') {
            self.advance_char();
            let mut frac_digits = false;
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance_char();
                frac_digits = true;
            }
            if !int_digits && !frac_digits {
                self.pos = start;
                return Ok(None);
            }
            is_float = true;
        } else if !int_digits {
            return Ok(None);
        }
        if matches!(self.peek_char(), Some('e') | Some('E')) {
            let exp = self.pos;
            self.advance_char();
            if matches!(self.peek_char(), Some('+') | Some('-')) {
                self.advance_char();
            }
            let mut exp_digits = false;
            while self.peek_char().map_or(false, |c| c.is_ascii_digit()) {
                self.advance_char();
                exp_digits = true;
            }
            if exp_digits {
                is_float = true;
            } else {
                self.pos = exp;
            }
        }
        let text = &self.input[start..self.pos];
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.error(format!("invalid number '{}'", text)))?;
            Ok(Some(Value::Float(value)))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| self.error(format!("integer out of range '{}'", text)))?;
            Ok(Some(Value::Int(value)))
        }
    }

    /// The body of an INTERVAL literal: a quoted sequence of
    /// `<number> <unit>` terms accumulated into (months, days, seconds).
    fn match_interval(&mut self) -> Result<Value> {
        self.skip_whitespace();
        let quote = match self.peek_char() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(self.error("expected quoted interval literal after INTERVAL")),
        };
        self.advance_char();
        let body = self.read_quoted_body(quote)?;
        parse_interval_body(&body).map_err(|msg| self.error(msg))
    }

    pub fn expect_eof(&mut self, message: &str) -> Result<()> {
        self.skip_whitespace();
        if self.eof() {
            Ok(())
        } else {
            Err(self.error(message))
        }
    }
}

/// Parse `[sign] (<number> <unit>)+` into an interval triple. Units are
/// YEAR/MONTH/WEEK/DAY/HOUR/MINUTE/SECOND with plural and abbreviated
/// forms; a bare `M` means minutes.
fn parse_interval_body(body: &str) -> std::result::Result<Value, String> {
    let mut inner = ParseContext::new(body);
    inner.skip_whitespace();
    let negative = inner.match_literal("-");
    if !negative {
        inner.match_literal("+");
    }
    let mut months: u64 = 0;
    let mut days: u64 = 0;
    let mut seconds: f64 = 0.0;
    let mut any = false;
    loop {
        inner.skip_whitespace();
        if inner.eof() {
            break;
        }
        let amount = match inner.match_number().map_err(|e| e.to_string())? {
            Some(Value::Int(i)) => i as f64,
            Some(Value::Float(f)) => f,
            _ => return Err(format!("expected number in interval literal '{}'", body)),
        };
        inner.skip_whitespace();
        let unit = match inner.match_identifier().map_err(|e| e.to_string())? {
            Some(u) => u.to_ascii_uppercase(),
            None => return Err(format!("expected unit in interval literal '{}'", body)),
        };
        match unit.as_str() {
            "YEAR" | "YEARS" | "Y" => months += (amount * 12.0) as u64,
            "MONTH" | "MONTHS" | "MON" => months += amount as u64,
            "WEEK" | "WEEKS" | "W" => days += (amount * 7.0) as u64,
            "DAY" | "DAYS" | "D" => days += amount as u64,
            "HOUR" | "HOURS" | "H" => seconds += amount * 3600.0,
            "MINUTE" | "MINUTES" | "MIN" | "M" => seconds += amount * 60.0,
            "SECOND" | "SECONDS" | "SEC" | "S" => seconds += amount,
            other => return Err(format!("unknown interval unit '{}'", other)),
        }
        any = true;
    }
    if !any {
        return Err(format!("empty interval literal '{}'", body));
    }
    if negative {
        if months != 0 || days != 0 {
            return Err("a negative interval must be expressed in seconds".to_string());
        }
        seconds = -seconds;
    }
    Ok(Value::Interval {
        months: months as u32,
        days: days as u32,
        seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_whitespace_and_comments() {
        let mut ctx = ParseContext::new("  -- a comment\n /* block */ x");
        ctx.skip_whitespace();
        assert_eq!(ctx.peek_char(), Some('x'));
    }

    #[test]
    fn test_match_keyword() {
        let mut ctx = ParseContext::new("  select x");
        assert!(ctx.match_keyword("SELECT"));
        assert!(!ctx.match_keyword("FROM"));

        let mut ctx = ParseContext::new("selecting");
        assert!(!ctx.match_keyword("SELECT"));
        assert_eq!(ctx.pos(), 0);

        let mut ctx = ParseContext::new("group   by x");
        assert!(ctx.match_keyword("GROUP BY"));

        let mut ctx = ParseContext::new("groupby x");
        assert!(!ctx.match_keyword("GROUP BY"));
    }

    #[test]
    fn test_keyword_match_on_multibyte_input() {
        // the FALSE lookahead lands mid-codepoint here; it must
        // decline, not panic
        let mut ctx = ParseContext::new("'caf\u{e9}'");
        assert!(!ctx.match_keyword("FALSE"));
        assert_eq!(
            ctx.match_constant().unwrap(),
            Some(Value::String("caf\u{e9}".to_string()))
        );

        let mut ctx = ParseContext::new("\u{65e5}\u{672c} + 1");
        assert!(!ctx.match_keyword("NULL"));
    }

    #[test]
    fn test_match_operator_boundary() {
        let mut ctx = ParseContext::new("AND b");
        assert!(ctx.match_operator("AND"));

        let mut ctx = ParseContext::new("ANDb");
        assert!(!ctx.match_operator("AND"));
        assert_eq!(ctx.pos(), 0);

        let mut ctx = ParseContext::new(">=1");
        assert!(ctx.match_operator(">="));
    }

    #[test]
    fn test_identifiers() {
        let mut ctx = ParseContext::new("foo_1 rest");
        assert_eq!(ctx.match_identifier().unwrap(), Some("foo_1".to_string()));

        let mut ctx = ParseContext::new("\"a \"\"b\"\"\"");
        assert_eq!(ctx.match_identifier().unwrap(), Some("a \"b\"".to_string()));

        let mut ctx = ParseContext::new("\"unterminated");
        assert!(ctx.match_identifier().is_err());

        let mut ctx = ParseContext::new("1abc");
        assert_eq!(ctx.match_identifier().unwrap(), None);
    }

    #[test]
    fn test_column_path_stops_before_star() {
        let mut ctx = ParseContext::new("svd.*");
        let path = ctx.match_column_path().unwrap().unwrap();
        assert_eq!(path.to_string(), "svd");
        assert_eq!(ctx.peek_char(), Some('*'));

        let mut ctx = ParseContext::new("a.b.c ");
        let path = ctx.match_column_path().unwrap().unwrap();
        assert_eq!(path.to_string(), "a.b.c");
    }

    #[test]
    fn test_constants() {
        let mut ctx = ParseContext::new("true");
        assert_eq!(ctx.match_constant().unwrap(), Some(Value::Bool(true)));

        let mut ctx = ParseContext::new("Null");
        assert_eq!(ctx.match_constant().unwrap(), Some(Value::Null));

        let mut ctx = ParseContext::new("1.5");
        assert_eq!(ctx.match_constant().unwrap(), Some(Value::Float(1.5)));

        let mut ctx = ParseContext::new("42 ");
        assert_eq!(ctx.match_constant().unwrap(), Some(Value::Int(42)));

        let mut ctx = ParseContext::new("1e3");
        assert_eq!(ctx.match_constant().unwrap(), Some(Value::Float(1000.0)));

        let mut ctx = ParseContext::new("'it''s'");
        assert_eq!(
            ctx.match_constant().unwrap(),
            Some(Value::String("it's".to_string()))
        );

        let mut ctx = ParseContext::new("'open");
        assert!(ctx.match_constant().is_err());
    }

    #[test]
    fn test_ascii_string_mode() {
        let mut ctx = ParseContext::new("'plain'");
        assert_eq!(
            ctx.match_ascii_string().unwrap(),
            Some("plain".to_string())
        );

        let mut ctx = ParseContext::new("'caf\u{e9}'");
        assert!(ctx.match_ascii_string().is_err());

        let mut ctx = ParseContext::new("'caf\u{e9}'");
        assert_eq!(
            ctx.match_constant().unwrap(),
            Some(Value::String("caf\u{e9}".to_string()))
        );
    }

    #[test]
    fn test_interval_literal() {
        let mut ctx = ParseContext::new("interval '2 DAY 3 H'");
        assert_eq!(
            ctx.match_constant().unwrap(),
            Some(Value::Interval {
                months: 0,
                days: 2,
                seconds: 10800.0
            })
        );

        let mut ctx = ParseContext::new("INTERVAL '1 Y 2 MONTH'");
        assert_eq!(
            ctx.match_constant().unwrap(),
            Some(Value::Interval {
                months: 14,
                days: 0,
                seconds: 0.0
            })
        );

        let mut ctx = ParseContext::new("interval '-30 s'");
        assert_eq!(
            ctx.match_constant().unwrap(),
            Some(Value::Interval {
                months: 0,
                days: 0,
                seconds: -30.0
            })
        );

        let mut ctx = ParseContext::new("interval '3 fortnights'");
        assert!(ctx.match_constant().is_err());
    }

    #[test]
    fn test_number_backtracking() {
        let mut ctx = ParseContext::new("12e+");
        assert_eq!(ctx.match_constant().unwrap(), Some(Value::Int(12)));
        assert_eq!(ctx.peek_char(), Some('e'));
    }
}
