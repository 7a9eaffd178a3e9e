//! Bench instrument wire protocol
//!
//! Protocol Overview:
//! - Commands: ASCII tokens wrapped in angle brackets, no terminator
//! - `<S{v}>` sets the applied voltage, `<I1>` reads current, `<V2>` reads voltage
//! - Every command produces exactly one response line
//! - Response: whitespace separated tokens; the first is a firmware label,
//!   the second is the value
//!
//! All command text is produced by [`Command::encode`] so the format lives in
//! one place.

use std::fmt;

/// A single request to the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Apply the given voltage (V)
    SetVoltage(f64),
    /// Request a current reading
    ReadCurrent,
    /// Request a voltage reading
    ReadVoltage,
}

impl Command {
    /// Wire form of the command.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode one bracketed command token, e.g. `<S0.5>`.
    ///
    /// Surrounding whitespace is ignored. Returns `None` for anything else.
    pub fn parse(token: &str) -> Option<Self> {
        let body = token.trim().strip_prefix('<')?.strip_suffix('>')?;
        match body {
            "I1" => Some(Command::ReadCurrent),
            "V2" => Some(Command::ReadVoltage),
            _ => body
                .strip_prefix('S')
                .and_then(|v| v.parse::<f64>().ok())
                .map(Command::SetVoltage),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetVoltage(v) => write!(f, "<S{}>", v),
            Command::ReadCurrent => f.write_str("<I1>"),
            Command::ReadVoltage => f.write_str("<V2>"),
        }
    }
}

/// Extract the measured value from a response line.
///
/// The error string describes what was wrong with the line; the caller adds
/// the command context.
pub fn parse_response(line: &str) -> Result<f64, String> {
    let mut tokens = line.split_whitespace();
    let _label = tokens.next().ok_or_else(|| "empty response".to_string())?;
    let value = tokens
        .next()
        .ok_or_else(|| "missing value token".to_string())?;
    let parsed = value
        .parse::<f64>()
        .map_err(|_| format!("value token {:?} is not a number", value))?;
    if parsed.is_finite() {
        Ok(parsed)
    } else {
        Err(format!("value token {:?} is not finite", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_commands() {
        assert_eq!(Command::SetVoltage(0.5).encode(), "<S0.5>");
        assert_eq!(Command::SetVoltage(-1.25).encode(), "<S-1.25>");
        assert_eq!(Command::SetVoltage(2.0).encode(), "<S2>");
        assert_eq!(Command::ReadCurrent.encode(), "<I1>");
        assert_eq!(Command::ReadVoltage.encode(), "<V2>");
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("<I1>"), Some(Command::ReadCurrent));
        assert_eq!(Command::parse(" <V2>\n"), Some(Command::ReadVoltage));
        assert_eq!(Command::parse("<S0.75>"), Some(Command::SetVoltage(0.75)));
        assert_eq!(Command::parse("<S0.0>"), Some(Command::SetVoltage(0.0)));
        assert_eq!(Command::parse("<Sx>"), None);
        assert_eq!(Command::parse("<I2>"), None);
        assert_eq!(Command::parse("I1"), None);
    }

    #[test]
    fn encoded_setpoints_decode_to_the_same_value() {
        for v in [0.0, 0.01, 0.1 + 0.2, -3.3, 1e-7] {
            assert_eq!(
                Command::parse(&Command::SetVoltage(v).encode()),
                Some(Command::SetVoltage(v))
            );
        }
    }

    #[test]
    fn test_parse_response() {
        let test_cases = vec![
            ("I 0.0123", 0.0123),
            ("V: 1.5\r\n", 1.5),
            ("current 5E-9 mA", 5e-9),
            ("  S   -0.25 ", -0.25),
        ];

        for (input, expected) in test_cases {
            assert_eq!(parse_response(input), Ok(expected), "input {:?}", input);
        }
    }

    #[test]
    fn test_parse_response_errors() {
        assert!(parse_response("").unwrap_err().contains("empty"));
        assert!(parse_response("I").unwrap_err().contains("missing"));
        assert!(parse_response("I abc").unwrap_err().contains("not a number"));
        assert!(parse_response("I NaN").unwrap_err().contains("not finite"));
    }
}
