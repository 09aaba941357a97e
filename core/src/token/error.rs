use std::fmt;

use serde::{Deserialize, Serialize};

/// 1-based source position. Line zero means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub const fn start() -> Self {
        Self { line: 1, column: 1 }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Scanner or parser failure with the position where it was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: Position) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        let pos = Position::new(10, 25);
        assert_eq!(pos.to_string(), "10:25");
        assert!(pos.is_valid());
        assert!(!Position::default().is_valid());
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unexpected token", Position::new(2, 10));
        assert_eq!(err.to_string(), "2:10: unexpected token");
    }
}
