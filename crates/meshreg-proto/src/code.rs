//! Response codes of the control protocol.
//!
//! Codes use the familiar `class.detail` layout packed into one byte
//! (3 bits class, 5 bits detail). Only the distinction between "changed"
//! (the registrar processed the request and attached a verdict) and an error
//! class matters for registration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Response code attached to a control-protocol response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponseCode(u8);

impl ResponseCode {
    /// 2.04 Changed: the registrar processed the request
    pub const CHANGED: Self = Self::new(2, 4);
    /// 4.00 Bad Request
    pub const BAD_REQUEST: Self = Self::new(4, 0);
    /// 4.04 Not Found
    pub const NOT_FOUND: Self = Self::new(4, 4);
    /// 5.00 Internal Server Error
    pub const INTERNAL_ERROR: Self = Self::new(5, 0);

    /// Build a code from its class and detail parts.
    pub const fn new(class: u8, detail: u8) -> Self {
        Self(((class & 0x07) << 5) | (detail & 0x1f))
    }

    /// Raw byte value.
    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Code class (2 = success, 4 = client error, 5 = server error).
    pub const fn class(self) -> u8 {
        self.0 >> 5
    }

    /// Code detail.
    pub const fn detail(self) -> u8 {
        self.0 & 0x1f
    }

    /// True for 4.xx and 5.xx codes.
    pub const fn is_error(self) -> bool {
        self.0 >= Self::BAD_REQUEST.0
    }
}

impl From<u8> for ResponseCode {
    fn from(raw: u8) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.class(), self.detail())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changed_is_two_oh_four() {
        assert_eq!(ResponseCode::CHANGED.to_u8(), 0x44);
        assert_eq!(ResponseCode::CHANGED.to_string(), "2.04");
        assert!(!ResponseCode::CHANGED.is_error());
    }

    #[test]
    fn error_classes() {
        assert!(ResponseCode::BAD_REQUEST.is_error());
        assert!(ResponseCode::NOT_FOUND.is_error());
        assert!(ResponseCode::INTERNAL_ERROR.is_error());
        assert!(!ResponseCode::new(2, 1).is_error());
        assert_eq!(ResponseCode::INTERNAL_ERROR.to_string(), "5.00");
    }
}
