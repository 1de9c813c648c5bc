//! Wire string enums for selection fields.
//!
//! Single- and multi-selection fields travel as plain strings on the wire.
//! A [`Select`] implementation pins down the closed set of values a field
//! may legally carry.

use crate::error::{Error, Result};
use crate::value::non_blank;

/// A closed set of wire values for a selection field.
pub trait Select: Sized + Copy {
    /// Every legal wire value, in declaration order.
    fn options() -> &'static [&'static str];

    /// Parse a wire value; `None` when it is not a member.
    fn from_wire(raw: &str) -> Option<Self>;

    /// The wire value of this member.
    fn as_wire(&self) -> &'static str;
}

/// Validate membership, failing with the offending raw value.
pub fn must_be_select<E: Select>(raw: &str) -> Result<E> {
    E::from_wire(raw).ok_or_else(|| Error::InvalidSelect(raw.to_string()))
}

/// Lenient membership check: blank or out-of-set values become `None`.
pub fn may_be_select<E: Select>(raw: &str) -> Option<E> {
    if non_blank(raw) {
        E::from_wire(raw.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Channel {
        Email,
        Sms,
    }

    impl Select for Channel {
        fn options() -> &'static [&'static str] {
            &["email", "sms"]
        }

        fn from_wire(raw: &str) -> Option<Self> {
            match raw {
                "email" => Some(Channel::Email),
                "sms" => Some(Channel::Sms),
                _ => None,
            }
        }

        fn as_wire(&self) -> &'static str {
            match self {
                Channel::Email => "email",
                Channel::Sms => "sms",
            }
        }
    }

    #[test]
    fn strict_membership() {
        assert_eq!(must_be_select::<Channel>("email").unwrap(), Channel::Email);

        let result = must_be_select::<Channel>("carrier-pigeon");
        assert!(matches!(result, Err(Error::InvalidSelect(ref v)) if v == "carrier-pigeon"));
    }

    #[test]
    fn lenient_membership() {
        assert_eq!(may_be_select::<Channel>("sms"), Some(Channel::Sms));
        assert_eq!(may_be_select::<Channel>(""), None);
        assert_eq!(may_be_select::<Channel>("   "), None);
        assert_eq!(may_be_select::<Channel>("carrier-pigeon"), None);
    }

    #[test]
    fn wire_values_roundtrip() {
        for &raw in Channel::options() {
            let member = must_be_select::<Channel>(raw).unwrap();
            assert_eq!(member.as_wire(), raw);
        }
    }
}
