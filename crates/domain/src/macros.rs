//! Macro for implementing Display and FromStr for status enums
//!
//! Status strings are stored in SQLite and exchanged with the UI, so every
//! status enum shares one lowercase spelling and a case-insensitive parser.
//!
//! # Example
//!
//! ```rust
//! use fieldsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum DeliveryState {
//!     Waiting,
//!     Sent,
//! }
//!
//! impl_domain_status_conversions!(DeliveryState {
//!     Waiting => "waiting",
//!     Sent => "sent",
//! });
//!
//! assert_eq!(DeliveryState::Sent.to_string(), "sent");
//! assert_eq!("WAITING".parse::<DeliveryState>(), Ok(DeliveryState::Waiting));
//! ```

/// Implements Display and FromStr traits for status enums
///
/// This macro generates:
/// - Display trait: converts enum variants to lowercase strings
/// - FromStr trait: parses case-insensitive strings to enum variants
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum ProbeState {
        Online,
        Offline,
    }

    impl_domain_status_conversions!(ProbeState {
        Online => "online",
        Offline => "offline",
    });

    #[test]
    fn test_display_is_lowercase() {
        assert_eq!(ProbeState::Online.to_string(), "online");
        assert_eq!(ProbeState::Offline.to_string(), "offline");
    }

    #[test]
    fn test_fromstr_ignores_case() {
        assert_eq!(ProbeState::from_str("ONLINE").unwrap(), ProbeState::Online);
        assert_eq!(ProbeState::from_str("OffLine").unwrap(), ProbeState::Offline);
    }

    mod with_domain_result_in_scope {
        #[allow(unused_imports)]
        use crate::Result;

        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        enum Shift {
            Day,
            Night,
        }

        impl_domain_status_conversions!(Shift {
            Day => "day",
            Night => "night",
        });

        #[test]
        fn test_fromstr_with_single_parameter_result_alias() {
            assert_eq!("NIGHT".parse::<Shift>(), Ok(Shift::Night));
            assert_eq!(Shift::Day.to_string(), "day");
        }
    }

    #[test]
    fn test_fromstr_invalid() {
        let result = ProbeState::from_str("flapping");
        assert!(result.unwrap_err().contains("Invalid ProbeState: flapping"));
        assert!(ProbeState::from_str("").is_err());
    }
}
