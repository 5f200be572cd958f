//! Declarative helpers shared across the workspace.

/// Generate `Display`, `FromStr` and `as_str` for a fieldless enum.
///
/// # Example
///
/// ```rust
/// use switchbank_core::enum_from_str;
///
/// #[derive(Debug, PartialEq)]
/// enum BankType {
///     Relay,
///     Switch,
/// }
///
/// enum_from_str!(BankType, [Relay => "relay", Switch => "switch"]);
///
/// assert_eq!(BankType::Relay.to_string(), "relay");
/// assert_eq!("switch".parse::<BankType>().unwrap(), BankType::Switch);
/// ```
#[macro_export]
macro_rules! enum_from_str {
    ($enum_name:ident, [$($variant:ident => $str:expr),* $(,)?]) => {
        impl $enum_name {
            /// Canonical lowercase name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($enum_name::$variant => $str),*
                }
            }
        }

        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($str => Ok($enum_name::$variant),)*
                    _ => Err(format!("Unknown {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
