/// Closed string-labelled enumeration with `as_str`, `Display`, `FromStr`
/// (case-insensitive) and serde using the same labels.
macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const VARIANTS: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::error::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::VARIANTS
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| {
                        $crate::domain::error::DomainError::Validation(format!(
                            "unknown {} `{}`",
                            stringify!($name),
                            s
                        ))
                    })
            }
        }
    };
}

pub mod actor;
pub mod address;
pub mod catalog;
pub mod delivery;
pub mod error;
pub mod geo;
pub mod notification;
pub mod order;
pub mod payment;
pub mod query;
pub mod shipment;
pub mod status;
