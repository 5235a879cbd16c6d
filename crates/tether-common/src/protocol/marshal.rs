//! Tether Value Marshalling
//!
//! Every value that crosses the wire is first turned into a [`Payload`].
//! There are two encoding tiers:
//!
//! - **Structural tier** ([`Payload::Native`]): a closed set of natively
//!   transportable kinds. The postcard enum tag keeps the exact kind, so an
//!   `i32` never comes back as an `i64` or a string.
//! - **Document tier** ([`Payload::Document`]): any other serde type, carried
//!   as a JSON document and rebuilt into whatever type the receiver asks for.
//!   This tier is lossy about the original type.
//!
//! Two sentinels complete the set: [`Payload::Null`] (an explicit null) and
//! [`Payload::Absent`] (the method had no return value).
//!
//! # Example
//!
//! ```
//! use tether_common::protocol::marshal::{deserialize, serialize};
//!
//! let bytes = serialize(&Some(42i32)).unwrap();
//! let back: Option<i32> = deserialize(&bytes).unwrap();
//! assert_eq!(back, Some(42));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{Result, TetherError};

/// Type identifier as carried in `CallRequest::param_types`.
pub type TypeName = String;

/// The natively transportable kinds (structural tier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Native {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Native {
    /// Short kind label used in mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Native::Bool(_) => "bool",
            Native::Int(_) => "i32",
            Native::Long(_) => "i64",
            Native::Double(_) => "f64",
            Native::Str(_) => "String",
            Native::Bytes(_) => "Vec<u8>",
        }
    }
}

/// A single marshalled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Structural tier
    Native(Native),
    /// Document tier (JSON text)
    Document(String),
    /// Explicit null
    Null,
    /// No return value
    Absent,
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Native(native) => native.kind(),
            Payload::Document(_) => "document",
            Payload::Null => "null",
            Payload::Absent => "absent",
        }
    }

    /// Whether this payload is one of the two sentinels.
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Payload::Null | Payload::Absent)
    }
}

/// Conversion between a Rust type and a [`Payload`].
///
/// `type_name()` is the identifier used for overload resolution, so two
/// types that must be told apart on the server (`i32` and `Option<i32>`)
/// report different names.
pub trait Marshal: Sized {
    fn type_name() -> TypeName;

    fn to_payload(&self) -> Result<Payload>;

    fn from_payload(payload: Payload) -> Result<Self>;
}

macro_rules! native_marshal {
    ($ty:ty, $name:literal, $variant:ident) => {
        impl Marshal for $ty {
            fn type_name() -> TypeName {
                $name.to_string()
            }

            fn to_payload(&self) -> Result<Payload> {
                Ok(Payload::Native(Native::$variant(self.clone())))
            }

            fn from_payload(payload: Payload) -> Result<Self> {
                match payload {
                    Payload::Native(Native::$variant(value)) => Ok(value),
                    other => Err(TetherError::mismatch($name, other.kind())),
                }
            }
        }
    };
}

native_marshal!(bool, "bool", Bool);
native_marshal!(i32, "i32", Int);
native_marshal!(i64, "i64", Long);
native_marshal!(f64, "f64", Double);
native_marshal!(String, "String", Str);
native_marshal!(Vec<u8>, "Vec<u8>", Bytes);

/// Nullable form of any marshallable type. `None` travels as the NULL
/// sentinel; both sentinels decode back to `None`.
impl<T: Marshal> Marshal for Option<T> {
    fn type_name() -> TypeName {
        format!("Option<{}>", T::type_name())
    }

    fn to_payload(&self) -> Result<Payload> {
        match self {
            Some(value) => value.to_payload(),
            None => Ok(Payload::Null),
        }
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Null | Payload::Absent => Ok(None),
            other => T::from_payload(other).map(Some),
        }
    }
}

impl Marshal for serde_json::Value {
    fn type_name() -> TypeName {
        "serde_json::Value".to_string()
    }

    fn to_payload(&self) -> Result<Payload> {
        to_document(self)
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        from_document(payload, &Self::type_name())
    }
}

/// Encodes a value on the document tier.
pub fn to_document<T: Serialize>(value: &T) -> Result<Payload> {
    Ok(Payload::Document(serde_json::to_string(value)?))
}

/// Rebuilds a document-tier payload into `T`.
pub fn from_document<T: DeserializeOwned>(payload: Payload, expected: &str) -> Result<T> {
    match payload {
        Payload::Document(text) => serde_json::from_str(&text)
            .map_err(|e| TetherError::mismatch(expected, format!("document ({})", e))),
        other => Err(TetherError::mismatch(expected, other.kind())),
    }
}

/// Declares plain serde types as document-tier values.
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Point { x: i32, y: i32 }
///
/// tether_common::document_value!(Point);
///
/// let bytes = tether_common::protocol::marshal::serialize(&Point { x: 1, y: 2 }).unwrap();
/// let back: Point = tether_common::protocol::marshal::deserialize(&bytes).unwrap();
/// assert_eq!(back, Point { x: 1, y: 2 });
/// ```
#[macro_export]
macro_rules! document_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::protocol::marshal::Marshal for $ty {
                fn type_name() -> $crate::protocol::marshal::TypeName {
                    stringify!($ty).to_string()
                }

                fn to_payload(&self) -> $crate::protocol::Result<$crate::protocol::marshal::Payload> {
                    $crate::protocol::marshal::to_document(self)
                }

                fn from_payload(
                    payload: $crate::protocol::marshal::Payload,
                ) -> $crate::protocol::Result<Self> {
                    $crate::protocol::marshal::from_document(payload, stringify!($ty))
                }
            }
        )+
    };
}

/// Encodes a payload to bytes.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>> {
    Ok(postcard::to_allocvec(payload)?)
}

/// Decodes bytes produced by [`encode_payload`].
pub fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    Ok(postcard::from_bytes(bytes)?)
}

/// Serializes a value, preferring the structural tier.
pub fn serialize<T: Marshal>(value: &T) -> Result<Vec<u8>> {
    encode_payload(&value.to_payload()?)
}

/// Deserializes bytes into the expected type, failing with
/// [`TetherError::TypeMismatch`] when the payload cannot become `T`.
pub fn deserialize<T: Marshal>(bytes: &[u8]) -> Result<T> {
    T::from_payload(decode_payload(bytes)?)
}
