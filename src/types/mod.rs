//! Encoding query arguments.
//!
//! Arguments are encoded to their text wire form and later rendered into the
//! SQL text as literals, because the simple query protocol has no parameter
//! binding.

use crate::error::{Error, Result};
use crate::value::Value;

/// One encoded query argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedArg {
    /// SQL NULL
    Null,
    /// Text representation, rendered as a quoted literal
    Text(String),
    /// Raw bytes, rendered as a bytea hex literal
    Bytes(Vec<u8>),
}

impl EncodedArg {
    /// Render as a SQL literal.
    ///
    /// Text is single-quoted with embedded quotes doubled. A string containing
    /// backslashes uses the `E''` form so the result does not depend on
    /// `standard_conforming_strings`. Text holding a NUL byte cannot be sent
    /// in a query message and fails with [`Error::InvalidQuery`].
    pub fn to_literal(&self) -> Result<String> {
        Ok(match self {
            EncodedArg::Null => "NULL".to_string(),
            EncodedArg::Text(s) if s.contains('\0') => {
                return Err(Error::InvalidQuery(
                    "text argument contains a NUL byte".into(),
                ));
            }
            EncodedArg::Text(s) => quote_literal(s),
            EncodedArg::Bytes(b) => {
                let mut out = String::with_capacity(b.len() * 2 + 12);
                out.push_str("'\\x");
                for byte in b {
                    out.push(HEX[(byte >> 4) as usize] as char);
                    out.push(HEX[(byte & 0x0f) as usize] as char);
                }
                out.push_str("'::bytea");
                out
            }
        })
    }
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 3);
    if s.contains('\\') {
        out.push('E');
    }
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Trait for encoding Rust values as query arguments.
pub trait ToWireValue {
    fn encode(&self) -> EncodedArg;
}

/// Trait for encoding multiple parameters.
pub trait ToParams {
    /// Number of parameters.
    fn param_count(&self) -> usize;

    /// Encode all parameters in order.
    fn encode_all(&self) -> Vec<EncodedArg>;
}

// === Option<T> - NULL handling ===

impl<T: ToWireValue> ToWireValue for Option<T> {
    fn encode(&self) -> EncodedArg {
        match self {
            Some(v) => v.encode(),
            None => EncodedArg::Null,
        }
    }
}

// === Reference support ===

impl<T: ToWireValue + ?Sized> ToWireValue for &T {
    fn encode(&self) -> EncodedArg {
        (*self).encode()
    }
}

impl ToWireValue for bool {
    fn encode(&self) -> EncodedArg {
        EncodedArg::Text(if *self { "t" } else { "f" }.to_string())
    }
}

macro_rules! impl_to_wire_display {
    ($($t:ty),+) => {
        $(
            impl ToWireValue for $t {
                fn encode(&self) -> EncodedArg {
                    EncodedArg::Text(self.to_string())
                }
            }
        )+
    };
}

impl_to_wire_display!(i16, i32, i64, u32);

macro_rules! impl_to_wire_float {
    ($($t:ty),+) => {
        $(
            impl ToWireValue for $t {
                fn encode(&self) -> EncodedArg {
                    let text = if self.is_nan() {
                        "NaN".to_string()
                    } else if self.is_infinite() {
                        if self.is_sign_positive() { "Infinity" } else { "-Infinity" }.to_string()
                    } else {
                        self.to_string()
                    };
                    EncodedArg::Text(text)
                }
            }
        )+
    };
}

impl_to_wire_float!(f32, f64);

impl ToWireValue for str {
    fn encode(&self) -> EncodedArg {
        EncodedArg::Text(self.to_owned())
    }
}

impl ToWireValue for String {
    fn encode(&self) -> EncodedArg {
        EncodedArg::Text(self.clone())
    }
}

impl ToWireValue for [u8] {
    fn encode(&self) -> EncodedArg {
        EncodedArg::Bytes(self.to_vec())
    }
}

impl ToWireValue for Vec<u8> {
    fn encode(&self) -> EncodedArg {
        EncodedArg::Bytes(self.clone())
    }
}

impl ToWireValue for Value {
    fn encode(&self) -> EncodedArg {
        match self {
            Value::Null => EncodedArg::Null,
            Value::Bool(v) => v.encode(),
            Value::Int2(v) => v.encode(),
            Value::Int4(v) => v.encode(),
            Value::Int8(v) => v.encode(),
            Value::Oid(v) => v.encode(),
            Value::Float4(v) => v.encode(),
            Value::Float8(v) => v.encode(),
            Value::Text(v) | Value::Json(v) => v.encode(),
            Value::Bytea(v) => v.encode(),
        }
    }
}

impl ToWireValue for EncodedArg {
    fn encode(&self) -> EncodedArg {
        self.clone()
    }
}

// === ToParams implementations ===

impl ToParams for () {
    fn param_count(&self) -> usize {
        0
    }

    fn encode_all(&self) -> Vec<EncodedArg> {
        Vec::new()
    }
}

impl<T: ToParams + ?Sized> ToParams for &T {
    fn param_count(&self) -> usize {
        (*self).param_count()
    }

    fn encode_all(&self) -> Vec<EncodedArg> {
        (*self).encode_all()
    }
}

impl<T: ToWireValue> ToParams for [T] {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn encode_all(&self) -> Vec<EncodedArg> {
        self.iter().map(ToWireValue::encode).collect()
    }
}

impl<T: ToWireValue> ToParams for Vec<T> {
    fn param_count(&self) -> usize {
        self.len()
    }

    fn encode_all(&self) -> Vec<EncodedArg> {
        self.as_slice().encode_all()
    }
}

// Tuple implementations via macro
macro_rules! impl_to_params {
    ($count:expr, $($idx:tt: $T:ident),+) => {
        impl<$($T: ToWireValue),+> ToParams for ($($T,)+) {
            fn param_count(&self) -> usize {
                $count
            }

            fn encode_all(&self) -> Vec<EncodedArg> {
                vec![$(self.$idx.encode()),+]
            }
        }
    };
}

impl_to_params!(1, 0: T0);
impl_to_params!(2, 0: T0, 1: T1);
impl_to_params!(3, 0: T0, 1: T1, 2: T2);
impl_to_params!(4, 0: T0, 1: T1, 2: T2, 3: T3);
impl_to_params!(5, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4);
impl_to_params!(6, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5);
impl_to_params!(7, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6);
impl_to_params!(8, 0: T0, 1: T1, 2: T2, 3: T3, 4: T4, 5: T5, 6: T6, 7: T7);
