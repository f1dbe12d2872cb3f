//! Cell values crossing the store port.
//! Pure value types — no sqlx, no DB dependencies.

/// One cell as returned by the store — the narrow set of storage kinds the
/// sweep actually touches. Property re-reads come back as text from the
/// store RPC, so integer access has a strict and a coercing form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
}

impl SqlValue {
    /// Strict integer access: `Int` only.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Text access: `Text` only.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer coercion: `Int` passes through, `Text` is parsed after
    /// trimming. A cell that fails here is a per-field data error, never
    /// fatal to the run.
    pub fn coerce_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Null => None,
        }
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}
