//! Canonical wire rendering for prices and sizes.
//!
//! Signatures commit to the exact bytes of every price and size string, so
//! the rendering here must be deterministic: eight fractional digits rounded
//! half away from zero, then trailing zeros stripped, then a bare trailing
//! dot stripped. `87000.0` renders as `"87000"`, never `"87000.0"` — the
//! latter would produce a signature the server cannot match to the sender.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serializer, de};

/// Maximum fractional digits the exchange accepts for prices and sizes.
const WIRE_SCALE: u32 = 8;

/// Renders a decimal in canonical wire form.
#[must_use]
pub fn format_decimal(value: Decimal) -> String {
    value
        .round_dp_with_strategy(WIRE_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

/// Parses a wire string back into a decimal.
pub fn parse_decimal(s: &str) -> Result<Decimal, rust_decimal::Error> {
    s.parse()
}

/// Serde adapter for fields that must carry the canonical wire string.
///
/// Used on the `"p"` and `"s"` keys of order entries; the MessagePack
/// encoder and the JSON request body both go through this path, which keeps
/// the signed bytes and the transmitted bytes identical.
pub mod serde_wire {
    use super::*;

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_decimal(*value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_decimal(&s).map_err(de::Error::custom)
    }
}
