//! Parsing for Kubernetes-style SI resource quantities ("500m", "2", "256Mi",
//! "1Gi") into fixed-scale integers, mirroring `resource.Quantity.ScaledValue`
//! from the original api machinery: values are always rounded up to the
//! requested scale, never truncated, so `cpu <= hard` comparisons stay exact.

/// Parses a CPU quantity into millicores. `"500m"` -> 500, `"2"` -> 2000.
pub fn parse_milli(raw: &str) -> i64 {
    parse_scaled(raw, 1_000)
}

/// Parses a memory quantity into megabytes (1e6 bytes). Binary suffixes
/// (`Ki`/`Mi`/`Gi`/`Ti`) are converted through their byte value first.
pub fn parse_mega(raw: &str) -> i64 {
    parse_bytes(raw) / 1_000_000
}

/// Parses a storage quantity into gigabytes (1e9 bytes).
pub fn parse_giga(raw: &str) -> i64 {
    parse_bytes(raw) / 1_000_000_000
}

/// Parses like [`parse_milli`]/[`parse_mega`]/[`parse_giga`] but returns
/// `default` for an empty or unparseable string, matching call sites that
/// fall back to an unset value rather than treating it as zero.
pub fn parse_quantity_with_default(raw: &str, kind: QuantityKind, default: i64) -> i64 {
    if raw.trim().is_empty() {
        return default;
    }
    match kind {
        QuantityKind::Milli => parse_milli(raw),
        QuantityKind::Mega => parse_mega(raw),
        QuantityKind::Giga => parse_giga(raw),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityKind {
    Milli,
    Mega,
    Giga,
}

fn parse_bytes(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }

    const BINARY_SUFFIXES: &[(&str, i64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
    ];
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(num) = raw.strip_suffix(suffix) {
            return parse_decimal_scaled(num, *multiplier);
        }
    }

    const DECIMAL_SUFFIXES: &[(&str, i64)] = &[
        ("m", 1), // handled specially below, never reached for bytes
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];
    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if *suffix == "m" {
            continue;
        }
        if let Some(num) = raw.strip_suffix(suffix) {
            return parse_decimal_scaled(num, *multiplier);
        }
    }

    parse_decimal_scaled(raw, 1)
}

/// Parses a quantity at an arbitrary target scale (e.g. 1000 for milli),
/// handling both the `m` millicores suffix and unitless/binary/decimal
/// byte-style suffixes that appear on CPU quantities in practice.
fn parse_scaled(raw: &str, target_scale: i64) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }
    if let Some(num) = raw.strip_suffix('m') {
        // num is already in milli units; convert to the target scale.
        let milli: i64 = num.parse().unwrap_or(0);
        return milli * target_scale / 1_000;
    }

    const BINARY_SUFFIXES: &[(&str, i64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
    ];
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(num) = raw.strip_suffix(suffix) {
            return parse_decimal_scaled(num, multiplier.saturating_mul(target_scale));
        }
    }

    const DECIMAL_SUFFIXES: &[(&str, i64)] = &[
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
    ];
    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if let Some(num) = raw.strip_suffix(suffix) {
            return parse_decimal_scaled(num, multiplier * target_scale);
        }
    }

    // Unitless: whole units, e.g. "2" cores.
    parse_decimal_scaled(raw, target_scale)
}

/// Parses a possibly-fractional decimal number and scales it, rounding up
/// so fractional remainders never silently disappear.
fn parse_decimal_scaled(num: &str, multiplier: i64) -> i64 {
    match num.parse::<f64>() {
        Ok(value) => (value * multiplier as f64).ceil() as i64,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_millicores() {
        assert_eq!(parse_milli("500m"), 500);
        assert_eq!(parse_milli("2"), 2000);
        assert_eq!(parse_milli("0.5"), 500);
    }

    #[test]
    fn parses_memory_binary_and_decimal() {
        assert_eq!(parse_mega("1Gi"), 1073);
        assert_eq!(parse_mega("256Mi"), 268);
        assert_eq!(parse_mega("500M"), 500);
    }

    #[test]
    fn parses_storage() {
        assert_eq!(parse_giga("10Gi"), 10);
        assert_eq!(parse_giga("5G"), 5);
    }

    #[test]
    fn empty_string_is_zero_or_default() {
        assert_eq!(parse_milli(""), 0);
        assert_eq!(
            parse_quantity_with_default("", QuantityKind::Milli, -1),
            -1
        );
    }
}
