//! Semantic comparison of resource quantities
//!
//! The API server stores quantities in canonical form, so `1000m` reads back
//! as `1` and `1024Mi` as `1Gi`. Comparing the strings would report drift on
//! every pass for any user value that is not already canonical.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

const NANO: i128 = 1_000_000_000;

/// Quantity value in nano units, or None when it cannot be read exactly
fn nano_units(quantity: &Quantity) -> Option<i128> {
    let raw = quantity.0.trim();
    let (number, multiplier) = split_suffix(raw)?;

    let (negative, number) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let digits: i128 = format!("{whole}{fraction}").parse().ok()?;
    let scale = 10_i128.checked_pow(u32::try_from(fraction.len()).ok()?)?;
    let scaled = digits.checked_mul(multiplier)?;
    if scaled % scale != 0 {
        return None;
    }
    let value = scaled / scale;
    Some(if negative { -value } else { value })
}

/// Split a quantity into its number and the nano-unit multiplier of its suffix
fn split_suffix(raw: &str) -> Option<(&str, i128)> {
    const BINARY: [(&str, u32); 6] = [
        ("Ki", 10),
        ("Mi", 20),
        ("Gi", 30),
        ("Ti", 40),
        ("Pi", 50),
        ("Ei", 60),
    ];
    const DECIMAL: [(&str, i32); 9] = [
        ("n", -9),
        ("u", -6),
        ("m", -3),
        ("k", 3),
        ("M", 6),
        ("G", 9),
        ("T", 12),
        ("P", 15),
        ("E", 18),
    ];

    for (suffix, shift) in BINARY {
        if let Some(number) = raw.strip_suffix(suffix) {
            return Some((number, (1_i128 << shift) * NANO));
        }
    }
    if let Some((number, exponent)) = raw.split_once(['e', 'E']) {
        if let Ok(exponent) = exponent.parse::<i32>() {
            return Some((number, decimal_multiplier(exponent)?));
        }
    }
    for (suffix, exponent) in DECIMAL {
        if let Some(number) = raw.strip_suffix(suffix) {
            return Some((number, decimal_multiplier(exponent)?));
        }
    }
    Some((raw, NANO))
}

fn decimal_multiplier(exponent: i32) -> Option<i128> {
    let shifted = u32::try_from(exponent.checked_add(9)?).ok()?;
    10_i128.checked_pow(shifted)
}

/// True if both quantities denote the same amount
pub(crate) fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (nano_units(a), nano_units(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn quantity_maps_equal(
    a: Option<&BTreeMap<String, Quantity>>,
    b: Option<&BTreeMap<String, Quantity>>,
) -> bool {
    let empty = BTreeMap::new();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);
    a.len() == b.len()
        && a.iter()
            .all(|(name, qty)| b.get(name).is_some_and(|other| quantities_equal(qty, other)))
}

/// Requirements equality that ignores quantity spelling
pub(crate) fn requirements_equal(
    a: Option<&ResourceRequirements>,
    b: Option<&ResourceRequirements>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => {
            a.claims == b.claims
                && quantity_maps_equal(a.limits.as_ref(), b.limits.as_ref())
                && quantity_maps_equal(a.requests.as_ref(), b.requests.as_ref())
        }
        _ => false,
    }
}
