//! Utility functions for WGSL formatting and type conversion.

use super::types::{ScalarKind, ValueType};

/// Format a float for WGSL, removing trailing zeros but keeping a decimal point.
pub fn fmt_f32(v: f32) -> String {
    if v.is_finite() {
        let s = format!("{v:.9}");
        let s = s.trim_end_matches('0');
        if s.ends_with('.') {
            format!("{s}0")
        } else {
            s.to_string()
        }
    } else {
        "0.0".to_string()
    }
}

/// Sanitize a string to be a valid WGSL identifier.
pub fn sanitize_wgsl_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Zero/one literal of a scalar kind, used when widening vectors.
fn component_literal(kind: ScalarKind, one: bool) -> &'static str {
    match (kind, one) {
        (ScalarKind::Bool, false) => "false",
        (ScalarKind::Bool, true) => "true",
        (ScalarKind::I32, false) => "0i",
        (ScalarKind::I32, true) => "1i",
        (ScalarKind::U32, false) => "0u",
        (ScalarKind::U32, true) => "1u",
        (ScalarKind::F32, false) => "0.0",
        (ScalarKind::F32, true) => "1.0",
    }
}

fn is_simple_operand(snippet: &str) -> bool {
    snippet
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '[' || c == ']')
}

fn swizzle(snippet: &str, len: usize) -> String {
    let mask = &"xyzw"[..len];
    if is_simple_operand(snippet) {
        format!("{snippet}.{mask}")
    } else {
        format!("( {snippet} ).{mask}")
    }
}

/// Convert `snippet` of type `from` into an expression of type `to`.
///
/// - equal types, `void` on either side: unchanged
/// - same length: constructor cast, `u32( x )` / `vec3i( x )`
/// - scalar to vector: splat after converting the component
/// - vector narrowing: swizzle then convert
/// - vector widening: pad with zero components, `1` in w
pub fn format_conversion(snippet: &str, from: ValueType, to: ValueType) -> String {
    if from == to || from == ValueType::Void || to == ValueType::Void {
        return snippet.to_string();
    }
    if from.is_matrix() || to.is_matrix() {
        return format!("{}( {} )", to.wgsl(), snippet);
    }

    let from_len = from.length();
    let to_len = to.length();

    if from_len == to_len {
        return format!("{}( {} )", to.wgsl(), snippet);
    }

    if from_len == 1 {
        let scalar = format_conversion(snippet, from, to.with_length(1));
        return format!("{}( {} )", to.wgsl(), scalar);
    }

    if to_len < from_len {
        let narrowed = swizzle(snippet, to_len);
        return format_conversion(&narrowed, from.with_length(to_len), to);
    }

    let converted = format_conversion(snippet, from, to.with_length(from_len));
    let kind = to.component().unwrap_or(ScalarKind::F32);
    let mut parts = vec![converted];
    for i in from_len..to_len {
        parts.push(component_literal(kind, i == 3).to_string());
    }
    format!("{}( {} )", to.wgsl(), parts.join(", "))
}

/// Map a generic method name to its WGSL spelling.
pub fn wgsl_method(method: &str) -> &str {
    match method {
        "dFdx" => "dpdx",
        "dFdy" => "dpdy",
        "inversesqrt" => "inverseSqrt",
        other => other,
    }
}
