//! Rendering evaluation results for the wire.

/// Largest magnitude printed as an integer (2^63, the `i64` range).
const INTEGER_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Formats a computed value for a `RES` response.
///
/// - integral values print without a decimal point (`11`, not `11.0`)
/// - other finite values print as their shortest decimal form (`3.5`)
/// - non-finite values print as `Infinity`, `-Infinity` or `NaN`
pub fn format_result(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value.fract() == 0.0 && value.abs() < INTEGER_LIMIT {
        return (value as i64).to_string();
    }
    value.to_string()
}
