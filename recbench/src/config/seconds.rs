/// Parse a number of seconds, e.g. `0.25`.
///
/// Negative values are accepted, each option decides what they mean.
pub fn parse_seconds(input: &str) -> Result<f64, String> {
    let seconds: f64 = input
        .trim()
        .parse()
        .map_err(|err| format!("invalid number of seconds '{input}': {err}"))?;
    if !seconds.is_finite() {
        return Err(format!("number of seconds must be finite (got '{input}')"));
    }
    Ok(seconds)
}
