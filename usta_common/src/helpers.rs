use std::str::FromStr;

/// Parses `a:b` pairs separated by commas, e.g. `"100:12,9999:8"`. Whitespace around items is ignored.
///
/// The order of the pairs is preserved. Returns the first item that fails to parse as the error.
pub fn parse_pairs<A: FromStr, B: FromStr>(value: &str) -> Result<Vec<(A, B)>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let (a, b) = item.split_once(':').ok_or_else(|| item.to_string())?;
            let a = a.trim().parse::<A>().map_err(|_| item.to_string())?;
            let b = b.trim().parse::<B>().map_err(|_| item.to_string())?;
            Ok((a, b))
        })
        .collect()
}
