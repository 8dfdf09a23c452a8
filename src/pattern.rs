//! File-naming patterns of tiff layers, e.g. `"{xxxxx}/{yyyyy}/{zzzzz}.tif"`

use crate::error::{DatasetError, Result};

/// Default pattern of single-file-per-slice datasets
pub const DEFAULT_TIFF_PATTERN: &str = "{zzzzz}.tif";

/// Default pattern of tiled datasets
pub const DEFAULT_TILED_TIFF_PATTERN: &str = "{xxxxx}/{yyyyy}/{zzzzz}.tif";

fn invalid(pattern: &str, reason: impl Into<String>) -> DatasetError {
    DatasetError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// A pattern needs at least one `{` and one `}`, in equal numbers
pub fn validate_pattern(pattern: &str) -> Result<()> {
    let open = pattern.matches('{').count();
    let close = pattern.matches('}').count();
    if open == 0 || close == 0 {
        return Err(invalid(
            pattern,
            "it needs to contain at least one '{' and one '}'",
        ));
    }
    if open != close {
        return Err(invalid(
            pattern,
            "the number of '{' does not match the number of '}'",
        ));
    }
    Ok(())
}

/// Substitute `{xxx}`, `{yyy}` and `{zzz}` placeholders with zero-padded indices
///
/// The placeholder length is the minimum number of digits.
pub fn expand_pattern(pattern: &str, x: usize, y: usize, z: usize) -> Result<String> {
    let mut expanded = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;

    while let Some(start) = rest.find('{') {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| invalid(pattern, "unterminated placeholder"))?;
        let placeholder = &after[..end];

        let value = match placeholder.chars().next() {
            Some('x') => x,
            Some('y') => y,
            Some('z') => z,
            _ => return Err(invalid(pattern, format!("unknown placeholder '{{{}}}'", placeholder))),
        };
        let first = placeholder.as_bytes()[0];
        if !placeholder.bytes().all(|b| b == first) {
            return Err(invalid(
                pattern,
                format!("placeholder '{{{}}}' mixes axes", placeholder),
            ));
        }

        expanded.push_str(&format!("{:0width$}", value, width = placeholder.len()));
        rest = &after[end + 1..];
    }
    if rest.contains('}') {
        return Err(invalid(pattern, "unmatched '}'"));
    }
    expanded.push_str(rest);
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("{zzzzz}.tif").is_ok());
        assert!(validate_pattern(DEFAULT_TILED_TIFF_PATTERN).is_ok());
        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("abc").is_err());
        assert!(validate_pattern("{zzz").is_err());
        assert!(validate_pattern("{{zzz}").is_err());
    }

    #[test]
    fn test_expand_pattern() {
        assert_eq!(
            expand_pattern("{zzzzz}.tif", 0, 0, 42).unwrap(),
            "00042.tif"
        );
        assert_eq!(
            expand_pattern(DEFAULT_TILED_TIFF_PATTERN, 1, 22, 333).unwrap(),
            "00001/00022/00333.tif"
        );
        assert_eq!(expand_pattern("s_{z}.tif", 0, 0, 1234).unwrap(), "s_1234.tif");
    }

    #[test]
    fn test_expand_rejects_malformed_placeholders() {
        assert!(expand_pattern("{abc}.tif", 0, 0, 0).is_err());
        assert!(expand_pattern("{xy}.tif", 0, 0, 0).is_err());
        assert!(expand_pattern("{}.tif", 0, 0, 0).is_err());
        assert!(expand_pattern("{zz.tif", 0, 0, 0).is_err());
        assert!(expand_pattern("zz}.tif", 0, 0, 0).is_err());
    }
}
