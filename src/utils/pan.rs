use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder written when a file name carries no PAN.
pub const PAN_NOT_FOUND: &str = "Not Found";
/// Placeholder written when no employee or trainer owns the PAN.
pub const EMAIL_NOT_FOUND: &str = "Email Not Found";

static PAN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid PAN regex"));

pub fn is_valid_pan(candidate: &str) -> bool {
    PAN_RE.is_match(candidate)
}

/// Base name of an archive entry, without any directory prefix.
pub fn base_name(entry: &str) -> &str {
    entry.rsplit(['/', '\\']).next().unwrap_or(entry)
}

/// First `_`, `-` or space separated segment of the file stem,
/// e.g. `ABCDE1234F_payslip_march.pdf` yields `ABCDE1234F`.
pub fn pan_token(entry: &str) -> &str {
    let name = base_name(entry);
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };
    stem.split(['_', '-', ' ']).next().unwrap_or(stem).trim()
}

/// PAN carried by the entry name, if it has a well-formed one.
pub fn extract_pan(entry: &str) -> Option<&str> {
    Some(pan_token(entry)).filter(|token| is_valid_pan(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_first_segment_of_stem() {
        assert_eq!(pan_token("ABCDE1234F_march.pdf"), "ABCDE1234F");
        assert_eq!(pan_token("slips/2026/ABCDE1234F-march.pdf"), "ABCDE1234F");
        assert_eq!(pan_token("ABCDE1234F march.pdf"), "ABCDE1234F");
        assert_eq!(pan_token("ABCDE1234F.pdf"), "ABCDE1234F");
        assert_eq!(pan_token("ABCDE1234F"), "ABCDE1234F");
    }

    #[test]
    fn pan_must_match_exact_shape() {
        assert_eq!(extract_pan("ABCDE1234F_x.pdf"), Some("ABCDE1234F"));
        assert_eq!(extract_pan("abcde1234f_x.pdf"), None);
        assert_eq!(extract_pan("ABCD1234F_x.pdf"), None);
        assert_eq!(extract_pan("payslip_ABCDE1234F.pdf"), None);
        assert_eq!(extract_pan(".hidden"), None);
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("a/b/c.pdf"), "c.pdf");
        assert_eq!(base_name("c.pdf"), "c.pdf");
    }
}
