/// Parse an unsigned integer literal: decimal, `0x` hex, `0o` octal or `0b` binary, with `_`
/// separators allowed between digits.
pub(super) fn parse_numeric_literal(text: &str) -> Result<u64, &'static str> {
    if text.starts_with('-') {
        return Err("negative values are not supported here");
    }
    let cleaned = text.replace('_', "").to_ascii_lowercase();
    let (radix, digits) = if let Some(stripped) = cleaned.strip_prefix("0x") {
        (16, stripped)
    } else if let Some(stripped) = cleaned.strip_prefix("0b") {
        (2, stripped)
    } else if let Some(stripped) = cleaned.strip_prefix("0o") {
        (8, stripped)
    } else {
        (10, cleaned.as_str())
    };
    if digits.is_empty() {
        return Err("numeric literal missing digits");
    }
    u64::from_str_radix(digits, radix).map_err(|_| "malformed or out of range numeric literal")
}
