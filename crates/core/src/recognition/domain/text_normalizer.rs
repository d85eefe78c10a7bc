//! Cleans raw OCR output into a canonical plate string.

/// Normalize raw recognized text.
///
/// Uppercases, drops everything outside `A-Z0-9`, and returns the result
/// unchanged when it already looks like a plate (1-3 letters followed by
/// 1-5 digits). Otherwise every `I` becomes `1` and every `O` becomes `0`,
/// and the repaired string is returned without being checked again.
///
/// A second pass never changes the result: the repair leaves no `I` or
/// `O` behind, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect();

    if is_canonical_plate(&cleaned) {
        return cleaned;
    }
    cleaned
        .chars()
        .map(|c| match c {
            'I' => '1',
            'O' => '0',
            other => other,
        })
        .collect()
}

/// True for 1-3 ASCII uppercase letters followed by 1-5 ASCII digits.
pub fn is_canonical_plate(text: &str) -> bool {
    let letters = text.bytes().take_while(u8::is_ascii_uppercase).count();
    let rest = &text.as_bytes()[letters..];
    (1..=3).contains(&letters) && (1..=5).contains(&rest.len()) && rest.iter().all(u8::is_ascii_digit)
}
