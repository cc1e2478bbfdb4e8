//! Room code generation and validation.

use rand::Rng;

/// Room codes are exactly this many characters.
pub const ROOM_CODE_LEN: usize = 6;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generate a candidate room code. Uniqueness is the registry's concern.
pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Normalize a user-supplied code to its canonical uppercase form.
///
/// Returns `None` unless the trimmed input is exactly [`ROOM_CODE_LEN`]
/// characters from `[A-Za-z0-9]`.
pub fn normalize_code(raw: &str) -> Option<String> {
    let code = raw.trim().to_ascii_uppercase();
    let well_formed = code.len() == ROOM_CODE_LEN
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    well_formed.then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_well_formed() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(normalize_code(&code), Some(code));
        }
    }

    #[test]
    fn normalize_uppercases_and_trims() {
        assert_eq!(normalize_code(" ab12cd "), Some("AB12CD".to_string()));
        assert_eq!(normalize_code("AB12CD"), Some("AB12CD".to_string()));
    }

    #[test]
    fn normalize_rejects_bad_input() {
        assert_eq!(normalize_code(""), None);
        assert_eq!(normalize_code("AB12C"), None);
        assert_eq!(normalize_code("AB12CDE"), None);
        assert_eq!(normalize_code("AB-2CD"), None);
        assert_eq!(normalize_code("AB12C!"), None);
    }
}
