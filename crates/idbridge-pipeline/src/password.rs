//! Random password generation for imported accounts.
//!
//! Imported users receive a throwaway password the user never learns; the
//! JIT handler replaces it at first login. It still has to satisfy the
//! target tenant's complexity policy, and its character positions must not
//! be predictable.

use rand::seq::SliceRandom;
use rand::Rng;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()-_=+[]{}";

/// Generated password length.
pub const GENERATED_PASSWORD_LENGTH: usize = 16;

/// Generates a random password with at least one character from each class.
///
/// One character is drawn from every class up front, the remainder from the
/// union, and the result is Fisher–Yates shuffled so the mandatory
/// characters do not sit at fixed positions.
#[must_use]
pub fn generate_password() -> String {
    let mut rng = rand::thread_rng();
    let all: Vec<u8> = [UPPER, LOWER, DIGITS, SPECIAL].concat();

    let mut chars: Vec<u8> = vec![
        UPPER[rng.gen_range(0..UPPER.len())],
        LOWER[rng.gen_range(0..LOWER.len())],
        DIGITS[rng.gen_range(0..DIGITS.len())],
        SPECIAL[rng.gen_range(0..SPECIAL.len())],
    ];
    while chars.len() < GENERATED_PASSWORD_LENGTH {
        chars.push(all[rng.gen_range(0..all.len())]);
    }

    chars.shuffle(&mut rng);
    String::from_utf8(chars).expect("password charset is ASCII")
}

/// Whether a password satisfies the target tenant's complexity policy:
/// length ≥ 8 with upper, lower, digit and special characters.
#[must_use]
pub fn meets_complexity(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_password_length() {
        assert_eq!(generate_password().len(), GENERATED_PASSWORD_LENGTH);
    }

    #[test]
    fn test_generated_password_meets_complexity() {
        for _ in 0..200 {
            let password = generate_password();
            assert!(meets_complexity(&password), "weak password: {password}");
        }
    }

    #[test]
    fn test_mandatory_classes_not_positionally_fixed() {
        // With a shuffle, the first character cannot always come from the
        // same class across many generations.
        let first_is_upper = (0..200)
            .filter(|_| {
                generate_password()
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_uppercase())
            })
            .count();
        assert!(first_is_upper < 200, "first character always uppercase");
    }

    #[test]
    fn test_complexity_check_rejects_weak_passwords() {
        assert!(!meets_complexity("short1!"));
        assert!(!meets_complexity("alllowercase1!"));
        assert!(!meets_complexity("ALLUPPERCASE1!"));
        assert!(!meets_complexity("NoDigitsHere!"));
        assert!(!meets_complexity("NoSpecials123"));
        assert!(meets_complexity("Str0ng!Enough"));
    }
}
