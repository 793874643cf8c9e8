use rand::Rng;

pub const DEVICE_CODE_LEN: usize = 16;
pub const M2M_NUMBER_LEN: usize = 13;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random inventory code of uppercase letters and digits.
pub fn generate_device_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..DEVICE_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Validates an M2M SIM number.
///
/// Returns `None` for blank input (clears the column), otherwise requires
/// exactly 13 ASCII digits.
pub fn validate_m2m_number(raw: &str) -> Result<Option<String>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() != M2M_NUMBER_LEN || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("M2M number must be exactly {} digits.", M2M_NUMBER_LEN));
    }
    Ok(Some(trimmed.to_string()))
}

/// Hides all but the last four characters, for listings.
pub fn mask_secret(value: &str) -> String {
    let n = value.chars().count();
    if n <= 4 {
        return "*".repeat(n);
    }
    let tail: String = value.chars().skip(n - 4).collect();
    format!("{}{}", "*".repeat(n - 4), tail)
}

/// Column value for listings: the value, or `-` when absent.
pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn device_codes_use_the_code_alphabet() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let code = generate_device_code(&mut rng);
            assert_eq!(code.len(), DEVICE_CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
        let a = generate_device_code(&mut rng);
        let b = generate_device_code(&mut rng);
        assert_ne!(a, b);
    }

    #[test]
    fn m2m_rules() {
        assert_eq!(validate_m2m_number("  "), Ok(None));
        assert_eq!(validate_m2m_number(" 1234567890123 "), Ok(Some("1234567890123".into())));
        assert!(validate_m2m_number("123456789012").is_err());
        assert!(validate_m2m_number("12345678901a3").is_err());
    }

    #[test]
    fn masking() {
        assert_eq!(mask_secret("1234567890123"), "*********0123");
        assert_eq!(mask_secret("123"), "***");
        assert_eq!(or_dash::<String>(None), "-");
        assert_eq!(or_dash(Some(5)), "5");
    }
}
