use medvault::{DataKey, EnvelopeError, KeyWrapper, MasterSecret, WrappedKey};
use proptest::prelude::*;

fn wrapper(secret: &[u8]) -> KeyWrapper {
    KeyWrapper::new(&MasterSecret::new(secret.to_vec()).unwrap())
}

/// Replace the hex digit at `index` with a different valid hex digit.
fn corrupt_hex_digit(encoded: &str, index: usize) -> String {
    let mut chars: Vec<char> = encoded.chars().collect();
    chars[index] = if chars[index] == '0' { '1' } else { '0' };
    chars.into_iter().collect()
}

#[test]
fn test_wrap_round_trip() {
    let w = wrapper(b"master-secret");
    let key = DataKey::generate().unwrap();

    let encoded = w.wrap(&key).unwrap().to_string();
    let unwrapped = w.unwrap_str(&encoded).unwrap();
    assert_eq!(unwrapped.as_bytes(), key.as_bytes());
}

#[test]
fn test_wrong_master_secret_fails_authentication() {
    // Threat: a changed or wrong master secret must never yield a different key.
    let key = DataKey::generate().unwrap();
    let wrapped = wrapper(b"master-one").wrap(&key).unwrap();

    let result = wrapper(b"master-two").unwrap(&wrapped);
    assert!(matches!(result, Err(EnvelopeError::AuthenticationFailure)));
}

#[test]
fn test_corrupted_ciphertext_segment_fails_authentication() {
    // One hex character in the ciphertext segment changes; the blob still
    // parses, so the failure must come from the tag check.
    let w = wrapper(b"master-secret");
    let encoded = w.wrap(&DataKey::generate().unwrap()).unwrap().encode();

    let ct_start = encoded.rfind(':').unwrap() + 1;
    for offset in [0, 7, 64, 127] {
        let corrupted = corrupt_hex_digit(&encoded, ct_start + offset);
        assert!(WrappedKey::parse(&corrupted).is_ok());
        assert!(
            matches!(
                w.unwrap_str(&corrupted),
                Err(EnvelopeError::AuthenticationFailure)
            ),
            "offset {offset}"
        );
    }
}

#[test]
fn test_corrupted_iv_or_tag_segment_fails_authentication() {
    let w = wrapper(b"master-secret");
    let encoded = w.wrap(&DataKey::generate().unwrap()).unwrap().encode();

    for index in [0, 31, 33, 64] {
        let corrupted = corrupt_hex_digit(&encoded, index);
        assert!(matches!(
            w.unwrap_str(&corrupted),
            Err(EnvelopeError::AuthenticationFailure)
        ));
    }
}

#[test]
fn test_wrong_segment_count_is_invalid_format() {
    let w = wrapper(b"master-secret");
    let encoded = w.wrap(&DataKey::generate().unwrap()).unwrap().encode();

    let two_segments = encoded.rsplit_once(':').unwrap().0.to_string();
    let four_segments = format!("{encoded}:00");
    for bad in [two_segments, four_segments, String::new()] {
        assert!(matches!(
            w.unwrap_str(&bad),
            Err(EnvelopeError::InvalidKeyFormat)
        ));
    }
}

#[test]
fn test_non_hex_segment_is_invalid_format() {
    let w = wrapper(b"master-secret");
    let encoded = w.wrap(&DataKey::generate().unwrap()).unwrap().encode();

    let mut chars: Vec<char> = encoded.chars().collect();
    let last = chars.len() - 1;
    chars[last] = 'g';
    let corrupted: String = chars.into_iter().collect();

    assert!(matches!(
        w.unwrap_str(&corrupted),
        Err(EnvelopeError::InvalidKeyFormat)
    ));
}

#[test]
fn test_uppercase_hex_is_invalid_format() {
    let w = wrapper(b"master-secret");
    let encoded = w.wrap(&DataKey::generate().unwrap()).unwrap().encode();
    let upper = encoded.to_ascii_uppercase();
    assert_ne!(upper, encoded);

    assert!(matches!(
        WrappedKey::parse(&upper),
        Err(EnvelopeError::InvalidKeyFormat)
    ));
    assert!(matches!(
        w.unwrap_str(&upper),
        Err(EnvelopeError::InvalidKeyFormat)
    ));
    // The lowercase form is untouched.
    assert!(w.unwrap_str(&encoded).is_ok());
}

#[test]
fn test_same_key_wraps_differently() {
    let w = wrapper(b"master-secret");
    let key = DataKey::generate().unwrap();
    assert_ne!(w.wrap(&key).unwrap(), w.wrap(&key).unwrap());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_unwrap_inverts_wrap(
        key_bytes in any::<[u8; 32]>(),
        secret in proptest::collection::vec(any::<u8>(), 1..64),
    ) {
        let w = wrapper(&secret);
        let key = DataKey::from_bytes(key_bytes);
        let unwrapped = w.unwrap(&w.wrap(&key).unwrap()).unwrap();
        prop_assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn prop_other_secret_never_unwraps(
        key_bytes in any::<[u8; 32]>(),
        a in proptest::collection::vec(any::<u8>(), 1..32),
        b in proptest::collection::vec(any::<u8>(), 1..32),
    ) {
        prop_assume!(a != b);
        let wrapped = wrapper(&a).wrap(&DataKey::from_bytes(key_bytes)).unwrap();
        prop_assert!(matches!(
            wrapper(&b).unwrap(&wrapped),
            Err(EnvelopeError::AuthenticationFailure)
        ));
    }
}
