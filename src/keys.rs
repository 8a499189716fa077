//! License key generation.
//!
//! Keys are collision-avoidant, not secret: four groups of four uppercase
//! alphanumerics behind a fixed prefix (e.g. `VB-3F9K-22AQ-X01M-77ZP`).
//! Callers must retry against the store's uniqueness constraint before
//! persisting a generated key.

use rand::Rng;

const KEY_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const GROUPS: usize = 4;
const GROUP_LEN: usize = 4;

pub fn generate_key(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = KEY_CHARSET.chars().collect();

    let mut group = || -> String {
        (0..GROUP_LEN)
            .map(|_| chars[rng.gen_range(0..chars.len())])
            .collect()
    };

    let mut parts = vec![prefix.to_string()];
    for _ in 0..GROUPS {
        parts.push(group());
    }
    parts.join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_has_expected_shape() {
        let key = generate_key("VB");
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "VB");
        for group in &parts[1..] {
            assert_eq!(group.len(), 4);
            assert!(group
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn keys_are_unlikely_to_collide() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(generate_key("VB")));
        }
    }

    #[test]
    fn prefix_is_configurable() {
        assert!(generate_key("ACME").starts_with("ACME-"));
    }
}
