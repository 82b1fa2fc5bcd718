// Identifier generation.
//
// Entity ids are "<millis>-<9 random chars>": sortable by creation time and
// unlikely to collide, but not a security boundary.
// Share tokens are 8 alphanumeric characters drawn from a v4 UUID.

use uuid::Uuid;

pub const SHARE_ID_LEN: usize = 8;

const SHARE_ALPHABET: &[u8; 62] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_id(now_millis: i64) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now_millis, &random[..9])
}

pub fn generate_share_id() -> String {
    // 122 random bits, read out as base-62 digits
    let mut bits = Uuid::new_v4().as_u128();
    let mut token = String::with_capacity(SHARE_ID_LEN);
    for _ in 0..SHARE_ID_LEN {
        let digit = (bits % SHARE_ALPHABET.len() as u128) as usize;
        token.push(SHARE_ALPHABET[digit] as char);
        bits /= SHARE_ALPHABET.len() as u128;
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_starts_with_timestamp() {
        let id = generate_id(1_700_000_000_000);
        let (stamp, rest) = id.split_once('-').expect("separator");
        assert_eq!(stamp, "1700000000000");
        assert_eq!(rest.len(), 9);
        assert_ne!(generate_id(1), generate_id(1));
    }

    #[test]
    fn share_id_is_short_alphanumeric() {
        let token = generate_share_id();
        assert_eq!(token.len(), SHARE_ID_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
