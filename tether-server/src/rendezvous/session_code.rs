use rand::Rng;
use tether_core::SessionCode;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random 8-character code. Uniqueness is checked by the caller against live sessions.
pub fn generate_code() -> SessionCode {
    let mut rng = rand::rng();
    loop {
        let raw: String = (0..8)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();
        if let Ok(code) = SessionCode::parse(&raw) {
            return code;
        }
    }
}
