pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";
pub const DEFAULT_STUN_ADDR_2: &str = "stun:stun1.l.google.com:19302";

/// Platform tag sent with `createSession`.
pub fn platform_tag() -> &'static str {
    std::env::consts::OS
}
