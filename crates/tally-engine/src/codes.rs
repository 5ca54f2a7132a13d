use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// 16 random bytes = 128 bits, well past the point where voucher codes or
/// QR tokens could be enumerated.
const CODE_BYTES: usize = 16;

/// Generate an opaque single-use code (URL-safe base64, no padding).
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
