// botgate/src/signature.rs
//
// Primary signature: HMAC-SHA256 of `UA|IP|path` under the server secret,
// truncated to 128 bits, hex-lowercased. Stable across runs and platforms,
// non-reversible, correlates repeat visitors without retaining PII.

use std::net::IpAddr;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEX_LEN: usize = 32; // 128 bits

pub fn primary_signature(secret: &[u8], user_agent: &str, ip: IpAddr, path: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(user_agent.as_bytes());
    mac.update(b"|");
    mac.update(ip.to_string().as_bytes());
    mac.update(b"|");
    mac.update(path.as_bytes());
    let digest = mac.finalize().into_bytes();
    hex::encode(&digest[..SIGNATURE_HEX_LEN / 2])
}
