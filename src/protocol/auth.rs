//! Challenge-response authentication string

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};

/// Compute the `authentication` field of an Identify message.
///
/// `base64(sha256(base64(sha256(secret + salt)) + challenge))`
pub fn authentication_string(secret: &str, salt: &str, challenge: &str) -> String {
    let base64_secret = BASE64.encode(Sha256::digest(format!("{}{}", secret, salt).as_bytes()));
    BASE64.encode(Sha256::digest(
        format!("{}{}", base64_secret, challenge).as_bytes(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let auth = authentication_string(
            "supersecretpassword",
            "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=",
            "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
        );
        assert_eq!(auth, "1Ct943GAT+6YQUUX47Ia/ncufilbe6+oD6lY+5kaCu4=");
    }

    #[test]
    fn test_salt_changes_result() {
        let a = authentication_string("pw", "salt-a", "challenge");
        let b = authentication_string("pw", "salt-b", "challenge");
        assert_ne!(a, b);
    }
}
