// crates.io
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Checks `signature` (hex HMAC-SHA256 of `payload`) in constant time.
///
/// The header value may carry a `sha256=` prefix, surrounding whitespace, and hex digits in
/// either case. Malformed signatures yield `false`.
pub fn verify(payload: &[u8], signature: &str, secret: &[u8]) -> bool {
	let trimmed = signature.trim();
	let digest = trimmed.strip_prefix(PREFIX).unwrap_or(trimmed);
	let Ok(expected) = hex::decode(digest) else {
		return false;
	};
	let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
		return false;
	};

	mac.update(payload);

	mac.verify_slice(&expected).is_ok()
}

/// Lowercase hex HMAC-SHA256 of `payload`, as sent in the `Signature` header.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
	// HMAC accepts keys of any length.
	let mut mac = match HmacSha256::new_from_slice(secret) {
		Ok(mac) => mac,
		Err(_) => return String::new(),
	};

	mac.update(payload);

	hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	const SECRET: &[u8] = b"whsec_test";
	const BODY: &[u8] = br#"{"id":"01HQZX","action":"reservation.created"}"#;

	#[test]
	fn matching_signature_verifies_with_or_without_prefix() {
		let signature = sign(BODY, SECRET);

		assert_eq!(signature.len(), 64);
		assert!(verify(BODY, &signature, SECRET));
		assert!(verify(BODY, &format!("sha256={signature}"), SECRET));
	}

	#[test]
	fn header_formatting_is_tolerated() {
		let signature = sign(BODY, SECRET);

		assert!(verify(BODY, &format!(" {}\n", signature.to_uppercase()), SECRET));
		assert!(verify(BODY, &format!("\tsha256={signature} "), SECRET));
		assert!(!verify(BODY, &format!("SHA256={signature}"), SECRET));
		assert!(!verify(BODY, &format!("sha256= {signature}"), SECRET));
	}

	#[test]
	fn tampering_and_garbage_fail_closed() {
		let signature = sign(BODY, SECRET);

		assert!(!verify(b"{}", &signature, SECRET));
		assert!(!verify(BODY, &signature, b"other"));
		assert!(!verify(BODY, "", SECRET));
		assert!(!verify(BODY, "not-hex", SECRET));
		assert!(!verify(BODY, &signature[..62], SECRET));
	}
}
