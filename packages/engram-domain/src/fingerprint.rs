/// Deterministic 256-bit content fingerprint, rendered as lowercase hex.
/// Used to cheaply detect that an entity's text changed since it was
/// embedded.
pub fn compute(text: &str) -> String {
	blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn is_deterministic() {
		assert_eq!(compute("login test"), compute("login test"));
	}

	#[test]
	fn differs_for_different_text() {
		assert_ne!(compute("login test"), compute("logout test"));
	}

	#[test]
	fn renders_64_hex_chars() {
		let digest = compute("anything");

		assert_eq!(digest.len(), 64);
		assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
	}
}
