/// Length of a hex-encoded digest
pub const HASH_HEX_LEN: usize = 64;

/// Hex-encoded BLAKE3 digest of `buf`
pub fn hash(buf: &[u8]) -> String {
	blake3::hash(buf).to_hex().to_string()
}

/// Check that `hash` looks like a digest produced by [`hash`]
pub fn is_valid_hash(hash: &str) -> bool {
	hash.len() == HASH_HEX_LEN && hex::decode(hash).is_ok()
}

/// Encode raw block bytes for the JSON wire
pub fn encode_data(data: &[u8]) -> String {
	use base64::Engine;
	base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode block bytes received over the JSON wire
pub fn decode_data(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
	use base64::Engine;
	base64::engine::general_purpose::STANDARD.decode(data)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_hash_is_hex() {
		let h = hash(b"hello");
		assert_eq!(h.len(), HASH_HEX_LEN);
		assert!(is_valid_hash(&h));
		assert_eq!(h, hash(b"hello"));
		assert_ne!(h, hash(b"hello!"));
	}

	#[test]
	fn test_invalid_hash() {
		assert!(!is_valid_hash("0"));
		assert!(!is_valid_hash(&"z".repeat(HASH_HEX_LEN)));
	}

	#[test]
	fn test_data_encoding() {
		let data = vec![0u8, 1, 2, 255];
		assert_eq!(decode_data(&encode_data(&data)).unwrap(), data);
		assert!(decode_data("***").is_err());
	}
}

// vim: ts=4
