//! Optional per-datagram symmetric cipher (spec.md §6).
//!
//! `pyraft.crypto.AESCryptor` plays this role in the original prototype
//! (AES-EAX over a shared secret, applied on send and stripped on
//! receive). The idiomatic Rust equivalent is an AEAD from the RustCrypto
//! `aes-gcm` crate; the contract is identical — peers configured with
//! mismatched keys (or one enabled, one not) become mutually unintelligible.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::errors::*;

const NONCE_LEN: usize = 12;

pub struct Cipher {
	cipher: Aes256Gcm,
}

impl Cipher {
	/// Derives a 256-bit key from an arbitrary-length shared secret, the way
	/// `pyraft.crypto`'s key derivation also goes through SHA-256 rather
	/// than taking raw key bytes directly.
	pub fn from_shared_secret(secret: &[u8]) -> Self {
		let digest = Sha256::digest(secret);
		let key = Key::<Aes256Gcm>::from_slice(&digest);
		Cipher {
			cipher: Aes256Gcm::new(key),
		}
	}

	/// Encrypts a whole datagram, prefixing the random nonce.
	pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
		let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
		let mut ciphertext = self
			.cipher
			.encrypt(&nonce, plaintext)
			.map_err(|e| ErrorKind::TransportError(format!("encrypt failed: {}", e)))?;
		let mut out = nonce.to_vec();
		out.append(&mut ciphertext);
		Ok(out)
	}

	/// Strips the nonce prefix and authenticates + decrypts the remainder.
	pub fn decrypt(&self, datagram: &[u8]) -> Result<Vec<u8>> {
		if datagram.len() < NONCE_LEN {
			return Err(ErrorKind::TransportError("datagram shorter than a nonce".into()).into());
		}
		let (nonce_bytes, ciphertext) = datagram.split_at(NONCE_LEN);
		let nonce = Nonce::from_slice(nonce_bytes);
		self.cipher
			.decrypt(nonce, ciphertext)
			.map_err(|e| ErrorKind::TransportError(format!("decrypt failed: {}", e)).into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_a_datagram() {
		let cipher = Cipher::from_shared_secret(b"test cluster secret");
		let plaintext = b"hello raft";
		let encrypted = cipher.encrypt(plaintext).unwrap();
		let decrypted = cipher.decrypt(&encrypted).unwrap();
		assert_eq!(decrypted, plaintext);
	}

	#[test]
	fn mismatched_keys_fail_to_decrypt() {
		let a = Cipher::from_shared_secret(b"secret-a");
		let b = Cipher::from_shared_secret(b"secret-b");
		let encrypted = a.encrypt(b"hello raft").unwrap();
		assert!(b.decrypt(&encrypted).is_err());
	}
}
