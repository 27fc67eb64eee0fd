//! MFA 密钥的 AES-256-GCM 加密
//!
//! 密文格式为 `hex(nonce):hex(ciphertext)`，nonce 为 12 字节随机值。

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use medimg_core::{MedError, Result};
use rand::rngs::OsRng;
use rand::RngCore;

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// 对称加密器
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// 从 64 个十六进制字符的密钥构造
    pub fn from_hex_key(hex_key: &str) -> Result<Self> {
        let key = hex::decode(hex_key.trim()).map_err(|_| {
            MedError::Config("La clave de cifrado MFA debe ser hexadecimal".to_string())
        })?;
        if key.len() != KEY_LEN {
            return Err(MedError::Config(format!(
                "La clave de cifrado MFA debe tener {} bytes, tiene {}",
                KEY_LEN,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| MedError::Config(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| MedError::Crypto(format!("Error al cifrar: {}", e)))?;

        Ok(format!("{}:{}", hex::encode(nonce_bytes), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let (nonce_hex, ciphertext_hex) = encoded
            .split_once(':')
            .ok_or_else(|| MedError::Crypto("Formato de secreto cifrado inválido".to_string()))?;

        let nonce_bytes = hex::decode(nonce_hex)
            .map_err(|_| MedError::Crypto("Nonce inválido".to_string()))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(MedError::Crypto("Nonce inválido".to_string()));
        }
        let ciphertext = hex::decode(ciphertext_hex)
            .map_err(|_| MedError::Crypto("Texto cifrado inválido".to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| MedError::Crypto("No se pudo descifrar el secreto".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| MedError::Crypto("El secreto descifrado no es UTF-8".to_string()))
    }
}
