//! TOTP 注册与校验
//!
//! SHA-1、6 位数字、30 秒步长，允许前后各一个步长的时钟偏差。

use medimg_core::config::SecurityConfig;
use medimg_core::{MedError, Result};
use totp_rs::{Algorithm, Secret, TOTP};
use tracing::debug;

use crate::cipher::SecretCipher;

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP_SECS: u64 = 30;

/// 一次 MFA 注册的结果
#[derive(Debug, Clone)]
pub struct MfaEnrollment {
    /// Base32 明文密钥，只在调试模式下返回给客户端
    pub secret_base32: String,
    /// `otpauth://` 配置链接
    pub otpauth_url: String,
    /// 存入数据库的密文
    pub encrypted_secret: String,
}

/// MFA 服务
#[derive(Clone)]
pub struct MfaService {
    cipher: SecretCipher,
    issuer: String,
}

impl MfaService {
    pub fn new(cipher: SecretCipher, issuer: impl Into<String>) -> Self {
        Self {
            cipher,
            issuer: issuer.into(),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self> {
        let cipher = SecretCipher::from_hex_key(&config.mfa_encryption_key)?;
        Ok(Self::new(cipher, config.totp_issuer.clone()))
    }

    fn build_totp(&self, secret: Vec<u8>, account_name: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP_SECS,
            secret,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| MedError::Crypto(format!("Configuración TOTP inválida: {}", e)))
    }

    /// 生成新的 160 位密钥并加密
    pub fn setup(&self, account_email: &str) -> Result<MfaEnrollment> {
        let bytes = Secret::generate_secret()
            .to_bytes()
            .map_err(|e| MedError::Crypto(format!("Secreto TOTP inválido: {:?}", e)))?;

        let totp = self.build_totp(bytes, account_email)?;
        let secret_base32 = totp.get_secret_base32();
        let encrypted_secret = self.cipher.encrypt(&secret_base32)?;
        debug!("Generated TOTP secret for {}", account_email);

        Ok(MfaEnrollment {
            secret_base32,
            otpauth_url: totp.get_url(),
            encrypted_secret,
        })
    }

    /// 按当前时间校验验证码
    pub fn verify(&self, encrypted_secret: &str, token: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.verify_at(encrypted_secret, token, now)
    }

    /// 按给定的 Unix 时间校验验证码
    pub fn verify_at(&self, encrypted_secret: &str, token: &str, unix_time: u64) -> Result<bool> {
        let token = token.trim();
        if token.len() != DIGITS || !token.chars().all(|c| c.is_ascii_digit()) {
            return Ok(false);
        }

        let secret_base32 = self.cipher.decrypt(encrypted_secret)?;
        let bytes = Secret::Encoded(secret_base32)
            .to_bytes()
            .map_err(|e| MedError::Crypto(format!("Secreto TOTP inválido: {:?}", e)))?;

        // 校验不依赖账户名，这里用占位值
        let totp = self.build_totp(bytes, "verify")?;
        Ok(totp.check(token, unix_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn service() -> MfaService {
        MfaService::new(SecretCipher::from_hex_key(KEY).unwrap(), "MedImg")
    }

    fn code_at(enrollment: &MfaEnrollment, time: u64) -> String {
        let bytes = Secret::Encoded(enrollment.secret_base32.clone()).to_bytes().unwrap();
        TOTP::new(Algorithm::SHA1, 6, 1, 30, bytes, None, "x".to_string())
            .unwrap()
            .generate(time)
    }

    #[test]
    fn test_setup_produces_provisioning_url() {
        let enrollment = service().setup("ana@example.com").unwrap();

        assert!(enrollment.otpauth_url.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_url.contains("issuer=MedImg"));
        assert!(enrollment.otpauth_url.contains(&enrollment.secret_base32));
        // 160 位密钥的 base32 长度为 32
        assert_eq!(enrollment.secret_base32.len(), 32);
        assert!(!enrollment.encrypted_secret.contains(&enrollment.secret_base32));
    }

    #[test]
    fn test_verify_accepts_current_and_adjacent_steps() {
        let service = service();
        let enrollment = service.setup("ana@example.com").unwrap();
        let now = 1_700_000_000;

        let code = code_at(&enrollment, now);
        assert!(service.verify_at(&enrollment.encrypted_secret, &code, now).unwrap());
        assert!(service.verify_at(&enrollment.encrypted_secret, &code, now + 30).unwrap());
        assert!(!service.verify_at(&enrollment.encrypted_secret, &code, now + 300).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_tokens() {
        let service = service();
        let enrollment = service.setup("ana@example.com").unwrap();

        for token in ["", "12345", "1234567", "abcdef"] {
            assert!(!service.verify_at(&enrollment.encrypted_secret, token, 0).unwrap());
        }
    }

    #[test]
    fn test_verify_with_corrupt_secret_is_error() {
        assert!(matches!(
            service().verify_at("00:11", "123456", 0),
            Err(MedError::Crypto(_))
        ));
    }
}
