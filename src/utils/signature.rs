use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// 统一的签名辅助工具，覆盖当前接入的两家交易所
pub struct SignatureHelper;

impl SignatureHelper {
    /// Extended 签名: HMAC-SHA256(timestamp + method + path + body)
    pub fn extended_signature(
        secret: &str,
        timestamp: &str,
        method: &str,
        request_path: &str,
        body: &str,
    ) -> String {
        let prehash = format!("{}{}{}{}", timestamp, method, request_path, body);
        Self::hmac_sha256(secret, &prehash)
    }

    /// TradeXYZ 签名: HMAC-SHA256(action json + nonce)
    pub fn tradexyz_signature(secret: &str, action_json: &str, nonce: u64) -> String {
        let prehash = format!("{}{}", action_json, nonce);
        Self::hmac_sha256(secret, &prehash)
    }

    /// 通用 HMAC-SHA256 帮助方法
    pub fn hmac_sha256(secret: &str, data: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 支持任意长度密钥");
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// 毫秒级时间戳
    pub fn timestamp() -> u64 {
        Utc::now().timestamp_millis() as u64
    }

    /// 秒级时间戳
    pub fn timestamp_seconds() -> u64 {
        Utc::now().timestamp() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hmac_sha256_deterministic() {
        let sig1 = SignatureHelper::hmac_sha256("secret", "payload");
        let sig2 = SignatureHelper::hmac_sha256("secret", "payload");
        assert_eq!(sig1, sig2);
        assert_eq!(sig1.len(), 64); // hex编码的256位摘要

        let sig3 = SignatureHelper::hmac_sha256("other", "payload");
        assert_ne!(sig1, sig3);
    }

    #[test]
    fn test_extended_signature_includes_all_parts() {
        let a = SignatureHelper::extended_signature("s", "1", "GET", "/api/v1/user/balance", "");
        let b = SignatureHelper::extended_signature("s", "2", "GET", "/api/v1/user/balance", "");
        assert_ne!(a, b);
    }
}
