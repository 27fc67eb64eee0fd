//! DICOM传输语法策略
//!
//! 只解码原生（未压缩）像素数据，压缩族传输语法一律拒绝。

use serde::Serialize;

/// 常用的传输语法UID常量
pub mod transfer_syntax_uids {
    /// 隐式VR Little Endian (默认传输语法)
    pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

    /// 显式VR Little Endian
    pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

    /// 显式VR Big Endian
    pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

    /// JPEG Baseline (Process 1)
    pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";

    /// JPEG Lossless, Non-Hierarchical, First-Order Prediction
    pub const JPEG_LOSSLESS_SV1: &str = "1.2.840.10008.1.2.4.70";

    /// JPEG 2000 Image Compression
    pub const JPEG_2000: &str = "1.2.840.10008.1.2.4.91";

    /// RLE Lossless
    pub const RLE_LOSSLESS: &str = "1.2.840.10008.1.2.5";
}

/// 压缩族传输语法的UID前缀（JPEG、JPEG-LS、JPEG 2000 等）
pub const COMPRESSED_FAMILY_PREFIX: &str = "1.2.840.10008.1.2.4";

/// 判断传输语法是否为压缩格式
pub fn is_compressed(uid: &str) -> bool {
    let uid = uid.trim_end_matches('\0').trim();
    uid == transfer_syntax_uids::RLE_LOSSLESS
        || uid == COMPRESSED_FAMILY_PREFIX
        || uid.starts_with(&format!("{}.", COMPRESSED_FAMILY_PREFIX))
}

/// 传输语法信息
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSyntaxInfo {
    /// 传输语法UID
    pub uid: String,
    /// 传输语法名称
    pub name: String,
    /// 是否为压缩格式
    pub is_compressed: bool,
}

impl TransferSyntaxInfo {
    pub fn from_uid(uid: &str) -> Self {
        let uid = uid.trim_end_matches('\0').trim();
        Self {
            uid: uid.to_string(),
            name: transfer_syntax_name(uid),
            is_compressed: is_compressed(uid),
        }
    }
}

/// 获取传输语法的名称
fn transfer_syntax_name(uid: &str) -> String {
    match uid {
        "1.2.840.10008.1.2" => "Implicit VR Little Endian".to_string(),
        "1.2.840.10008.1.2.1" => "Explicit VR Little Endian".to_string(),
        "1.2.840.10008.1.2.2" => "Explicit VR Big Endian".to_string(),
        "1.2.840.10008.1.2.1.99" => "Deflated Explicit VR Little Endian".to_string(),
        "1.2.840.10008.1.2.4.50" => "JPEG Baseline (Process 1)".to_string(),
        "1.2.840.10008.1.2.4.51" => "JPEG Extended (Process 2 & 4)".to_string(),
        "1.2.840.10008.1.2.4.57" => "JPEG Lossless (Process 14)".to_string(),
        "1.2.840.10008.1.2.4.70" => {
            "JPEG Lossless, Non-Hierarchical, First-Order Prediction".to_string()
        }
        "1.2.840.10008.1.2.4.80" => "JPEG-LS Lossless Image Compression".to_string(),
        "1.2.840.10008.1.2.4.81" => "JPEG-LS Near Lossless Image Compression".to_string(),
        "1.2.840.10008.1.2.4.90" => "JPEG 2000 Image Compression (Lossless Only)".to_string(),
        "1.2.840.10008.1.2.4.91" => "JPEG 2000 Image Compression".to_string(),
        "1.2.840.10008.1.2.5" => "RLE Lossless".to_string(),
        _ => format!("Unknown Transfer Syntax ({})", uid),
    }
}
