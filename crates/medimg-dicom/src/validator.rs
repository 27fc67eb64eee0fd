//! 上传文件校验

use crate::error::DicomError;

/// DICOM 的 MIME 类型
pub const DICOM_MIME_TYPE: &str = "application/dicom";

/// 判断上传文件是否为 DICOM
///
/// 文件名以 `.dcm` 结尾（不区分大小写）或 MIME 类型为 `application/dicom` 即可。
pub fn validate_dicom_upload(file_name: &str, mime_type: Option<&str>) -> Result<(), DicomError> {
    if looks_like_dicom(file_name, mime_type) {
        Ok(())
    } else {
        Err(DicomError::InvalidFileType)
    }
}

/// 同 [`validate_dicom_upload`]，返回布尔值
pub fn looks_like_dicom(file_name: &str, mime_type: Option<&str>) -> bool {
    let by_name = file_name.trim().to_ascii_lowercase().ends_with(".dcm");
    let by_mime = mime_type
        .map(|m| m.trim().eq_ignore_ascii_case(DICOM_MIME_TYPE))
        .unwrap_or(false);
    by_name || by_mime
}
