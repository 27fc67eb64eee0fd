//! DICOM处理错误

use thiserror::Error;

/// DICOM解码失败原因
///
/// 所有解码失败都转换为此枚举，不会有 panic 逃出解析边界。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DicomError {
    #[error("El archivo no es DICOM: se espera extensión .dcm o tipo application/dicom")]
    InvalidFileType,

    #[error("Formato comprimido no soportado ({0}): solo se admiten archivos DICOM sin compresión")]
    UnsupportedTransferSyntax(String),

    #[error("El archivo DICOM no contiene datos de píxeles")]
    MissingPixelData,

    #[error("Archivo DICOM mal formado: {0}")]
    Malformed(String),

    #[error("No se pudo generar la imagen: {0}")]
    Render(String),
}
