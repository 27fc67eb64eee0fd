//! # DICOM影像模块
//!
//! 提供上传校验、DICOM文件解码、传输语法策略、窗宽窗位变换和PNG渲染。

pub mod error;
pub mod parser;
pub mod render;
pub mod transfer_syntax;
pub mod validator;
pub mod windowing;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::DicomError;
pub use parser::{parse_dicom_file, DicomImage, DicomMetadata, DicomParser};
pub use render::{encode_png, render_png, render_rgba};
pub use transfer_syntax::TransferSyntaxInfo;
pub use validator::{looks_like_dicom, validate_dicom_upload};
pub use windowing::{apply_window_level, PixelRepresentation, WindowParams};
