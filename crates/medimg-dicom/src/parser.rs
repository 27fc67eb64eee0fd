//! DICOM数据解析器
//!
//! 从上传的字节流中解码单帧、未压缩的灰度影像及其窗宽窗位参数。

use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::meta::FileMetaTable;
use dicom::object::{FileDicomObject, InMemDicomObject};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

use crate::error::DicomError;
use crate::transfer_syntax::{self, TransferSyntaxInfo};
use crate::validator::validate_dicom_upload;
use crate::windowing::{
    PixelRepresentation, WindowParams, DEFAULT_BITS_STORED, DEFAULT_WINDOW_CENTER,
    DEFAULT_WINDOW_WIDTH,
};

/// 缺少 Rows/Columns 时的默认尺寸
pub const DEFAULT_DIMENSION: u32 = 512;

const PREAMBLE_LEN: usize = 128;
const DICM_MAGIC: &[u8; 4] = b"DICM";

/// 解码后的DICOM影像
#[derive(Debug, Clone, PartialEq)]
pub struct DicomImage {
    /// 图像宽度 (Columns)
    pub width: u32,
    /// 图像高度 (Rows)
    pub height: u32,
    /// 存储像素值，按像素表示解释符号，长度为 width*height
    pub pixels: Vec<i32>,
    /// 窗宽窗位参数
    pub window: WindowParams,
    /// 分配位数
    pub bits_allocated: u16,
    /// 传输语法
    pub transfer_syntax: TransferSyntaxInfo,
    /// 其他元数据
    pub metadata: DicomMetadata,
}

/// 展示用元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomMetadata {
    pub modality: Option<String>,
    pub photometric_interpretation: Option<String>,
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub study_date: Option<String>,
    pub study_description: Option<String>,
    pub number_of_frames: Option<u32>,
    pub samples_per_pixel: Option<u16>,
}

/// 校验上传文件并解码
pub fn parse_dicom_file(
    file_name: &str,
    mime_type: Option<&str>,
    data: &[u8],
) -> Result<DicomImage, DicomError> {
    validate_dicom_upload(file_name, mime_type)?;
    DicomParser::parse_bytes(data)
}

/// DICOM数据解析器
pub struct DicomParser;

impl DicomParser {
    /// 解析DICOM字节数据
    ///
    /// 解码器内部的 panic 也会被转换为 [`DicomError::Malformed`]。
    pub fn parse_bytes(data: &[u8]) -> Result<DicomImage, DicomError> {
        debug!("开始解析DICOM字节数据，大小: {} bytes", data.len());

        match panic::catch_unwind(AssertUnwindSafe(|| Self::decode(data))) {
            Ok(result) => result,
            Err(_) => {
                warn!("DICOM decoder panicked on {} byte input", data.len());
                Err(DicomError::Malformed(
                    "error interno al decodificar el archivo".to_string(),
                ))
            }
        }
    }

    fn decode(data: &[u8]) -> Result<DicomImage, DicomError> {
        let stream = Self::strip_preamble(data)?;

        // 先只读取文件元信息，压缩格式在解码数据集之前就拒绝
        let meta = FileMetaTable::from_reader(stream)
            .map_err(|e| DicomError::Malformed(format!("metadatos de archivo inválidos: {}", e)))?;
        let transfer_syntax = TransferSyntaxInfo::from_uid(meta.transfer_syntax());

        if transfer_syntax.is_compressed {
            warn!("Rejected compressed transfer syntax {}", transfer_syntax.uid);
            return Err(DicomError::UnsupportedTransferSyntax(transfer_syntax.uid));
        }

        let obj = FileDicomObject::<InMemDicomObject>::from_reader(stream)
            .map_err(|e| DicomError::Malformed(format!("no se pudo leer el conjunto de datos: {}", e)))?;

        let height = Self::get_u16(&obj, tags::ROWS)
            .map(u32::from)
            .unwrap_or(DEFAULT_DIMENSION);
        let width = Self::get_u16(&obj, tags::COLUMNS)
            .map(u32::from)
            .unwrap_or(DEFAULT_DIMENSION);
        if width == 0 || height == 0 {
            return Err(DicomError::Malformed(format!(
                "dimensiones inválidas {}x{}",
                width, height
            )));
        }

        let bits_allocated = Self::get_u16(&obj, tags::BITS_ALLOCATED).unwrap_or(16);
        let pixel_representation = PixelRepresentation::from_tag_value(
            Self::get_u16(&obj, tags::PIXEL_REPRESENTATION).unwrap_or(0),
        );

        let window = WindowParams {
            window_center: Self::get_f64(&obj, tags::WINDOW_CENTER).unwrap_or(DEFAULT_WINDOW_CENTER),
            window_width: Self::get_f64(&obj, tags::WINDOW_WIDTH).unwrap_or(DEFAULT_WINDOW_WIDTH),
            rescale_slope: Self::get_f64(&obj, tags::RESCALE_SLOPE).unwrap_or(1.0),
            rescale_intercept: Self::get_f64(&obj, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
            bits_stored: Self::get_u16(&obj, tags::BITS_STORED).unwrap_or(DEFAULT_BITS_STORED),
            pixel_representation,
        };

        let metadata = DicomMetadata {
            modality: Self::get_string(&obj, tags::MODALITY),
            photometric_interpretation: Self::get_string(&obj, tags::PHOTOMETRIC_INTERPRETATION),
            patient_id: Self::get_string(&obj, tags::PATIENT_ID),
            patient_name: Self::get_string(&obj, tags::PATIENT_NAME),
            study_date: Self::get_string(&obj, tags::STUDY_DATE),
            study_description: Self::get_string(&obj, tags::STUDY_DESCRIPTION),
            number_of_frames: Self::get_string(&obj, tags::NUMBER_OF_FRAMES)
                .and_then(|s| s.parse().ok()),
            samples_per_pixel: Self::get_u16(&obj, tags::SAMPLES_PER_PIXEL),
        };

        if metadata.number_of_frames.unwrap_or(1) > 1 {
            debug!("Multi-frame object, only the first frame is decoded");
        }

        let pixel_count = (width as usize) * (height as usize);
        let pixels = Self::extract_pixels(
            &obj,
            bits_allocated,
            pixel_representation,
            pixel_count,
            &transfer_syntax.uid,
        )?;

        info!(
            "成功解析DICOM影像: {}x{}, 传输语法: {}, 模态: {:?}",
            width, height, transfer_syntax.uid, metadata.modality
        );

        Ok(DicomImage {
            width,
            height,
            pixels,
            window,
            bits_allocated,
            transfer_syntax,
            metadata,
        })
    }

    /// 跳过128字节前导，返回从 `DICM` 开始的数据
    fn strip_preamble(data: &[u8]) -> Result<&[u8], DicomError> {
        if data.len() >= PREAMBLE_LEN + DICM_MAGIC.len()
            && &data[PREAMBLE_LEN..PREAMBLE_LEN + DICM_MAGIC.len()] == DICM_MAGIC
        {
            Ok(&data[PREAMBLE_LEN..])
        } else if data.starts_with(DICM_MAGIC) {
            Ok(data)
        } else {
            Err(DicomError::Malformed(
                "falta la firma DICM del archivo".to_string(),
            ))
        }
    }

    /// 提取第一帧的存储像素值
    fn extract_pixels(
        obj: &InMemDicomObject,
        bits_allocated: u16,
        representation: PixelRepresentation,
        pixel_count: usize,
        transfer_syntax_uid: &str,
    ) -> Result<Vec<i32>, DicomError> {
        let element = obj
            .element(tags::PIXEL_DATA)
            .map_err(|_| DicomError::MissingPixelData)?;

        let primitive = match element.value() {
            Value::Primitive(PrimitiveValue::Empty) => return Err(DicomError::MissingPixelData),
            Value::Primitive(primitive) => primitive,
            Value::PixelSequence(_) => {
                // 封装像素数据意味着压缩编码
                return Err(DicomError::UnsupportedTransferSyntax(
                    transfer_syntax_uid.to_string(),
                ));
            }
            _ => {
                return Err(DicomError::Malformed(
                    "el elemento PixelData no contiene datos nativos".to_string(),
                ))
            }
        };

        let mut samples = Self::decode_samples(primitive, bits_allocated, representation.is_signed())?;

        if samples.len() < pixel_count {
            return Err(DicomError::Malformed(format!(
                "datos de píxeles insuficientes: {} muestras para {} píxeles",
                samples.len(),
                pixel_count
            )));
        }
        samples.truncate(pixel_count);
        Ok(samples)
    }

    /// 按分配位数和符号解释原生像素数据
    fn decode_samples(
        value: &PrimitiveValue,
        bits_allocated: u16,
        signed: bool,
    ) -> Result<Vec<i32>, DicomError> {
        let samples = match (value, bits_allocated) {
            (PrimitiveValue::U16(words), 16) => words
                .iter()
                .map(|&w| if signed { i32::from(w as i16) } else { i32::from(w) })
                .collect(),
            (PrimitiveValue::I16(words), 16) => words
                .iter()
                .map(|&w| if signed { i32::from(w) } else { i32::from(w as u16) })
                .collect(),
            (PrimitiveValue::U8(bytes), 16) => bytes
                .chunks_exact(2)
                .map(|pair| {
                    let w = u16::from_le_bytes([pair[0], pair[1]]);
                    if signed {
                        i32::from(w as i16)
                    } else {
                        i32::from(w)
                    }
                })
                .collect(),
            (PrimitiveValue::U8(bytes), 8) => bytes
                .iter()
                .map(|&b| if signed { i32::from(b as i8) } else { i32::from(b) })
                .collect(),
            (PrimitiveValue::U16(words), 8) => words
                .iter()
                .flat_map(|w| w.to_le_bytes())
                .map(|b| if signed { i32::from(b as i8) } else { i32::from(b) })
                .collect(),
            (_, 8) | (_, 16) => {
                return Err(DicomError::Malformed(
                    "tipo de valor de PixelData inesperado".to_string(),
                ))
            }
            (_, bits) => {
                return Err(DicomError::Malformed(format!(
                    "BitsAllocated {} no soportado",
                    bits
                )))
            }
        };
        Ok(samples)
    }

    /// 获取无符号整数类型元素的值
    fn get_u16(obj: &InMemDicomObject, tag: Tag) -> Option<u16> {
        obj.element(tag).ok().and_then(|e| e.to_int::<u16>().ok())
    }

    /// 获取数值类型（DS/FD 等）元素的值，多值时取第一个
    fn get_f64(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
        obj.element(tag)
            .ok()
            .and_then(|e| e.to_float64().ok())
            .filter(|v| v.is_finite())
    }

    /// 获取字符串类型元素的值
    fn get_string(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
        obj.element(tag)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.trim_end_matches('\0').trim().to_string())
            .filter(|s| !s.is_empty())
    }
}
