//! 测试用的 DICOM Part-10 文件生成器
//!
//! 用 `InMemDicomObject` 组装数据集，再由 `dicom` 按声明的传输语法写出。
//! 压缩传输语法下像素仍以原生形式写入，用于验证解析器在解码数据集之前就拒绝它们。

use dicom::core::value::PrimitiveValue;
use dicom::core::{DataElement, Tag, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};

use crate::transfer_syntax::transfer_syntax_uids;

const SECONDARY_CAPTURE_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";
const TEST_SOP_INSTANCE: &str = "1.2.826.0.1.3680043.9.7382.1.1";
const TEST_IMPLEMENTATION_CLASS: &str = "1.2.826.0.1.3680043.9.7382.0.1";
const PREAMBLE_LEN: usize = 128;

enum PixelPayload {
    Words(Vec<u16>),
    Bytes(Vec<u8>),
}

/// 测试 DICOM 文件构建器
pub struct TestDicomBuilder {
    transfer_syntax: String,
    preamble: bool,
    image_tags: bool,
    rows: Option<u16>,
    columns: Option<u16>,
    bits_allocated: u16,
    bits_stored: u16,
    pixel_representation: u16,
    window: Option<(String, String)>,
    rescale: Option<(String, String)>,
    modality: Option<String>,
    pixels: Option<PixelPayload>,
}

impl Default for TestDicomBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDicomBuilder {
    pub fn new() -> Self {
        Self {
            transfer_syntax: transfer_syntax_uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
            preamble: true,
            image_tags: true,
            rows: None,
            columns: None,
            bits_allocated: 16,
            bits_stored: 16,
            pixel_representation: 0,
            window: None,
            rescale: None,
            modality: None,
            pixels: None,
        }
    }

    pub fn transfer_syntax(mut self, uid: &str) -> Self {
        self.transfer_syntax = uid.to_string();
        self
    }

    pub fn without_preamble(mut self) -> Self {
        self.preamble = false;
        self
    }

    /// 不写入任何图像相关标签（尺寸、位深、窗宽窗位、重缩放）
    pub fn without_image_tags(mut self) -> Self {
        self.image_tags = false;
        self
    }

    pub fn dimensions(mut self, rows: u16, columns: u16) -> Self {
        self.rows = Some(rows);
        self.columns = Some(columns);
        self
    }

    pub fn bits(mut self, allocated: u16, stored: u16) -> Self {
        self.bits_allocated = allocated;
        self.bits_stored = stored;
        self
    }

    pub fn signed(mut self) -> Self {
        self.pixel_representation = 1;
        self
    }

    pub fn window(mut self, center: &str, width: &str) -> Self {
        self.window = Some((center.to_string(), width.to_string()));
        self
    }

    pub fn rescale(mut self, slope: &str, intercept: &str) -> Self {
        self.rescale = Some((slope.to_string(), intercept.to_string()));
        self
    }

    pub fn modality(mut self, modality: &str) -> Self {
        self.modality = Some(modality.to_string());
        self
    }

    /// 以 OW 写入的像素
    pub fn pixels_u16(mut self, pixels: Vec<u16>) -> Self {
        self.pixels = Some(PixelPayload::Words(pixels));
        self
    }

    /// 以 OB 写入的像素（隐式VR下读回时为 OW）
    pub fn pixels_u8(mut self, pixels: Vec<u8>) -> Self {
        self.pixels = Some(PixelPayload::Bytes(pixels));
        self
    }

    /// 组装数据集
    pub fn dataset(&self) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();

        obj.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(SECONDARY_CAPTURE_SOP_CLASS),
        ));
        obj.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(TEST_SOP_INSTANCE),
        ));
        obj.put(DataElement::new(
            tags::STUDY_DATE,
            VR::DA,
            PrimitiveValue::from("20240115"),
        ));
        if let Some(modality) = &self.modality {
            obj.put(DataElement::new(
                tags::MODALITY,
                VR::CS,
                PrimitiveValue::from(modality.as_str()),
            ));
        }
        obj.put(DataElement::new(
            tags::PATIENT_NAME,
            VR::PN,
            PrimitiveValue::from("Paciente^Prueba"),
        ));
        obj.put(DataElement::new(
            tags::PATIENT_ID,
            VR::LO,
            PrimitiveValue::from("TEST-0001"),
        ));
        obj.put(DataElement::new(
            tags::SAMPLES_PER_PIXEL,
            VR::US,
            PrimitiveValue::from(1u16),
        ));
        obj.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ));

        if self.image_tags {
            self.put_image_tags(&mut obj);
        }

        match &self.pixels {
            Some(PixelPayload::Words(words)) => {
                obj.put(DataElement::new(
                    tags::PIXEL_DATA,
                    VR::OW,
                    PrimitiveValue::U16(words.clone().into()),
                ));
            }
            Some(PixelPayload::Bytes(bytes)) => {
                let mut bytes = bytes.clone();
                if bytes.len() % 2 == 1 {
                    bytes.push(0);
                }
                obj.put(DataElement::new(
                    tags::PIXEL_DATA,
                    VR::OB,
                    PrimitiveValue::U8(bytes.into()),
                ));
            }
            None => {}
        }

        obj
    }

    fn put_image_tags(&self, obj: &mut InMemDicomObject) {
        let mut put_us = |tag: Tag, value: u16| {
            obj.put(DataElement::new(tag, VR::US, PrimitiveValue::from(value)));
        };
        if let Some(rows) = self.rows {
            put_us(tags::ROWS, rows);
        }
        if let Some(columns) = self.columns {
            put_us(tags::COLUMNS, columns);
        }
        put_us(tags::BITS_ALLOCATED, self.bits_allocated);
        put_us(tags::BITS_STORED, self.bits_stored);
        put_us(tags::HIGH_BIT, self.bits_stored.saturating_sub(1));
        put_us(tags::PIXEL_REPRESENTATION, self.pixel_representation);

        let mut put_ds = |tag: Tag, value: &str| {
            obj.put(DataElement::new(tag, VR::DS, PrimitiveValue::from(value)));
        };
        if let Some((center, width)) = &self.window {
            put_ds(tags::WINDOW_CENTER, center.as_str());
            put_ds(tags::WINDOW_WIDTH, width.as_str());
        }
        if let Some((slope, intercept)) = &self.rescale {
            put_ds(tags::RESCALE_INTERCEPT, intercept.as_str());
            put_ds(tags::RESCALE_SLOPE, slope.as_str());
        }
    }

    /// 写出完整的 Part-10 文件
    ///
    /// # Panics
    ///
    /// 传输语法不在 `dicom` 的注册表中时 panic。
    pub fn build(&self) -> Vec<u8> {
        let meta = FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(SECONDARY_CAPTURE_SOP_CLASS)
            .media_storage_sop_instance_uid(TEST_SOP_INSTANCE)
            .transfer_syntax(self.transfer_syntax.as_str())
            .implementation_class_uid(TEST_IMPLEMENTATION_CLASS)
            .implementation_version_name("MEDIMG_TEST");

        let file = self
            .dataset()
            .with_meta(meta)
            .expect("test file meta should be complete");

        let mut out = Vec::new();
        file.write_all(&mut out)
            .expect("test dataset should encode with the declared transfer syntax");

        // write_all 总是写出 128 字节前导
        if !self.preamble {
            out.drain(..PREAMBLE_LEN);
        }
        out
    }
}
