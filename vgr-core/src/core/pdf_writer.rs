//! PDF object serialization.
//!
//! Objects are collected in a table, then written in one pass:
//!
//! ```text
//! %PDF-1.7
//! [Objects]
//! [XRef Table]
//! [Trailer]
//! %%EOF
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::core::error::{RenderError, RenderResult};

/// Indirect object number (generation is always 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjRef(pub u32);

/// A PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Number(f64),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Name(String),
    Array(Vec<PdfObject>),
    /// Keys are written in sorted order
    Dictionary(BTreeMap<String, PdfObject>),
    /// `/Length` is filled in when written
    Stream {
        dict: BTreeMap<String, PdfObject>,
        data: Vec<u8>,
    },
    Ref(ObjRef),
}

impl PdfObject {
    pub fn name(name: &str) -> Self {
        PdfObject::Name(name.to_string())
    }

    pub fn text(text: &str) -> Self {
        PdfObject::String(text.as_bytes().to_vec())
    }

    pub fn numbers(values: &[f64]) -> Self {
        PdfObject::Array(values.iter().map(|v| PdfObject::Number(*v)).collect())
    }

    /// Stream compressed with Flate.
    pub fn flate_stream(
        mut dict: BTreeMap<String, PdfObject>,
        data: &[u8],
    ) -> RenderResult<Self> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;
        dict.insert("Filter".to_string(), PdfObject::name("FlateDecode"));
        Ok(PdfObject::Stream {
            dict,
            data: compressed,
        })
    }
}

impl From<ObjRef> for PdfObject {
    fn from(r: ObjRef) -> Self {
        PdfObject::Ref(r)
    }
}

/// Build a dictionary from key/value pairs.
pub fn dict<const N: usize>(entries: [(&str, PdfObject); N]) -> BTreeMap<String, PdfObject> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Format a number for PDF syntax: no exponent, at most 6 decimals.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let s = format!("{:.6}", n);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Object table plus serializer for a complete file.
pub struct PdfWriter {
    objects: Vec<Option<PdfObject>>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        PdfWriter {
            objects: Vec::new(),
        }
    }

    /// Reserve an object number to be filled by [`PdfWriter::set`].
    pub fn allocate(&mut self) -> ObjRef {
        self.objects.push(None);
        ObjRef(self.objects.len() as u32)
    }

    pub fn set(&mut self, r: ObjRef, obj: PdfObject) {
        if let Some(slot) = self.objects.get_mut(r.0 as usize - 1) {
            *slot = Some(obj);
        }
    }

    pub fn add(&mut self, obj: PdfObject) -> ObjRef {
        let r = self.allocate();
        self.set(r, obj);
        r
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Serialize all objects, the xref table and the trailer.
    pub fn write_document<W: Write>(
        &self,
        out: &mut W,
        root: ObjRef,
        info: Option<ObjRef>,
    ) -> RenderResult<()> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");

        let mut offsets = Vec::with_capacity(self.objects.len());
        for (i, obj) in self.objects.iter().enumerate() {
            let obj = obj.as_ref().ok_or_else(|| {
                RenderError::Encoding(format!("object {} was allocated but never set", i + 1))
            })?;
            offsets.push(buffer.len() as u64);
            write!(buffer, "{} 0 obj\n", i + 1)?;
            Self::write_object(&mut buffer, obj)?;
            buffer.extend_from_slice(b"\nendobj\n");
        }

        let xref_start = buffer.len() as u64;
        Self::write_xref_table(&mut buffer, &offsets)?;
        Self::write_trailer(&mut buffer, xref_start, offsets.len() as u32 + 1, root, info)?;
        buffer.extend_from_slice(b"%%EOF\n");

        out.write_all(&buffer)?;
        Ok(())
    }

    /// Write a PDF object to the buffer.
    pub fn write_object<W: Write>(buffer: &mut W, obj: &PdfObject) -> RenderResult<()> {
        match obj {
            PdfObject::Null => buffer.write_all(b"null")?,
            PdfObject::Boolean(b) => write!(buffer, "{}", if *b { "true" } else { "false" })?,
            PdfObject::Number(n) => buffer.write_all(format_number(*n).as_bytes())?,
            PdfObject::String(s) => {
                buffer.write_all(b"(")?;
                Self::write_escaped_string(buffer, s)?;
                buffer.write_all(b")")?;
            }
            PdfObject::HexString(s) => {
                buffer.write_all(b"<")?;
                for byte in s {
                    write!(buffer, "{:02X}", byte)?;
                }
                buffer.write_all(b">")?;
            }
            PdfObject::Name(name) => {
                buffer.write_all(b"/")?;
                Self::write_escaped_name(buffer, name)?;
            }
            PdfObject::Array(arr) => {
                buffer.write_all(b"[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        buffer.write_all(b" ")?;
                    }
                    Self::write_object(buffer, item)?;
                }
                buffer.write_all(b"]")?;
            }
            PdfObject::Dictionary(dict) => Self::write_dict(buffer, dict)?,
            PdfObject::Stream { dict, data } => {
                let mut dict = dict.clone();
                dict.insert("Length".to_string(), PdfObject::Number(data.len() as f64));
                Self::write_dict(buffer, &dict)?;
                buffer.write_all(b"\nstream\n")?;
                buffer.write_all(data)?;
                buffer.write_all(b"\nendstream")?;
            }
            PdfObject::Ref(r) => write!(buffer, "{} 0 R", r.0)?,
        }

        Ok(())
    }

    fn write_dict<W: Write>(buffer: &mut W, dict: &BTreeMap<String, PdfObject>) -> RenderResult<()> {
        buffer.write_all(b"<<")?;
        for (key, value) in dict {
            buffer.write_all(b"/")?;
            Self::write_escaped_name(buffer, key)?;
            buffer.write_all(b" ")?;
            Self::write_object(buffer, value)?;
            buffer.write_all(b" ")?;
        }
        buffer.write_all(b">>")?;
        Ok(())
    }

    /// Write an escaped literal string.
    fn write_escaped_string<W: Write>(buffer: &mut W, s: &[u8]) -> RenderResult<()> {
        for &byte in s {
            match byte {
                b'(' => buffer.write_all(b"\\(")?,
                b')' => buffer.write_all(b"\\)")?,
                b'\\' => buffer.write_all(b"\\\\")?,
                b'\n' => buffer.write_all(b"\\n")?,
                b'\r' => buffer.write_all(b"\\r")?,
                b'\t' => buffer.write_all(b"\\t")?,
                _ => buffer.write_all(&[byte])?,
            };
        }
        Ok(())
    }

    /// Write an escaped name using #XX for delimiters and whitespace.
    fn write_escaped_name<W: Write>(buffer: &mut W, name: &str) -> RenderResult<()> {
        for byte in name.bytes() {
            match byte {
                b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%' | b'#' => {
                    write!(buffer, "#{:02X}", byte)?;
                }
                b if b <= b' ' || b > b'~' => write!(buffer, "#{:02X}", b)?,
                _ => buffer.write_all(&[byte])?,
            };
        }
        Ok(())
    }

    /// Write a cross-reference table with one subsection starting at 0.
    fn write_xref_table<W: Write>(buffer: &mut W, offsets: &[u64]) -> RenderResult<()> {
        write!(buffer, "xref\n0 {}\n", offsets.len() + 1)?;
        buffer.write_all(b"0000000000 65535 f \n")?;
        for offset in offsets {
            write!(buffer, "{:010} {:05} n \n", offset, 0)?;
        }
        Ok(())
    }

    fn write_trailer<W: Write>(
        buffer: &mut W,
        xref_start_offset: u64,
        size: u32,
        root: ObjRef,
        info: Option<ObjRef>,
    ) -> RenderResult<()> {
        let mut trailer = dict([
            ("Size", PdfObject::Number(size as f64)),
            ("Root", root.into()),
        ]);
        if let Some(info) = info {
            trailer.insert("Info".to_string(), info.into());
        }
        buffer.write_all(b"trailer\n")?;
        Self::write_dict(buffer, &trailer)?;
        write!(buffer, "\nstartxref\n{}\n", xref_start_offset)?;
        Ok(())
    }
}

/// Encode text for a PDF text string: ASCII as-is, otherwise UTF-16BE with BOM.
pub fn text_string(text: &str) -> PdfObject {
    if text.is_ascii() {
        return PdfObject::text(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    PdfObject::HexString(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(obj: &PdfObject) -> String {
        let mut buffer = Vec::new();
        PdfWriter::write_object(&mut buffer, obj).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_write_numbers() {
        assert_eq!(written(&PdfObject::Number(42.0)), "42");
        assert_eq!(written(&PdfObject::Number(3.14)), "3.14");
        assert_eq!(written(&PdfObject::Number(1e-9)), "0");
        assert_eq!(written(&PdfObject::Number(-0.5)), "-0.5");
        assert_eq!(written(&PdfObject::Number(f64::NAN)), "0");
    }

    #[test]
    fn test_write_boolean_and_null() {
        assert_eq!(written(&PdfObject::Boolean(true)), "true");
        assert_eq!(written(&PdfObject::Boolean(false)), "false");
        assert_eq!(written(&PdfObject::Null), "null");
    }

    #[test]
    fn test_write_string_with_special_chars() {
        assert_eq!(
            written(&PdfObject::String(b"hello(world)".to_vec())),
            r"(hello\(world\))"
        );
    }

    #[test]
    fn test_write_hex_string() {
        assert_eq!(
            written(&PdfObject::HexString(vec![0x48, 0x65, 0x6C, 0x6C, 0x6F])),
            "<48656C6C6F>"
        );
    }

    #[test]
    fn test_write_name_with_special_chars() {
        assert_eq!(written(&PdfObject::name("Type")), "/Type");
        assert_eq!(written(&PdfObject::name("Font/Name")), "/Font#2FName");
        assert_eq!(written(&PdfObject::name("A B")), "/A#20B");
    }

    #[test]
    fn test_write_array() {
        assert_eq!(written(&PdfObject::numbers(&[1.0, 2.0, 3.0])), "[1 2 3]");
    }

    #[test]
    fn test_write_dictionary_sorted() {
        let d = dict([
            ("Type", PdfObject::name("Page")),
            ("Rotate", PdfObject::Number(90.0)),
        ]);
        assert_eq!(
            written(&PdfObject::Dictionary(d)),
            "<</Rotate 90 /Type /Page >>"
        );
    }

    #[test]
    fn test_write_stream_sets_length() {
        let s = PdfObject::Stream {
            dict: BTreeMap::new(),
            data: b"q Q".to_vec(),
        };
        assert_eq!(written(&s), "<</Length 3 >>\nstream\nq Q\nendstream");
    }

    #[test]
    fn test_text_string_unicode() {
        assert_eq!(text_string("abc"), PdfObject::text("abc"));
        assert_eq!(
            text_string("é"),
            PdfObject::HexString(vec![0xFE, 0xFF, 0x00, 0xE9])
        );
    }

    #[test]
    fn test_write_document() {
        let mut writer = PdfWriter::new();
        let catalog = writer.allocate();
        let info = writer.add(PdfObject::Dictionary(dict([(
            "Title",
            PdfObject::text("t"),
        )])));
        writer.set(
            catalog,
            PdfObject::Dictionary(dict([("Type", PdfObject::name("Catalog"))])),
        );

        let mut out = Vec::new();
        writer.write_document(&mut out, catalog, Some(info)).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.starts_with("%PDF-1.7"));
        assert!(text.contains("1 0 obj\n<</Type /Catalog >>"));
        assert!(text.contains("xref\n0 3\n0000000000 65535 f \n"));
        assert!(text.contains("/Info 2 0 R"));
        assert!(text.contains("/Root 1 0 R"));
        assert!(text.contains("/Size 3"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn test_unset_object_is_an_error() {
        let mut writer = PdfWriter::new();
        let root = writer.allocate();
        let mut out = Vec::new();
        assert!(writer.write_document(&mut out, root, None).is_err());
    }
}
