//! Little-endian image file directory builder
//!
//! Entries are kept sorted by tag. Values longer than four bytes are written right after
//! the directory, each starting on a word boundary, so a directory's size is known before
//! its position is.

use std::collections::BTreeMap;

use tiff::tags::Type;

use crate::mlv_pipeline::common::types::Rational;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(Vec<(u32, u32)>),
    SRational(Vec<(i32, i32)>),
}

impl Value {
    pub fn short(v: u16) -> Self {
        Value::Short(vec![v])
    }

    pub fn long(v: u32) -> Self {
        Value::Long(vec![v])
    }

    /// Unsigned rational; negative inputs become 0.
    pub fn rational(r: Rational) -> Self {
        Value::Rational(vec![unsigned(r)])
    }

    pub fn rationals(values: &[Rational]) -> Self {
        Value::Rational(values.iter().copied().map(unsigned).collect())
    }

    pub fn srationals(values: &[Rational]) -> Self {
        Value::SRational(
            values
                .iter()
                .map(|r| (r.num, if r.den == 0 { 1 } else { r.den }))
                .collect(),
        )
    }

    fn field_type(&self) -> Type {
        match self {
            Value::Byte(_) => Type::BYTE,
            Value::Ascii(_) => Type::ASCII,
            Value::Short(_) => Type::SHORT,
            Value::Long(_) => Type::LONG,
            Value::Rational(_) => Type::RATIONAL,
            Value::SRational(_) => Type::SRATIONAL,
        }
    }

    fn count(&self) -> u32 {
        let n = match self {
            Value::Byte(v) => v.len(),
            // NUL terminated
            Value::Ascii(s) => s.len() + 1,
            Value::Short(v) => v.len(),
            Value::Long(v) => v.len(),
            Value::Rational(v) => v.len(),
            Value::SRational(v) => v.len(),
        };
        n as u32
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Value::Byte(v) => v.clone(),
            Value::Ascii(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
            Value::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Rational(v) => v
                .iter()
                .flat_map(|(n, d)| n.to_le_bytes().into_iter().chain(d.to_le_bytes()))
                .collect(),
            Value::SRational(v) => v
                .iter()
                .flat_map(|(n, d)| n.to_le_bytes().into_iter().chain(d.to_le_bytes()))
                .collect(),
        }
    }
}

fn unsigned(r: Rational) -> (u32, u32) {
    let r = r.reduced();
    if r.num < 0 || r.den <= 0 {
        (0, 1)
    } else {
        (r.num as u32, r.den as u32)
    }
}

fn padded_len(len: usize) -> usize {
    len + (len & 1)
}

#[derive(Debug, Clone, Default)]
pub struct Ifd {
    entries: BTreeMap<u16, Value>,
}

impl Ifd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: u16, value: Value) {
        self.entries.insert(tag, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes taken by the directory and its out-of-line values.
    pub fn byte_len(&self) -> usize {
        let values: usize = self
            .entries
            .values()
            .map(|v| v.encode().len())
            .filter(|&len| len > 4)
            .map(padded_len)
            .sum();
        2 + 12 * self.entries.len() + 4 + values
    }

    /// Appends the directory at `out.len()`, which must be even. Values follow it.
    pub fn write(&self, out: &mut Vec<u8>, next_ifd: u32) {
        let start = out.len();
        let mut value_offset = start + 2 + 12 * self.entries.len() + 4;
        let mut values = Vec::new();

        out.extend_from_slice(&(self.entries.len() as u16).to_le_bytes());
        for (tag, value) in &self.entries {
            let bytes = value.encode();
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&value.field_type().to_u16().to_le_bytes());
            out.extend_from_slice(&value.count().to_le_bytes());
            if bytes.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..bytes.len()].copy_from_slice(&bytes);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(value_offset as u32).to_le_bytes());
                value_offset += padded_len(bytes.len());
                values.extend_from_slice(&bytes);
                if bytes.len() % 2 == 1 {
                    values.push(0);
                }
            }
        }
        out.extend_from_slice(&next_ifd.to_le_bytes());
        out.extend_from_slice(&values);
    }
}
