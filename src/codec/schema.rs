//! Field descriptors: the static per-packet-type tables the engine walks.
//!
//! Cross references (`link`, `flag`) are indices into the same table. A
//! table is acyclic and fixed at compile time, so plain indices are enough.

use super::types::PropertyId;
use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    U16,
    U32,
    /// Variable byte integer. With a `link` it is a length prefix covering
    /// the fields after it up to and including `link`.
    Vbi,
    /// A run of bits inside the `Flags` byte at index `link`.
    Bits,
    /// A byte that only exists to carry `Bits` fields.
    Flags,
    /// Two-byte length followed by raw bytes.
    Binary,
    /// Two-byte length followed by UTF-8.
    Utf8,
    /// Raw bytes running to the end of the enclosing length range.
    Payload,
    /// UTF-8 name/value pairs. Repeatable as a property.
    StringPairs,
    /// Variable byte integers. Repeatable as a property.
    VbiVec,
    /// UTF-8 filter followed by a subscription options byte, to the end of the range.
    TopicFilters,
    /// UTF-8 strings to the end of the range.
    Utf8Vec,
    /// Start of a property block. `link` is its length VBI, `tags` lists
    /// the property ids of the fields that follow it, in order.
    Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    None,
    Int(u32),
    Text(&'static str),
    /// Present but empty.
    Empty,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
    pub link: Option<usize>,
    pub flag: Option<usize>,
    pub property: Option<PropertyId>,
    pub bit_offset: u8,
    pub bit_width: u8,
    pub tags: &'static [PropertyId],
    pub default: FieldDefault,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            link: None,
            flag: None,
            property: None,
            bit_offset: 0,
            bit_width: 0,
            tags: &[],
            default: FieldDefault::None,
        }
    }

    pub const fn flags(name: &'static str, value: u8) -> Self {
        Self::new(name, FieldKind::Flags).int(value as u32)
    }

    pub const fn bits(name: &'static str, parent: usize, offset: u8, width: u8) -> Self {
        let mut desc = Self::new(name, FieldKind::Bits);
        desc.link = Some(parent);
        desc.bit_offset = offset;
        desc.bit_width = width;
        desc
    }

    /// Length prefix covering the fields up to and including `last`. It
    /// starts out present; see [`FieldDescriptor::optional`].
    pub const fn length(name: &'static str, last: usize) -> Self {
        let mut desc = Self::new(name, FieldKind::Vbi).int(0);
        desc.link = Some(last);
        desc
    }

    pub const fn properties(length: usize, tags: &'static [PropertyId]) -> Self {
        let mut desc = Self::new("properties", FieldKind::Properties);
        desc.link = Some(length);
        desc.tags = tags;
        desc
    }

    pub const fn property(name: &'static str, kind: FieldKind, id: PropertyId) -> Self {
        let mut desc = Self::new(name, kind);
        desc.property = Some(id);
        desc
    }

    pub const fn flag(mut self, flag: usize) -> Self {
        self.flag = Some(flag);
        self
    }

    pub const fn int(mut self, value: u32) -> Self {
        self.default = FieldDefault::Int(value);
        self
    }

    pub const fn text(mut self, value: &'static str) -> Self {
        self.default = FieldDefault::Text(value);
        self
    }

    pub const fn empty(mut self) -> Self {
        self.default = FieldDefault::Empty;
        self
    }

    /// Starts out absent.
    pub const fn optional(mut self) -> Self {
        self.default = FieldDefault::None;
        self
    }

    pub const fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// True for length prefixes the pack pipeline computes.
    pub fn is_computed(&self) -> bool {
        self.kind == FieldKind::Vbi && self.link.is_some()
    }

    /// True for fields every packet of this type carries: present by
    /// default, not gated by a flag and not a property.
    pub fn is_required(&self) -> bool {
        self.flag.is_none()
            && self.property.is_none()
            && self.default != FieldDefault::None
            && !matches!(self.kind, FieldKind::Bits | FieldKind::Properties)
    }

    pub(crate) fn bit_mask(&self) -> u32 {
        (1u32 << self.bit_width) - 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Int(u32),
    Bytes(Bytes),
    Text(String),
    Texts(Vec<String>),
    StringPairs(Vec<(String, String)>),
    Ints(Vec<u32>),
    TopicFilters(Vec<(String, u8)>),
}

impl FieldValue {
    /// Element count: bytes, characters in bytes, or vector entries.
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Int(_) => 1,
            FieldValue::Bytes(bytes) => bytes.len(),
            FieldValue::Text(text) => text.len(),
            FieldValue::Texts(texts) => texts.len(),
            FieldValue::StringPairs(pairs) => pairs.len(),
            FieldValue::Ints(ints) => ints.len(),
            FieldValue::TopicFilters(filters) => filters.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn fits(&self, kind: FieldKind) -> bool {
        use FieldKind as K;
        matches!(
            (kind, self),
            (K::U8 | K::U16 | K::U32 | K::Vbi | K::Bits | K::Flags, FieldValue::Int(_))
                | (K::Binary | K::Payload, FieldValue::Bytes(_))
                | (K::Utf8, FieldValue::Text(_))
                | (K::Utf8Vec, FieldValue::Texts(_))
                | (K::StringPairs, FieldValue::StringPairs(_))
                | (K::VbiVec, FieldValue::Ints(_))
                | (K::TopicFilters, FieldValue::TopicFilters(_))
        )
    }

    fn from_default(kind: FieldKind, default: FieldDefault) -> Option<FieldValue> {
        match default {
            FieldDefault::None => None,
            FieldDefault::Int(value) => Some(FieldValue::Int(value)),
            FieldDefault::Text(text) => Some(FieldValue::Text(text.to_owned())),
            FieldDefault::Empty => Some(match kind {
                FieldKind::Utf8 => FieldValue::Text(String::new()),
                FieldKind::Utf8Vec => FieldValue::Texts(Vec::new()),
                FieldKind::StringPairs => FieldValue::StringPairs(Vec::new()),
                FieldKind::VbiVec => FieldValue::Ints(Vec::new()),
                FieldKind::TopicFilters => FieldValue::TopicFilters(Vec::new()),
                FieldKind::Binary | FieldKind::Payload => FieldValue::Bytes(Bytes::new()),
                _ => FieldValue::Int(0),
            }),
        }
    }
}

/// One field of a live packet context: a copy of its descriptor plus the
/// current value. `value` being `None` is what "absent" means.
#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) desc: FieldDescriptor,
    pub(crate) value: Option<FieldValue>,
    pub(crate) wire_len: usize,
    pub(crate) printable: Option<String>,
}

impl Field {
    pub(crate) fn with_default(desc: &FieldDescriptor) -> Self {
        Self {
            desc: *desc,
            value: FieldValue::from_default(desc.kind, desc.default),
            wire_len: 0,
            printable: None,
        }
    }

    pub(crate) fn blank(desc: &FieldDescriptor) -> Self {
        Self {
            desc: *desc,
            value: None,
            wire_len: 0,
            printable: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.desc.name
    }

    pub fn kind(&self) -> FieldKind {
        self.desc.kind
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.desc
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&FieldValue> {
        self.value.as_ref()
    }

    pub fn int(&self) -> Option<u32> {
        match self.value {
            Some(FieldValue::Int(value)) => Some(value),
            _ => None,
        }
    }

    /// A missing or zero value counts as unset when the field gates others.
    pub fn is_set(&self) -> bool {
        match &self.value {
            Some(FieldValue::Int(value)) => *value != 0,
            Some(_) => true,
            None => false,
        }
    }

    /// Encoded size, final only after a pack or unpack.
    pub fn wire_len(&self) -> usize {
        self.wire_len
    }

    pub fn len(&self) -> usize {
        self.value.as_ref().map_or(0, FieldValue::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
