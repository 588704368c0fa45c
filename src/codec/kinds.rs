//! Per-kind wire primitives. Each [`FieldKind`] maps to one [`KindOps`]
//! row; packet schemas never carry wire logic of their own.

use super::{
    printable::PrintOptions,
    schema::{Field, FieldDescriptor, FieldKind, FieldValue},
    types::Error,
    varint::{self, DecodeStatus},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Cursor;

const MAX_PREFIXED_LEN: usize = u16::MAX as usize;

/// Read side of an unpack: the packet bytes, the end of the innermost length
/// range around the current field, and the parent byte for bit fields.
pub(crate) struct Reader<'a> {
    pub(crate) cursor: Cursor<&'a [u8]>,
    pub(crate) limit: usize,
    pub(crate) parent: u32,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            limit: bytes.len(),
            cursor: Cursor::new(bytes),
            parent: 0,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Bytes left before the current range ends.
    fn in_range(&self) -> usize {
        self.limit.saturating_sub(self.position())
    }

    fn require(&self, len: usize, field: &'static str) -> Result<(), Error> {
        if self.cursor.remaining() < len {
            return Err(Error::Truncated { field });
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self, field: &'static str) -> Result<u8, Error> {
        self.require(1, field)?;
        Ok(self.cursor.get_u8())
    }

    fn read_u16(&mut self, field: &'static str) -> Result<u16, Error> {
        self.require(2, field)?;
        Ok(self.cursor.get_u16())
    }

    fn read_u32(&mut self, field: &'static str) -> Result<u32, Error> {
        self.require(4, field)?;
        Ok(self.cursor.get_u32())
    }

    pub(crate) fn read_variable_int(&mut self, field: &'static str) -> Result<u32, Error> {
        varint::decode(&mut self.cursor).map_err(|status| match status {
            DecodeStatus::Incomplete => Error::Truncated { field },
            DecodeStatus::TooLong => Error::InvalidVariableInt { field },
        })
    }

    fn read_binary_data(&mut self, field: &'static str) -> Result<Bytes, Error> {
        let data_size_bytes = self.read_u16(field)? as usize;
        self.read_binary_data_with_size(field, data_size_bytes)
    }

    fn read_binary_data_with_size(
        &mut self,
        field: &'static str,
        size: usize,
    ) -> Result<Bytes, Error> {
        self.require(size, field)?;
        Ok(self.cursor.copy_to_bytes(size))
    }

    fn read_string(&mut self, field: &'static str) -> Result<String, Error> {
        let data = self.read_binary_data(field)?;
        String::from_utf8(data.to_vec()).map_err(|_| Error::InvalidUtf8 { field })
    }
}

pub(crate) trait KindOps: Sync {
    /// Encoded size of the field's current value, tag bytes included.
    fn count(&self, field: &Field) -> usize;

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error>;

    /// Reads one value, or one more occurrence for repeatable kinds. A
    /// property tag has already been consumed by the block scanner.
    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error>;

    fn render(&self, value: &FieldValue, options: &PrintOptions) -> String;

    fn validate(&self, _desc: &FieldDescriptor, _value: &FieldValue) -> Result<(), Error> {
        Ok(())
    }

    fn release(&self, field: &mut Field) {
        field.value = None;
        field.wire_len = 0;
        field.printable = None;
    }

    /// Whether a property of this kind may occur more than once in a block.
    fn repeatable(&self) -> bool {
        false
    }
}

impl FieldKind {
    pub(crate) fn ops(self) -> &'static dyn KindOps {
        match self {
            FieldKind::U8 => &Fixed(1),
            FieldKind::U16 => &Fixed(2),
            FieldKind::U32 => &Fixed(4),
            FieldKind::Vbi => &VariableInt,
            FieldKind::Bits => &BitField,
            FieldKind::Flags => &FlagByte,
            FieldKind::Binary => &BinaryData,
            FieldKind::Utf8 => &Utf8String,
            FieldKind::Payload => &Payload,
            FieldKind::StringPairs => &StringPairs,
            FieldKind::VbiVec => &VariableIntVec,
            FieldKind::TopicFilters => &TopicFilters,
            FieldKind::Utf8Vec => &Utf8Vec,
            FieldKind::Properties => &PropertyBlock,
        }
    }
}

fn tag_len(desc: &FieldDescriptor) -> usize {
    usize::from(desc.property.is_some())
}

fn put_tag(desc: &FieldDescriptor, bytes: &mut BytesMut) {
    if let Some(id) = desc.property {
        bytes.put_u8(id as u8);
    }
}

fn encode_binary_data(value: &[u8], bytes: &mut BytesMut) {
    bytes.put_u16(value.len() as u16);
    bytes.put_slice(value);
}

fn encode_string(value: &str, bytes: &mut BytesMut) {
    encode_binary_data(value.as_bytes(), bytes);
}

fn check_string(desc: &FieldDescriptor, value: &str) -> Result<(), Error> {
    // MQTT strings are capped by their 2-byte prefix and may not carry U+0000
    if value.len() > MAX_PREFIXED_LEN || value.contains('\0') {
        return Err(Error::ValueOutOfRange {
            field: desc.name,
            value: value.len() as u64,
        });
    }
    Ok(())
}

fn mismatch(field: &Field) -> Error {
    Error::KindMismatch {
        field: field.desc.name,
    }
}

fn int_of(field: &Field) -> Result<u32, Error> {
    field.int().ok_or_else(|| mismatch(field))
}

/// Appends to a repeatable value, creating it on first occurrence.
fn push_occurrence<T>(
    field: &mut Field,
    wrap: fn(Vec<T>) -> FieldValue,
    unwrap: fn(&mut FieldValue) -> Option<&mut Vec<T>>,
    item: T,
) -> Result<(), Error> {
    let name = field.desc.name;
    match field.value.as_mut() {
        None => {
            field.value = Some(wrap(vec![item]));
            Ok(())
        }
        Some(value) => match unwrap(value) {
            Some(items) => {
                items.push(item);
                Ok(())
            }
            None => Err(Error::KindMismatch { field: name }),
        },
    }
}

struct Fixed(usize);

impl KindOps for Fixed {
    fn count(&self, field: &Field) -> usize {
        if field.exists() {
            tag_len(&field.desc) + self.0
        } else {
            0
        }
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let value = int_of(field)?;
        put_tag(&field.desc, bytes);
        match self.0 {
            1 => bytes.put_u8(value as u8),
            2 => bytes.put_u16(value as u16),
            _ => bytes.put_u32(value),
        }
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let name = field.desc.name;
        let value = match self.0 {
            1 => reader.read_u8(name)? as u32,
            2 => reader.read_u16(name)? as u32,
            _ => reader.read_u32(name)?,
        };
        field.value = Some(FieldValue::Int(value));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        render_int(value)
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        let max = match self.0 {
            1 => u8::MAX as u32,
            2 => u16::MAX as u32,
            _ => u32::MAX,
        };
        check_int(desc, value, max)
    }
}

fn render_int(value: &FieldValue) -> String {
    match value {
        FieldValue::Int(value) => value.to_string(),
        other => format!("{other:?}"),
    }
}

fn check_int(desc: &FieldDescriptor, value: &FieldValue, max: u32) -> Result<(), Error> {
    match value {
        FieldValue::Int(value) if *value > max => Err(Error::ValueOutOfRange {
            field: desc.name,
            value: *value as u64,
        }),
        _ => Ok(()),
    }
}

struct VariableInt;

impl KindOps for VariableInt {
    fn count(&self, field: &Field) -> usize {
        match field.int() {
            Some(value) => tag_len(&field.desc) + varint::encoded_len(value),
            None => 0,
        }
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let value = int_of(field)?;
        put_tag(&field.desc, bytes);
        varint::encode(value, bytes).ok_or(Error::ValueTooLarge {
            field: field.desc.name,
            len: value as usize,
        })?;
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let value = reader.read_variable_int(field.desc.name)?;
        field.value = Some(FieldValue::Int(value));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        render_int(value)
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        check_int(desc, value, varint::MAX)
    }
}

/// Bits live in their parent byte, so they have no wire size of their own.
struct BitField;

impl KindOps for BitField {
    fn count(&self, _field: &Field) -> usize {
        0
    }

    fn pack(&self, _field: &Field, _bytes: &mut BytesMut) -> Result<(), Error> {
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let value = (reader.parent >> field.desc.bit_offset) & field.desc.bit_mask();
        field.value = Some(FieldValue::Int(value));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        render_int(value)
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        check_int(desc, value, desc.bit_mask())
    }
}

struct FlagByte;

impl KindOps for FlagByte {
    fn count(&self, field: &Field) -> usize {
        usize::from(field.exists())
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        bytes.put_u8(int_of(field)? as u8);
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let value = reader.read_u8(field.desc.name)?;
        field.value = Some(FieldValue::Int(value as u32));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        match value {
            FieldValue::Int(value) => format!("0x{value:02x}"),
            other => format!("{other:?}"),
        }
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        check_int(desc, value, u8::MAX as u32)
    }
}

fn render_bytes(value: &FieldValue, options: &PrintOptions) -> String {
    let FieldValue::Bytes(bytes) = value else {
        return format!("{value:?}");
    };
    if bytes.len() > options.hex_limit {
        format!(
            "{}...({} bytes)",
            hex::encode(&bytes[..options.hex_limit]),
            bytes.len()
        )
    } else {
        hex::encode(bytes)
    }
}

struct BinaryData;

impl KindOps for BinaryData {
    fn count(&self, field: &Field) -> usize {
        match &field.value {
            Some(value) => tag_len(&field.desc) + 2 + value.len(),
            None => 0,
        }
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::Bytes(data)) = &field.value else {
            return Err(mismatch(field));
        };
        put_tag(&field.desc, bytes);
        encode_binary_data(data, bytes);
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let data = reader.read_binary_data(field.desc.name)?;
        field.value = Some(FieldValue::Bytes(data));
        Ok(())
    }

    fn render(&self, value: &FieldValue, options: &PrintOptions) -> String {
        render_bytes(value, options)
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        if value.len() > MAX_PREFIXED_LEN {
            return Err(Error::ValueOutOfRange {
                field: desc.name,
                value: value.len() as u64,
            });
        }
        Ok(())
    }
}

/// Binary data whose bytes must be UTF-8.
struct Utf8String;

impl KindOps for Utf8String {
    fn count(&self, field: &Field) -> usize {
        BinaryData.count(field)
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::Text(text)) = &field.value else {
            return Err(mismatch(field));
        };
        put_tag(&field.desc, bytes);
        encode_string(text, bytes);
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let text = reader.read_string(field.desc.name)?;
        field.value = Some(FieldValue::Text(text));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        match value {
            FieldValue::Text(text) => text.clone(),
            other => format!("{other:?}"),
        }
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        match value {
            FieldValue::Text(text) => check_string(desc, text),
            _ => Ok(()),
        }
    }
}

struct Payload;

impl KindOps for Payload {
    fn count(&self, field: &Field) -> usize {
        field.len()
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::Bytes(data)) = &field.value else {
            return Err(mismatch(field));
        };
        bytes.put_slice(data);
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let size = reader.in_range();
        let data = reader.read_binary_data_with_size(field.desc.name, size)?;
        field.value = Some(FieldValue::Bytes(data));
        Ok(())
    }

    fn render(&self, value: &FieldValue, options: &PrintOptions) -> String {
        render_bytes(value, options)
    }
}

struct StringPairs;

impl KindOps for StringPairs {
    fn count(&self, field: &Field) -> usize {
        let Some(FieldValue::StringPairs(pairs)) = &field.value else {
            return 0;
        };
        let tag = tag_len(&field.desc);
        pairs
            .iter()
            .map(|(name, value)| tag + 2 + name.len() + 2 + value.len())
            .sum()
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::StringPairs(pairs)) = &field.value else {
            return Err(mismatch(field));
        };
        for (name, value) in pairs {
            put_tag(&field.desc, bytes);
            encode_string(name, bytes);
            encode_string(value, bytes);
        }
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let name = field.desc.name;
        let read_pair = |reader: &mut Reader<'_>| -> Result<(String, String), Error> {
            Ok((reader.read_string(name)?, reader.read_string(name)?))
        };
        if field.desc.property.is_some() {
            let pair = read_pair(reader)?;
            return push_occurrence(field, FieldValue::StringPairs, as_pairs, pair);
        }
        let mut pairs = Vec::new();
        while reader.in_range() > 0 {
            pairs.push(read_pair(reader)?);
        }
        field.value = Some(FieldValue::StringPairs(pairs));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        match value {
            FieldValue::StringPairs(pairs) => pairs
                .iter()
                .map(|(name, value)| format!("{name}:{value}"))
                .collect::<Vec<_>>()
                .join(";"),
            other => format!("{other:?}"),
        }
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        if let FieldValue::StringPairs(pairs) = value {
            for (name, value) in pairs {
                check_string(desc, name)?;
                check_string(desc, value)?;
            }
        }
        Ok(())
    }

    fn repeatable(&self) -> bool {
        true
    }
}

fn as_pairs(value: &mut FieldValue) -> Option<&mut Vec<(String, String)>> {
    match value {
        FieldValue::StringPairs(pairs) => Some(pairs),
        _ => None,
    }
}

fn as_ints(value: &mut FieldValue) -> Option<&mut Vec<u32>> {
    match value {
        FieldValue::Ints(ints) => Some(ints),
        _ => None,
    }
}

struct VariableIntVec;

impl KindOps for VariableIntVec {
    fn count(&self, field: &Field) -> usize {
        let Some(FieldValue::Ints(ints)) = &field.value else {
            return 0;
        };
        let tag = tag_len(&field.desc);
        ints.iter().map(|value| tag + varint::encoded_len(*value)).sum()
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::Ints(ints)) = &field.value else {
            return Err(mismatch(field));
        };
        for value in ints {
            put_tag(&field.desc, bytes);
            varint::encode(*value, bytes).ok_or(Error::ValueTooLarge {
                field: field.desc.name,
                len: *value as usize,
            })?;
        }
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let name = field.desc.name;
        if field.desc.property.is_some() {
            let value = reader.read_variable_int(name)?;
            return push_occurrence(field, FieldValue::Ints, as_ints, value);
        }
        let mut ints = Vec::new();
        while reader.in_range() > 0 {
            ints.push(reader.read_variable_int(name)?);
        }
        field.value = Some(FieldValue::Ints(ints));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        match value {
            FieldValue::Ints(ints) => ints
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(";"),
            other => format!("{other:?}"),
        }
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        if let FieldValue::Ints(ints) = value {
            for value in ints {
                check_int(desc, &FieldValue::Int(*value), varint::MAX)?;
            }
        }
        Ok(())
    }

    fn repeatable(&self) -> bool {
        true
    }
}

struct TopicFilters;

impl KindOps for TopicFilters {
    fn count(&self, field: &Field) -> usize {
        match &field.value {
            Some(FieldValue::TopicFilters(filters)) => filters
                .iter()
                .map(|(filter, _)| 2 + filter.len() + 1)
                .sum(),
            _ => 0,
        }
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::TopicFilters(filters)) = &field.value else {
            return Err(mismatch(field));
        };
        for (filter, options) in filters {
            encode_string(filter, bytes);
            bytes.put_u8(*options);
        }
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let name = field.desc.name;
        let mut filters = Vec::new();
        while reader.in_range() > 0 {
            let filter = reader.read_string(name)?;
            let options = reader.read_u8(name)?;
            filters.push((filter, options));
        }
        field.value = Some(FieldValue::TopicFilters(filters));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        match value {
            FieldValue::TopicFilters(filters) => filters
                .iter()
                .map(|(filter, options)| format!("{filter}:{options}"))
                .collect::<Vec<_>>()
                .join(";"),
            other => format!("{other:?}"),
        }
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        if let FieldValue::TopicFilters(filters) = value {
            for (filter, _) in filters {
                check_string(desc, filter)?;
            }
        }
        Ok(())
    }
}

struct Utf8Vec;

impl KindOps for Utf8Vec {
    fn count(&self, field: &Field) -> usize {
        match &field.value {
            Some(FieldValue::Texts(texts)) => texts.iter().map(|text| 2 + text.len()).sum(),
            _ => 0,
        }
    }

    fn pack(&self, field: &Field, bytes: &mut BytesMut) -> Result<(), Error> {
        let Some(FieldValue::Texts(texts)) = &field.value else {
            return Err(mismatch(field));
        };
        for text in texts {
            encode_string(text, bytes);
        }
        Ok(())
    }

    fn unpack(&self, field: &mut Field, reader: &mut Reader<'_>) -> Result<(), Error> {
        let mut texts = Vec::new();
        while reader.in_range() > 0 {
            texts.push(reader.read_string(field.desc.name)?);
        }
        field.value = Some(FieldValue::Texts(texts));
        Ok(())
    }

    fn render(&self, value: &FieldValue, _options: &PrintOptions) -> String {
        match value {
            FieldValue::Texts(texts) => texts.join(";"),
            other => format!("{other:?}"),
        }
    }

    fn validate(&self, desc: &FieldDescriptor, value: &FieldValue) -> Result<(), Error> {
        if let FieldValue::Texts(texts) = value {
            for text in texts {
                check_string(desc, text)?;
            }
        }
        Ok(())
    }
}

/// The block marker owns no bytes; the unpack pipeline scans the block.
struct PropertyBlock;

impl KindOps for PropertyBlock {
    fn count(&self, _field: &Field) -> usize {
        0
    }

    fn pack(&self, _field: &Field, _bytes: &mut BytesMut) -> Result<(), Error> {
        Ok(())
    }

    fn unpack(&self, _field: &mut Field, _reader: &mut Reader<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn render(&self, _value: &FieldValue, _options: &PrintOptions) -> String {
        String::new()
    }
}
