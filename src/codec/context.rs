use super::{
    printable::PrintOptions,
    schema::{Field, FieldDefault, FieldDescriptor, FieldKind, FieldValue},
    types::{Error, PacketType},
};
use bytes::{Bytes, BytesMut};
use log::warn;

/// One packet being built or taken apart: a private copy of a packet-type
/// schema with the current value of every field.
///
/// Not synchronised; use one context per in-flight packet.
#[derive(Debug, Clone)]
pub struct PacketContext {
    pub(crate) packet_type: PacketType,
    pub(crate) name: &'static str,
    pub(crate) fields: Vec<Field>,
    /// Pack output, only held while a pack is running.
    pub(crate) buffer: BytesMut,
    /// Bytes written by the last pack or consumed by the last unpack.
    pub(crate) cursor: usize,
    pub(crate) dump: Option<String>,
    pub(crate) print_options: PrintOptions,
}

/// The packet type sits in the high nibble of the first field's default.
fn packet_type_of(template: &[FieldDescriptor]) -> Result<PacketType, Error> {
    let first = template.first().ok_or(Error::InvalidPacketType(0))?;
    let byte = match (first.kind, first.default) {
        (FieldKind::Flags, FieldDefault::Int(byte)) => byte as u8,
        _ => return Err(Error::InvalidPacketType(0)),
    };
    let nibble = byte >> 4;
    PacketType::try_from(nibble).map_err(|_| Error::InvalidPacketType(nibble))
}

impl PacketContext {
    /// Context for encoding, every field at its schema default.
    pub fn new(template: &'static [FieldDescriptor]) -> Result<Self, Error> {
        let mut ctx = Self::with_fields(template, template.iter().map(Field::with_default))?;
        for idx in 0..ctx.fields.len() {
            if ctx.fields[idx].desc.kind == FieldKind::Flags {
                ctx.spread_bits(idx);
            }
        }
        for field in &mut ctx.fields {
            field.wire_len = field.desc.kind.ops().count(field);
        }
        Ok(ctx)
    }

    /// Context for decoding: nothing exists until the bytes say so.
    pub(crate) fn blank(template: &'static [FieldDescriptor]) -> Result<Self, Error> {
        Self::with_fields(template, template.iter().map(Field::blank))
    }

    fn with_fields(
        template: &'static [FieldDescriptor],
        fields: impl Iterator<Item = Field>,
    ) -> Result<Self, Error> {
        let packet_type = packet_type_of(template)?;
        Ok(Self {
            packet_type,
            name: packet_type.name(),
            fields: fields.collect(),
            buffer: BytesMut::new(),
            cursor: 0,
            dump: None,
            print_options: PrintOptions::default(),
        })
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fails with `WrongPacketType` unless this context holds a `packet_type`.
    pub fn expect_type(&self, packet_type: PacketType) -> Result<(), Error> {
        if self.packet_type != packet_type {
            return Err(Error::WrongPacketType {
                expected: packet_type.name(),
                actual: self.name,
            });
        }
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Result<&Field, Error> {
        self.fields.get(idx).ok_or(Error::UnknownField(idx))
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.desc.name == name)
    }

    /// Bytes consumed by the last unpack or produced by the last pack.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn exists(&self, idx: usize) -> bool {
        self.fields.get(idx).is_some_and(Field::exists)
    }

    pub fn value(&self, idx: usize) -> Option<&FieldValue> {
        self.fields.get(idx)?.value.as_ref()
    }

    pub fn int(&self, idx: usize) -> Option<u32> {
        self.fields.get(idx)?.int()
    }

    pub fn bytes(&self, idx: usize) -> Option<&Bytes> {
        match self.value(idx)? {
            FieldValue::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn str(&self, idx: usize) -> Option<&str> {
        match self.value(idx)? {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn strings(&self, idx: usize) -> Option<&[String]> {
        match self.value(idx)? {
            FieldValue::Texts(texts) => Some(texts),
            _ => None,
        }
    }

    pub fn string_pairs(&self, idx: usize) -> Option<&[(String, String)]> {
        match self.value(idx)? {
            FieldValue::StringPairs(pairs) => Some(pairs),
            _ => None,
        }
    }

    pub fn ints(&self, idx: usize) -> Option<&[u32]> {
        match self.value(idx)? {
            FieldValue::Ints(ints) => Some(ints),
            _ => None,
        }
    }

    pub fn topic_filters(&self, idx: usize) -> Option<&[(String, u8)]> {
        match self.value(idx)? {
            FieldValue::TopicFilters(filters) => Some(filters),
            _ => None,
        }
    }

    /// Stores a scalar. Setting a bit field also rewrites its parent flag
    /// byte, and setting a flag to zero drops every field it gates.
    pub fn set_int(&mut self, idx: usize, value: u32) -> Result<(), Error> {
        self.set_value(idx, FieldValue::Int(value))
    }

    pub fn set_bytes(&mut self, idx: usize, value: impl Into<Bytes>) -> Result<(), Error> {
        self.set_value(idx, FieldValue::Bytes(value.into()))
    }

    pub fn set_str(&mut self, idx: usize, value: impl Into<String>) -> Result<(), Error> {
        self.set_value(idx, FieldValue::Text(value.into()))
    }

    pub fn set_strings(&mut self, idx: usize, value: Vec<String>) -> Result<(), Error> {
        self.set_value(idx, FieldValue::Texts(value))
    }

    pub fn set_string_pairs(
        &mut self,
        idx: usize,
        value: Vec<(String, String)>,
    ) -> Result<(), Error> {
        self.set_value(idx, FieldValue::StringPairs(value))
    }

    pub fn set_ints(&mut self, idx: usize, value: Vec<u32>) -> Result<(), Error> {
        self.set_value(idx, FieldValue::Ints(value))
    }

    pub fn set_topic_filters(
        &mut self,
        idx: usize,
        value: Vec<(String, u8)>,
    ) -> Result<(), Error> {
        self.set_value(idx, FieldValue::TopicFilters(value))
    }

    pub fn set_value(&mut self, idx: usize, value: FieldValue) -> Result<(), Error> {
        let desc = self.field(idx)?.desc;
        if desc.kind == FieldKind::Properties || !value.fits(desc.kind) {
            return Err(Error::KindMismatch { field: desc.name });
        }
        if desc.is_computed() {
            return Err(Error::ComputedField { field: desc.name });
        }
        if let Some(flag) = desc.flag {
            let flag = self.field(flag)?;
            if flag.desc.kind != FieldKind::Vbi && !flag.is_set() {
                warn!("{}: {} set while {} is unset", self.name, desc.name, flag.desc.name);
                return Err(Error::DependencyUnset {
                    field: desc.name,
                    flag: flag.desc.name,
                });
            }
        }
        let ops = desc.kind.ops();
        if let Err(err) = ops.validate(&desc, &value) {
            warn!("{}: rejected value for {}: {}", self.name, desc.name, err);
            return Err(err);
        }

        self.store(idx, value);
        match desc.kind {
            FieldKind::Bits => self.fold_bits(idx),
            FieldKind::Flags => self.spread_bits(idx),
            _ => {}
        }
        self.sync_dependents(idx);
        Ok(())
    }

    /// Makes a field absent. Bit fields and flag bytes cannot be absent and
    /// drop back to zero instead. Computed lengths and fields the packet
    /// always carries refuse.
    pub fn reset(&mut self, idx: usize) -> Result<(), Error> {
        let desc = self.field(idx)?.desc;
        match desc.kind {
            FieldKind::Bits | FieldKind::Flags => self.set_int(idx, 0),
            _ if desc.is_computed() => Err(Error::ComputedField { field: desc.name }),
            _ if desc.is_required() => Err(Error::RequiredField { field: desc.name }),
            _ => self.drop_value(idx),
        }
    }

    /// Makes any non-bit field absent, computed or not. Packet validators
    /// use it to leave out an optional length prefix.
    pub(crate) fn drop_value(&mut self, idx: usize) -> Result<(), Error> {
        let desc = self.field(idx)?.desc;
        if desc.is_required() {
            return Err(Error::RequiredField { field: desc.name });
        }
        let field = &mut self.fields[idx];
        desc.kind.ops().release(field);
        self.dump = None;
        self.sync_dependents(idx);
        Ok(())
    }

    /// Releases every field value. The context keeps its schema and can be
    /// filled again.
    pub fn clear(&mut self) {
        for field in &mut self.fields {
            field.desc.kind.ops().release(field);
        }
        self.buffer.clear();
        self.cursor = 0;
        self.dump = None;
    }

    /// Gives an absent field a value without the setter's checks. Used by
    /// packet validators for computed lengths and default reason codes.
    pub(crate) fn materialize(&mut self, idx: usize, value: FieldValue) {
        if !self.exists(idx) {
            self.store(idx, value);
        }
    }

    pub(crate) fn store(&mut self, idx: usize, value: FieldValue) {
        let field = &mut self.fields[idx];
        let ops = field.desc.kind.ops();
        ops.release(field);
        field.value = Some(value);
        field.wire_len = ops.count(field);
        self.dump = None;
    }

    /// Writes a bit field's value into its parent byte.
    fn fold_bits(&mut self, idx: usize) {
        let desc = self.fields[idx].desc;
        let (Some(parent), Some(value)) = (desc.link, self.fields[idx].int()) else {
            return;
        };
        let mask = desc.bit_mask() << desc.bit_offset;
        let current = self.int(parent).unwrap_or(0);
        let byte = (current & !mask) | ((value << desc.bit_offset) & mask);
        self.store(parent, FieldValue::Int(byte));
    }

    /// Reads every bit field of a flag byte back out of it.
    fn spread_bits(&mut self, parent: usize) {
        let byte = self.int(parent).unwrap_or(0);
        for idx in 0..self.fields.len() {
            let desc = self.fields[idx].desc;
            if desc.kind == FieldKind::Bits && desc.link == Some(parent) {
                let value = (byte >> desc.bit_offset) & desc.bit_mask();
                self.store(idx, FieldValue::Int(value));
                self.sync_dependents(idx);
            }
        }
    }

    /// Applies a gating field's new state to the fields it gates: all of
    /// them go away when it is unset, and their length prefixes appear when
    /// it is set.
    fn sync_dependents(&mut self, flag: usize) {
        if self.fields[flag].desc.kind == FieldKind::Vbi {
            return;
        }
        let set = self.fields[flag].is_set();
        for idx in 0..self.fields.len() {
            if self.fields[idx].desc.flag != Some(flag) {
                continue;
            }
            if !set {
                if self.fields[idx].exists() {
                    let field = &mut self.fields[idx];
                    field.desc.kind.ops().release(field);
                    self.dump = None;
                    self.sync_dependents(idx);
                }
            } else if self.fields[idx].desc.is_computed() {
                self.materialize(idx, FieldValue::Int(0));
            }
        }
    }
}
