use super::{
    context::PacketContext,
    schema::{FieldKind, FieldValue},
    types::Error,
    varint,
};
use crate::packets;
use bytes::{Bytes, BytesMut};
use log::{debug, warn};

impl PacketContext {
    /// Runs the packet type's pack-time rules, then encodes every existing
    /// field. On error the context should be dropped, not packed again.
    pub fn pack(&mut self) -> Result<Bytes, Error> {
        if let Some(prepare) = packets::spec(self.packet_type).prepare {
            if let Err(err) = prepare(self) {
                warn!("{}: pack rejected: {}", self.name, err);
                return Err(err);
            }
        }
        self.pack_fields()
    }

    /// Encodes without any packet-level rules. Fields the schema always
    /// carries must still be present.
    pub fn pack_fields(&mut self) -> Result<Bytes, Error> {
        if let Some(field) = self
            .fields
            .iter()
            .find(|field| {
                field.desc.is_required() && !field.desc.is_computed() && !field.exists()
            })
        {
            warn!("{}: {} is absent", self.name, field.desc.name);
            return Err(Error::MissingField {
                field: field.desc.name,
            });
        }
        let total = self.compute_lengths()?;

        self.buffer = BytesMut::with_capacity(total);
        for field in &self.fields {
            if !field.exists() {
                continue;
            }
            if let Err(err) = field.desc.kind.ops().pack(field, &mut self.buffer) {
                warn!("{}: cannot pack {}: {}", self.name, field.desc.name, err);
                return Err(err);
            }
        }

        self.cursor = self.buffer.len();
        debug_assert_eq!(self.cursor, total);
        debug!("{}: packed {} bytes", self.name, self.cursor);
        Ok(self.buffer.split().freeze())
    }

    /// Fills in every length prefix and returns the packet size. Lengths the
    /// packet always carries are filled in even when absent.
    ///
    /// Walks backwards so that an inner length (a property block) is final
    /// before the outer length that covers it is summed.
    fn compute_lengths(&mut self) -> Result<usize, Error> {
        for idx in (0..self.fields.len()).rev() {
            let desc = self.fields[idx].desc;
            if !desc.is_computed() || !(self.fields[idx].exists() || desc.is_required()) {
                continue;
            }
            let last = desc.link.unwrap_or(idx);
            let len: usize = self
                .fields
                .get(idx + 1..=last)
                .unwrap_or(&[])
                .iter()
                .filter(|field| field.exists() && field.desc.kind != FieldKind::Bits)
                .map(|field| field.wire_len)
                .sum();
            let value = u32::try_from(len)
                .ok()
                .filter(|value| *value <= varint::MAX)
                .ok_or(Error::ValueTooLarge {
                    field: desc.name,
                    len,
                });
            let value = match value {
                Ok(value) => value,
                Err(err) => {
                    warn!("{}: {}", self.name, err);
                    return Err(err);
                }
            };
            self.store(idx, FieldValue::Int(value));
        }

        Ok(self
            .fields
            .iter()
            .filter(|field| field.exists() && field.desc.kind != FieldKind::Bits)
            .map(|field| field.wire_len)
            .sum())
    }
}
