use super::{
    context::PacketContext,
    kinds::Reader,
    schema::{FieldDescriptor, FieldKind},
    types::{Error, PacketType},
};
use crate::packets;
use log::{debug, trace, warn};

impl PacketContext {
    /// Decodes one complete packet with the given schema. `bytes` is only
    /// borrowed for the duration of the call.
    pub fn from_bytes(template: &'static [FieldDescriptor], bytes: &[u8]) -> Result<Self, Error> {
        let mut ctx = Self::blank(template)?;
        if let Err(err) = ctx.unpack(bytes) {
            warn!("{}: unpack failed: {}", ctx.name, err);
            return Err(err);
        }
        debug!("{}: unpacked {} bytes", ctx.name, ctx.cursor);
        Ok(ctx)
    }

    fn unpack(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let first = bytes.first().copied().ok_or(Error::Truncated {
            field: "fixed_header",
        })?;
        let nibble = first >> 4;
        match PacketType::try_from(nibble) {
            Ok(packet_type) if packet_type == self.packet_type => {}
            Ok(packet_type) => {
                return Err(Error::WrongPacketType {
                    expected: self.name,
                    actual: packet_type.name(),
                })
            }
            Err(_) => return Err(Error::InvalidPacketType(nibble)),
        }

        self.unpack_fields(bytes)?;
        self.check_dependencies()?;
        if let Some(check) = packets::spec(self.packet_type).check {
            check(self)?;
        }
        Ok(())
    }

    /// One forward pass over the schema. Property fields are only reached
    /// through their block; gated fields are skipped while their flag is
    /// unset or their length range has run out.
    fn unpack_fields(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut reader = Reader::new(bytes);
        let mut ends: Vec<Option<usize>> = vec![None; self.fields.len()];

        let mut idx = 0;
        while idx < self.fields.len() {
            let desc = self.fields[idx].desc;
            if desc.property.is_some() {
                idx += 1;
                continue;
            }
            if let Some(flag) = desc.flag {
                let gate = &self.fields[flag];
                if gate.desc.kind == FieldKind::Vbi {
                    if ends[flag].is_some_and(|end| reader.position() >= end) {
                        trace!("{}: {} range ended before {}", self.name, gate.desc.name, desc.name);
                        idx = gate.desc.link.map_or(idx, |last| last.max(idx)) + 1;
                        continue;
                    }
                } else if desc.kind != FieldKind::Bits && !gate.is_set() {
                    idx += 1;
                    continue;
                }
            }

            reader.limit = self.range_end(&ends, idx, bytes.len());
            let result = match desc.kind {
                FieldKind::Properties => self.scan_properties(idx, &mut reader, &ends),
                FieldKind::Bits => {
                    reader.parent = desc.link.and_then(|parent| self.int(parent)).unwrap_or(0);
                    self.unpack_field(idx, &mut reader)
                }
                _ => self.unpack_field(idx, &mut reader),
            };
            if let Err(err) = result {
                self.cursor = reader.position();
                return Err(err);
            }

            if desc.is_computed() {
                let len = self.int(idx).unwrap_or(0) as usize;
                let end = reader.position() + len;
                if end > reader.limit {
                    warn!("{}: {} declares {} bytes past its range", self.name, desc.name, end - reader.limit);
                    return Err(if reader.limit == bytes.len() {
                        Error::Truncated { field: desc.name }
                    } else {
                        Error::Overrun {
                            field: desc.name,
                            declared: reader.limit,
                            consumed: end,
                        }
                    });
                }
                ends[idx] = Some(end);
            }
            idx += 1;
        }

        self.cursor = reader.position();
        let declared = self
            .fields
            .iter()
            .position(|field| field.desc.is_computed())
            .and_then(|idx| ends[idx])
            .unwrap_or(self.cursor);
        if self.cursor < declared {
            warn!("{}: {} of {} declared bytes left unread", self.name, declared - self.cursor, declared);
            return Err(Error::Underrun {
                declared,
                consumed: self.cursor,
            });
        }
        if self.cursor > declared {
            warn!("{}: read {} bytes past the declared end", self.name, self.cursor - declared);
            return Err(Error::Overrun {
                field: "remaining_length",
                declared,
                consumed: self.cursor,
            });
        }
        if bytes.len() > declared {
            return Err(Error::TrailingBytes {
                extra: bytes.len() - declared,
            });
        }
        Ok(())
    }

    /// End of the innermost length range that covers `idx`.
    fn range_end(&self, ends: &[Option<usize>], idx: usize, default: usize) -> usize {
        self.fields[..idx]
            .iter()
            .zip(ends)
            .filter_map(|(field, end)| match (field.desc.link, end) {
                (Some(last), Some(end)) if field.desc.is_computed() && last >= idx => Some(*end),
                _ => None,
            })
            .min()
            .unwrap_or(default)
    }

    fn unpack_field(&mut self, idx: usize, reader: &mut Reader<'_>) -> Result<(), Error> {
        let name = self.name;
        let field = &mut self.fields[idx];
        let ops = field.desc.kind.ops();
        let result = ops.unpack(field, reader).and_then(|()| match &field.value {
            Some(value) => ops.validate(&field.desc, value),
            None => Ok(()),
        });
        if let Err(err) = result {
            warn!("{}: bad {}: {}", name, field.desc.name, err);
            return Err(err);
        }
        field.wire_len = ops.count(field);
        field.printable = None;
        Ok(())
    }

    /// Reads tag/value pairs until the block's length runs out. The tag's
    /// position in the marker's tag list is the offset of its field after
    /// the marker.
    fn scan_properties(
        &mut self,
        marker: usize,
        reader: &mut Reader<'_>,
        ends: &[Option<usize>],
    ) -> Result<(), Error> {
        let desc = self.fields[marker].desc;
        let Some(end) = desc.link.and_then(|length| ends[length]) else {
            return Ok(());
        };
        reader.limit = end;

        while reader.position() < end {
            let tag = reader.read_u8(desc.name)?;
            let Some(offset) = desc.tags.iter().position(|id| *id as u8 == tag) else {
                warn!("{}: unknown property 0x{:02x}", self.name, tag);
                return Err(Error::UnknownProperty(tag));
            };
            let idx = marker + 1 + offset;
            let field = self.fields.get(idx).ok_or(Error::UnknownField(idx))?;
            if field.exists() && !field.desc.kind.ops().repeatable() {
                warn!("{}: property {} repeated", self.name, field.desc.name);
                return Err(Error::DuplicateProperty {
                    field: field.desc.name,
                });
            }
            self.unpack_field(idx, reader)?;
            if reader.position() > end {
                let name = self.fields[idx].desc.name;
                warn!("{}: {} runs past its property block", self.name, name);
                return Err(Error::Overrun {
                    field: name,
                    declared: end,
                    consumed: reader.position(),
                });
            }
        }
        Ok(())
    }

    /// No field may exist while the flag gating it is unset.
    fn check_dependencies(&self) -> Result<(), Error> {
        for field in &self.fields {
            let Some(flag) = field.desc.flag else {
                continue;
            };
            let gate = &self.fields[flag];
            if field.exists() && gate.desc.kind != FieldKind::Vbi && !gate.is_set() {
                warn!("{}: {} present without {}", self.name, field.desc.name, gate.desc.name);
                return Err(Error::DependencyUnset {
                    field: field.desc.name,
                    flag: gate.desc.name,
                });
            }
        }
        Ok(())
    }
}
