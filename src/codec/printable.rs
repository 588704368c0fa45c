use super::{context::PacketContext, schema::FieldKind};

/// Controls the debug dump of a [`PacketContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintOptions {
    /// List absent fields as `name:-` instead of leaving them out.
    pub show_absent: bool,
    /// Opaque byte values longer than this are cut short in the dump.
    pub hex_limit: usize,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            show_absent: false,
            hex_limit: 16,
        }
    }
}

impl PacketContext {
    pub fn print_options(&self) -> PrintOptions {
        self.print_options
    }

    pub fn set_print_options(&mut self, options: PrintOptions) {
        if self.print_options == options {
            return;
        }
        self.print_options = options;
        self.dump = None;
        for field in &mut self.fields {
            field.printable = None;
        }
    }

    /// One `name:value` line per field. Renderings are cached per field and
    /// only redone for fields changed since the last call.
    pub fn printable(&mut self) -> &str {
        if self.dump.is_none() {
            let options = self.print_options;
            let mut lines = Vec::with_capacity(self.fields.len());
            for field in &mut self.fields {
                if field.desc.kind == FieldKind::Properties {
                    continue;
                }
                let Some(value) = &field.value else {
                    if options.show_absent {
                        lines.push(format!("{}:-", field.desc.name));
                    }
                    continue;
                };
                let kind = field.desc.kind;
                let rendered = field
                    .printable
                    .get_or_insert_with(|| kind.ops().render(value, &options));
                lines.push(format!("{}:{}", field.desc.name, rendered));
            }
            self.dump = Some(lines.join("\n"));
        }
        self.dump.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::PrintOptions;
    use crate::codec::PacketContext;
    use crate::packets::{connect, publish};

    #[test]
    fn test_printable_lists_existing_fields() {
        let mut ctx = PacketContext::new(&publish::TEMPLATE).unwrap();
        ctx.set_str(publish::TOPIC_NAME, "a/b").unwrap();
        ctx.set_string_pairs(
            publish::USER_PROPERTIES,
            vec![("k".into(), "v".into()), ("x".into(), "y".into())],
        )
        .unwrap();
        ctx.set_bytes(publish::PAYLOAD, &b"hello"[..]).unwrap();

        let dump = ctx.printable().to_owned();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "fixed_header:0x30");
        assert!(lines.contains(&"topic_name:a/b"));
        assert!(lines.contains(&"user_properties:k:v;x:y"));
        assert!(lines.contains(&"payload:68656c6c6f"));
        assert!(!dump.contains("packet_identifier"));
        assert!(!dump.ends_with('\n'));
    }

    #[test]
    fn test_printable_cache_follows_mutation() {
        let mut ctx = PacketContext::new(&connect::TEMPLATE).unwrap();
        assert!(ctx.printable().contains("keep_alive:0"));
        ctx.set_int(connect::KEEP_ALIVE, 30).unwrap();
        assert!(ctx.printable().contains("keep_alive:30"));
        ctx.set_int(connect::CLEAN_START, 1).unwrap();
        assert!(ctx.printable().contains("connect_flags:0x02"));
    }

    #[test]
    fn test_printable_options() {
        let mut ctx = PacketContext::new(&connect::TEMPLATE).unwrap();
        assert!(!ctx.printable().contains("username:-"));

        ctx.set_print_options(PrintOptions {
            show_absent: true,
            hex_limit: 4,
        });
        assert!(ctx.printable().contains("username:-"));

        ctx.set_int(connect::PASSWORD_FLAG, 1).unwrap();
        ctx.set_bytes(connect::PASSWORD, vec![0xAB; 10]).unwrap();
        assert!(ctx
            .printable()
            .contains("password:abababab...(10 bytes)"));
    }
}
