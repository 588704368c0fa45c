use super::*;
use crate::codec::{
    AuthenticateReason, DisconnectReason, FieldKind, QoS, SubscribeAckReason, UnsubscribeAckReason,
};

fn values(ctx: &PacketContext) -> Vec<(&'static str, Option<FieldValue>)> {
    ctx.fields()
        .iter()
        .map(|field| (field.name(), field.value().cloned()))
        .collect()
}

fn round_trip(mut ctx: PacketContext) -> PacketContext {
    let bytes = ctx.pack().unwrap();
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.cursor(), bytes.len());
    assert_eq!(values(&decoded), values(&ctx), "{}", ctx.name());
    decoded
}

const ALL_TYPES: [PacketType; 15] = [
    PacketType::Connect,
    PacketType::ConnectAck,
    PacketType::Publish,
    PacketType::PublishAck,
    PacketType::PublishReceived,
    PacketType::PublishRelease,
    PacketType::PublishComplete,
    PacketType::Subscribe,
    PacketType::SubscribeAck,
    PacketType::Unsubscribe,
    PacketType::UnsubscribeAck,
    PacketType::PingRequest,
    PacketType::PingResponse,
    PacketType::Disconnect,
    PacketType::Authenticate,
];

#[test]
fn test_spec_table_matches_packet_types() {
    for packet_type in ALL_TYPES {
        let spec = spec(packet_type);
        assert_eq!(spec.packet_type, packet_type);
        assert_eq!(spec.name, packet_type.name());
        let ctx = new(packet_type).unwrap();
        assert_eq!(ctx.packet_type(), packet_type);
    }
}

#[test]
fn test_schemas_are_consistent() {
    for packet_type in ALL_TYPES {
        let template = spec(packet_type).template;
        let name = packet_type.name();
        assert_eq!(template[FIXED_HEADER].kind, FieldKind::Flags, "{name}");
        assert_eq!(template[PACKET_TYPE].name, "packet_type", "{name}");

        for (idx, desc) in template.iter().enumerate() {
            if let Some(flag) = desc.flag {
                assert!(flag < idx, "{name}.{} gated by a later field", desc.name);
            }
            match desc.kind {
                FieldKind::Bits => {
                    let parent = desc.link.unwrap();
                    assert_eq!(template[parent].kind, FieldKind::Flags, "{name}.{}", desc.name);
                    assert!(desc.bit_offset + desc.bit_width <= 8, "{name}.{}", desc.name);
                }
                FieldKind::Vbi if desc.link.is_some() => {
                    let last = desc.link.unwrap();
                    assert!(last >= idx && last < template.len(), "{name}.{}", desc.name);
                }
                FieldKind::Properties => {
                    let length = desc.link.unwrap();
                    assert_eq!(length + 1, idx, "{name}: block follows its length");
                    assert!(template[length].is_computed());
                    for (offset, tag) in desc.tags.iter().enumerate() {
                        let field = &template[idx + 1 + offset];
                        assert_eq!(field.property, Some(*tag), "{name}.{}", field.name);
                    }
                    assert_eq!(
                        template[length].link,
                        Some(idx + desc.tags.len()),
                        "{name}: property length covers exactly the tagged fields"
                    );
                }
                _ => {}
            }
        }

        let mut names: Vec<_> = template.iter().map(|desc| desc.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), template.len(), "{name}: duplicate field names");
    }
}

#[test]
fn test_index_constants_name_their_fields() {
    let ctx = new(PacketType::Connect).unwrap();
    for (idx, name) in [
        (connect::CLEAN_START, "clean_start"),
        (connect::KEEP_ALIVE, "keep_alive"),
        (connect::CLIENT_IDENTIFIER, "client_identifier"),
        (connect::WILL_USER_PROPERTIES, "will_user_properties"),
        (connect::PASSWORD, "password"),
    ] {
        assert_eq!(ctx.field_index(name), Some(idx));
    }
    let ctx = new(PacketType::Publish).unwrap();
    assert_eq!(ctx.field_index("payload"), Some(publish::PAYLOAD));
    assert_eq!(ctx.field_index("qos"), Some(publish::QOS));
    let ctx = new(PacketType::ConnectAck).unwrap();
    assert_eq!(
        ctx.field_index("authentication_data"),
        Some(connack::AUTHENTICATION_DATA)
    );
}

#[test]
fn test_default_connect() {
    let mut ctx = new(PacketType::Connect).unwrap();
    let bytes = ctx.pack().unwrap();
    assert_eq!(
        &bytes[..],
        [0x10, 0x0D, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
    );

    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.str(connect::PROTOCOL_NAME), Some("MQTT"));
    assert_eq!(decoded.int(connect::PROTOCOL_VERSION), Some(5));
    assert_eq!(decoded.int(connect::CONNECT_FLAGS), Some(0));
    assert_eq!(decoded.int(connect::KEEP_ALIVE), Some(0));
    assert_eq!(decoded.int(connect::PROPERTY_LENGTH), Some(0));
    assert_eq!(decoded.str(connect::CLIENT_IDENTIFIER), Some(""));
    for idx in [
        connect::SESSION_EXPIRY_INTERVAL,
        connect::USER_PROPERTIES,
        connect::WILL_PROPERTY_LENGTH,
        connect::WILL_TOPIC,
        connect::WILL_PAYLOAD,
        connect::USERNAME,
        connect::PASSWORD,
    ] {
        assert!(!decoded.exists(idx), "{}", decoded.fields()[idx].name());
    }
    assert_eq!(values(&decoded), values(&ctx));
}

#[test]
fn test_connect_flag_bits() {
    let mut ctx = new(PacketType::Connect).unwrap();
    ctx.set_int(connect::CLEAN_START, 1).unwrap();
    ctx.set_int(connect::WILL_FLAG, 1).unwrap();
    assert_eq!(ctx.int(connect::CONNECT_FLAGS), Some(0x06));

    let mut bytes = new(PacketType::Connect).unwrap().pack().unwrap().to_vec();
    bytes[9] = 0x02;
    let decoded = decode(&bytes).unwrap();
    assert_eq!(decoded.int(connect::CLEAN_START), Some(1));
    for idx in [
        connect::RESERVED,
        connect::WILL_FLAG,
        connect::WILL_QOS,
        connect::WILL_RETAIN,
        connect::PASSWORD_FLAG,
        connect::USERNAME_FLAG,
    ] {
        assert_eq!(decoded.int(idx), Some(0));
    }
}

#[test]
fn test_will_flag_governs_will_fields() {
    let mut ctx = new(PacketType::Connect).unwrap();
    connect::set_client_identifier(&mut ctx, "client").unwrap();
    let without_will = ctx.pack().unwrap();

    connect::set_will_topic(&mut ctx, "status/client").unwrap();
    connect::set_will_payload(&mut ctx, &b"offline"[..]).unwrap();
    ctx.set_int(connect::WILL_DELAY_INTERVAL, 5).unwrap();
    ctx.set_string_pairs(
        connect::WILL_USER_PROPERTIES,
        vec![("k".into(), "v".into())],
    )
    .unwrap();
    let with_will = ctx.pack().unwrap();
    assert!(with_will.len() > without_will.len());
    let decoded = round_trip(ctx.clone());
    assert_eq!(decoded.str(connect::WILL_TOPIC), Some("status/client"));
    assert_eq!(decoded.int(connect::WILL_DELAY_INTERVAL), Some(5));

    ctx.set_int(connect::WILL_FLAG, 0).unwrap();
    for idx in connect::WILL_PROPERTY_LENGTH..=connect::WILL_PAYLOAD {
        assert!(!ctx.exists(idx), "{}", ctx.fields()[idx].name());
    }
    assert_eq!(ctx.pack().unwrap(), without_will);
}

#[test]
fn test_full_connect_round_trip() {
    let mut ctx = new(PacketType::Connect).unwrap();
    connect::set_client_identifier(&mut ctx, "device-42").unwrap();
    connect::set_keep_alive(&mut ctx, 30).unwrap();
    connect::set_clean_start(&mut ctx, true).unwrap();
    connect::set_username(&mut ctx, "user").unwrap();
    connect::set_password(&mut ctx, &b"pass"[..]).unwrap();
    connect::set_will_topic(&mut ctx, "will").unwrap();
    connect::set_will_payload(&mut ctx, &b""[..]).unwrap();
    connect::set_will_qos(&mut ctx, QoS::ExactlyOnce).unwrap();
    connect::set_will_retain(&mut ctx, true).unwrap();
    ctx.set_int(connect::SESSION_EXPIRY_INTERVAL, 3600).unwrap();
    ctx.set_int(connect::RECEIVE_MAXIMUM, 10).unwrap();
    ctx.set_int(connect::REQUEST_PROBLEM_INFORMATION, 1).unwrap();
    ctx.set_str(connect::AUTHENTICATION_METHOD, "PLAIN").unwrap();
    ctx.set_bytes(connect::AUTHENTICATION_DATA, &b"\x00u\x00p"[..])
        .unwrap();
    ctx.set_string_pairs(
        connect::USER_PROPERTIES,
        vec![("a".into(), "1".into()), ("a".into(), "2".into())],
    )
    .unwrap();
    ctx.set_str(connect::CONTENT_TYPE, "text/plain").unwrap();
    ctx.set_bytes(connect::CORRELATION_DATA, &b"id"[..]).unwrap();

    let decoded = round_trip(ctx);
    assert_eq!(decoded.int(connect::CONNECT_FLAGS), Some(0b1111_0110));
    assert_eq!(
        decoded.string_pairs(connect::USER_PROPERTIES).unwrap().len(),
        2
    );
}

#[test]
fn test_round_trip_every_packet_type() {
    let mut connack = new(PacketType::ConnectAck).unwrap();
    connack::set_session_present(&mut connack, true).unwrap();
    connack
        .set_str(connack::ASSIGNED_CLIENT_IDENTIFIER, "auto-1")
        .unwrap();
    connack.set_int(connack::SERVER_KEEP_ALIVE, 120).unwrap();
    round_trip(connack);

    let mut publish = new(PacketType::Publish).unwrap();
    publish::set_topic(&mut publish, "a/b").unwrap();
    publish::set_qos(&mut publish, QoS::AtLeastOnce).unwrap();
    publish::set_packet_identifier(&mut publish, 77).unwrap();
    publish::set_retain(&mut publish, true).unwrap();
    publish.set_str(publish::RESPONSE_TOPIC, "reply/here").unwrap();
    publish::set_payload(&mut publish, vec![7u8; 300]).unwrap();
    round_trip(publish);

    for mut ack in [
        puback::new(1).unwrap(),
        pubrec::new(2).unwrap(),
        pubrel::new(3).unwrap(),
        pubcomp::new(4).unwrap(),
    ] {
        ack.set_string_pairs(puback::USER_PROPERTIES, vec![("x".into(), "y".into())])
            .unwrap();
        round_trip(ack);
    }

    let mut subscribe = new(PacketType::Subscribe).unwrap();
    subscribe::set_packet_identifier(&mut subscribe, 9).unwrap();
    subscribe::add_topic_filter(&mut subscribe, "sport/#", 1).unwrap();
    round_trip(subscribe);

    let mut suback = new(PacketType::SubscribeAck).unwrap();
    suback::set_reasons(&mut suback, &[SubscribeAckReason::GrantedQoSTwo]).unwrap();
    round_trip(suback);

    let mut unsubscribe = new(PacketType::Unsubscribe).unwrap();
    unsubscribe::set_packet_identifier(&mut unsubscribe, 9).unwrap();
    unsubscribe::add_topic_filter(&mut unsubscribe, "sport/#").unwrap();
    round_trip(unsubscribe);

    let mut unsuback = new(PacketType::UnsubscribeAck).unwrap();
    unsuback::set_reasons(&mut unsuback, &[UnsubscribeAckReason::Success]).unwrap();
    round_trip(unsuback);

    round_trip(new(PacketType::PingRequest).unwrap());
    round_trip(new(PacketType::PingResponse).unwrap());

    let mut disconnect = new(PacketType::Disconnect).unwrap();
    disconnect::set_reason(&mut disconnect, DisconnectReason::SessionTakenOver).unwrap();
    round_trip(disconnect);

    let mut auth = new(PacketType::Authenticate).unwrap();
    auth::set_exchange(&mut auth, AuthenticateReason::ReAuthenticate, "X", &b"1"[..]).unwrap();
    round_trip(auth);
}

#[test]
fn test_connack_duplicate_property() {
    let bytes = [
        0x20, 0x0D, 0x00, 0x00, 0x0A, 0x11, 0x00, 0x00, 0x00, 0x01, 0x11, 0x00, 0x00, 0x00,
        0x02,
    ];
    let err = decode(&bytes).unwrap_err();
    assert!(err.is_malformed());
    assert!(matches!(
        err,
        Error::DuplicateProperty {
            field: "session_expiry_interval"
        }
    ));
}

#[test]
fn test_user_properties_may_repeat() {
    let bytes = [
        0x20, 0x0F, 0x00, 0x00, 0x0C, 0x26, 0x00, 0x01, b'a', 0x00, 0x00, 0x26, 0x00, 0x01,
        b'b', 0x00, 0x00,
    ];
    let ctx = decode(&bytes).unwrap();
    assert_eq!(
        ctx.string_pairs(connack::USER_PROPERTIES),
        Some(&[("a".to_owned(), String::new()), ("b".to_owned(), String::new())][..])
    );
}

#[test]
fn test_publish_needs_packet_identifier() {
    let mut ctx = new(PacketType::Publish).unwrap();
    publish::set_topic(&mut ctx, "t").unwrap();
    publish::set_qos(&mut ctx, QoS::AtLeastOnce).unwrap();
    assert!(matches!(
        ctx.pack(),
        Err(Error::Protocol {
            packet: "PUBLISH",
            ..
        })
    ));

    publish::set_packet_identifier(&mut ctx, 1).unwrap();
    assert!(ctx.pack().is_ok());
}

#[test]
fn test_decode_dispatches_on_first_byte() {
    assert_eq!(
        decode(&[0xD0, 0x00]).unwrap().packet_type(),
        PacketType::PingResponse
    );
    assert!(matches!(
        decode(&[0x00, 0x00]),
        Err(Error::InvalidPacketType(0))
    ));
    assert!(matches!(decode(&[]), Err(Error::Truncated { .. })));
}

#[test]
fn test_truncated_inputs_never_decode() {
    let mut ctx = new(PacketType::Connect).unwrap();
    connect::set_client_identifier(&mut ctx, "abc").unwrap();
    connect::set_username(&mut ctx, "user").unwrap();
    connect::set_will_topic(&mut ctx, "w").unwrap();
    connect::set_will_payload(&mut ctx, &b"p"[..]).unwrap();
    ctx.set_int(connect::MESSAGE_EXPIRY_INTERVAL, 9).unwrap();
    let bytes = ctx.pack().unwrap();

    for len in 0..bytes.len() {
        let err = decode(&bytes[..len]).unwrap_err();
        assert!(err.is_malformed(), "prefix of {len} bytes: {err}");
    }
    let mut longer = bytes.to_vec();
    longer.push(0);
    assert!(matches!(
        decode(&longer),
        Err(Error::TrailingBytes { extra: 1 })
    ));
}
