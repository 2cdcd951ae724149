// Request envelope tests: exact layouts, acknowledgement append, errors.

use oxibson::protocol::{
    MessageHeader, OP_GET_MORE, OP_INSERT, OP_QUERY, OP_UPDATE, get_more_message, insert_message,
    query_message, update_message,
};
use oxibson::{Error, Value, decode_all, decode_document, doc};

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[test]
fn query_packet_layout() {
    let request = query_message(0, "db.c", 0, -1, &doc! {"x": 1}, None).unwrap();
    let bytes = &request.bytes;

    // Header: total length, request id, responseTo, op code D4 07 00 00.
    assert_eq!(read_i32(bytes, 0) as usize, bytes.len());
    assert_eq!(read_i32(bytes, 4), request.request_id);
    assert_eq!(read_i32(bytes, 8), 0);
    assert_eq!(&bytes[12..16], &[0xD4, 0x07, 0x00, 0x00]);
    assert_eq!(read_i32(bytes, 12), OP_QUERY);

    // Body: options, collection cstring, skip, return, query document.
    assert_eq!(read_i32(bytes, 16), 0);
    assert_eq!(&bytes[20..25], b"db.c\x00");
    assert_eq!(read_i32(bytes, 25), 0);
    assert_eq!(read_i32(bytes, 29), -1);
    let (query, rest) = decode_document(&bytes[33..], true).unwrap();
    assert!(rest.is_empty());
    assert_eq!(query, doc! {"x": 1});
    assert_eq!(request.max_doc_size, bytes.len() - 33);
}

#[test]
fn query_field_selector_grows_max_doc_size() {
    let selector = doc! {"a": 1, "b": 1, "c": 1, "padding": "xxxxxxxxxxxxxxxx"};
    let request = query_message(4, "db.c", 2, 10, &doc! {"x": 1}, Some(&selector)).unwrap();
    let bytes = &request.bytes;
    assert_eq!(read_i32(bytes, 16), 4);
    assert_eq!(read_i32(bytes, 25), 2);
    assert_eq!(read_i32(bytes, 29), 10);
    let docs = decode_all(&bytes[33..]).unwrap();
    assert_eq!(docs, vec![doc! {"x": 1}, selector.clone()]);
    let selector_encoded = oxibson::encode_document(&selector, false).unwrap();
    assert_eq!(request.max_doc_size, selector_encoded.len());
}

#[test]
fn insert_packet_layout() {
    let docs = [doc! {"a": 1}, doc! {"b": "two"}];
    let request = insert_message("db.c", &docs, true, false, &doc! {}).unwrap();
    let bytes = &request.bytes;

    assert_eq!(read_i32(bytes, 0) as usize, bytes.len());
    assert_eq!(read_i32(bytes, 12), OP_INSERT);
    assert_eq!(read_i32(bytes, 16), 0);
    assert_eq!(&bytes[20..25], b"db.c\x00");
    let decoded = decode_all(&bytes[25..]).unwrap();
    assert_eq!(decoded, docs.to_vec());
}

#[test]
fn insert_applies_key_checks() {
    let err = insert_message("db.c", &[doc! {"$bad": 1}], true, false, &doc! {}).unwrap_err();
    assert!(matches!(err, Error::InvalidDocument(_)));
    assert!(insert_message("db.c", &[doc! {"$bad": 1}], false, false, &doc! {}).is_ok());
}

#[test]
fn insert_hoists_id_in_each_document() {
    let request = insert_message("db.c", &[doc! {"a": 1, "_id": 9}], false, false, &doc! {})
        .unwrap();
    let docs = decode_all(&request.bytes[25..]).unwrap();
    let keys: Vec<&str> = docs[0].keys().map(String::as_str).collect();
    assert_eq!(keys, ["_id", "a"]);
}

#[test]
fn empty_insert_is_invalid() {
    let err = insert_message("db.c", &[], false, false, &doc! {}).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidOperation(msg) if msg == "cannot do an empty bulk insert"
    ));
}

#[test]
fn safe_mode_appends_getlasterror_packet() {
    let request = insert_message(
        "db.c",
        &[doc! {"a": 1}],
        false,
        true,
        &doc! {"w": 2, "fsync": true},
    )
    .unwrap();
    let bytes = &request.bytes;

    let (first, _) = MessageHeader::parse(bytes).unwrap();
    let first_len = first.message_length as usize;
    assert!(first_len < bytes.len());
    assert_eq!(first.op_code, OP_INSERT);

    let second_bytes = &bytes[first_len..];
    let (second, _) = MessageHeader::parse(second_bytes).unwrap();
    assert_eq!(second.message_length as usize, second_bytes.len());
    assert_eq!(second.op_code, OP_QUERY);
    // Both packets share one request id.
    assert_eq!(second.request_id, first.request_id);
    assert_eq!(first.request_id, request.request_id);

    // Body: options 0, admin.$cmd, skip 0, limit -1, command document.
    assert_eq!(read_i32(second_bytes, 16), 0);
    assert_eq!(&second_bytes[20..31], b"admin.$cmd\x00");
    assert_eq!(read_i32(second_bytes, 31), 0);
    assert_eq!(read_i32(second_bytes, 35), -1);
    let (command, rest) = decode_document(&second_bytes[39..], true).unwrap();
    assert!(rest.is_empty());
    let keys: Vec<&str> = command.keys().map(String::as_str).collect();
    assert_eq!(keys, ["getlasterror", "w", "fsync"]);
    assert_eq!(command.get_i32("getlasterror"), Some(1));
    assert_eq!(command.get_i32("w"), Some(2));
    assert_eq!(command.get_bool("fsync"), Some(true));
}

#[test]
fn unsafe_mode_is_a_single_packet() {
    let request = insert_message("db.c", &[doc! {"a": 1}], false, false, &doc! {}).unwrap();
    let (header, _) = MessageHeader::parse(&request.bytes).unwrap();
    assert_eq!(header.message_length as usize, request.bytes.len());
}

#[test]
fn update_packet_layout_and_option_bits() {
    for (upsert, multi, expected) in [
        (false, false, 0),
        (true, false, 1),
        (false, true, 2),
        (true, true, 3),
    ] {
        let request = update_message(
            "db.c",
            upsert,
            multi,
            &doc! {"q": 1},
            &doc! {"$set": doc! {"x": 2}},
            false,
            &doc! {},
        )
        .unwrap();
        let bytes = &request.bytes;
        assert_eq!(read_i32(bytes, 0) as usize, bytes.len());
        assert_eq!(read_i32(bytes, 12), OP_UPDATE);
        assert_eq!(read_i32(bytes, 16), 0);
        assert_eq!(&bytes[20..25], b"db.c\x00");
        assert_eq!(read_i32(bytes, 25), expected);
        let docs = decode_all(&bytes[29..]).unwrap();
        assert_eq!(docs[0], doc! {"q": 1});
        assert_eq!(docs[1].get("$set"), Some(&Value::Document(doc! {"x": 2})));
    }
}

#[test]
fn update_safe_mode_shares_request_id() {
    let request = update_message(
        "db.c",
        false,
        false,
        &doc! {"q": 1},
        &doc! {"x": 2},
        true,
        &doc! {},
    )
    .unwrap();
    let (first, _) = MessageHeader::parse(&request.bytes).unwrap();
    let second_bytes = &request.bytes[first.message_length as usize..];
    let (second, _) = MessageHeader::parse(second_bytes).unwrap();
    assert_eq!(second.request_id, first.request_id);
    assert_eq!(second.op_code, OP_QUERY);
}

#[test]
fn get_more_packet_layout() {
    let (request_id, bytes) = get_more_message("db.c", 5, 0x0102030405060708).unwrap();
    assert_eq!(read_i32(&bytes, 0) as usize, bytes.len());
    assert_eq!(read_i32(&bytes, 4), request_id);
    assert_eq!(read_i32(&bytes, 12), OP_GET_MORE);
    assert_eq!(read_i32(&bytes, 16), 0);
    assert_eq!(&bytes[20..25], b"db.c\x00");
    assert_eq!(read_i32(&bytes, 25), 5);
    assert_eq!(
        i64::from_le_bytes(bytes[29..37].try_into().unwrap()),
        0x0102030405060708
    );
    assert_eq!(bytes.len(), 37);
}
