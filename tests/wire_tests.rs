mod common;

use common::ResponseBuilder;
use epcdns::wire::{
    a_rdata, encode_query, pack_domain_name, srv_target, unpack_domain_name, Header, RecordType,
    Response, WireError,
};

#[test]
fn test_pack_domain_name() {
    let mut buf = Vec::new();
    pack_domain_name(&mut buf, "www.example.com").unwrap();
    assert_eq!(
        buf,
        vec![
            3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm',
            0
        ]
    );
}

#[test]
fn test_pack_root_name() {
    let mut buf = Vec::new();
    pack_domain_name(&mut buf, ".").unwrap();
    assert_eq!(buf, vec![0]);
}

#[test]
fn test_pack_rejects_long_label() {
    let mut buf = Vec::new();
    let name = format!("{}.com", "x".repeat(64));
    assert_eq!(
        pack_domain_name(&mut buf, &name),
        Err(WireError::LabelTooLong)
    );
}

#[test]
fn test_unpack_simple_name() {
    let data = vec![
        3, b'w', b'w', b'w', 7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0,
    ];
    let (name, consumed) = unpack_domain_name(&data, 0).unwrap();
    assert_eq!(name, "www.example.com");
    assert_eq!(consumed, 17);
}

#[test]
fn test_unpack_root_name() {
    let data = vec![0u8];
    let (name, consumed) = unpack_domain_name(&data, 0).unwrap();
    assert_eq!(name, ".");
    assert_eq!(consumed, 1);
}

#[test]
fn test_unpack_compressed_name() {
    // "example.com" at offset 2, then "pgw" + pointer back to it.
    let data = vec![
        0xDE, 0xAD, // padding so the pointer target is not zero
        7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0, // offset 2..15
        3, b'p', b'g', b'w', 0xC0, 0x02, // offset 15: "pgw" + pointer to 2
    ];
    let (name, consumed) = unpack_domain_name(&data, 15).unwrap();
    assert_eq!(name, "pgw.example.com");
    assert_eq!(consumed, 6); // label "pgw" (4) plus the 2-byte pointer
}

#[test]
fn test_unpack_pointer_loop_is_bounded() {
    // A pointer that points at itself must not spin forever.
    let data = vec![0xC0, 0x00];
    assert_eq!(
        unpack_domain_name(&data, 0),
        Err(WireError::PointerLoop)
    );
}

#[test]
fn test_unpack_truncated_name() {
    let data = vec![5, b'a', b'b'];
    assert_eq!(unpack_domain_name(&data, 0), Err(WireError::Truncated));
}

#[test]
fn test_encode_query_layout() {
    let query = encode_query(0x1234, "epc.mnc001.mcc100.example.org", RecordType::Naptr).unwrap();

    let header = Header::parse(&query).unwrap();
    assert_eq!(header.id, 0x1234);
    assert_eq!(header.qdcount, 1);
    assert_eq!(header.ancount, 0);
    assert!(!header.is_response());

    // Question tail: qtype NAPTR (35), qclass IN (1)
    let tail = &query[query.len() - 4..];
    assert_eq!(tail, &[0x00, 0x23, 0x00, 0x01]);
}

#[test]
fn test_parse_response_answers() {
    let msg = ResponseBuilder::new(7, 0)
        .a_answer("pgw1.example.com", [172, 20, 14, 55])
        .a_answer("pgw1.example.com", [172, 20, 14, 56])
        .build();

    let response = Response::parse(&msg).unwrap();
    assert_eq!(response.header.ancount, 2);
    assert_eq!(response.answers.len(), 2);
    assert_eq!(response.header.rcode(), 0);

    let first = a_rdata(&msg, &response.answers[0].rdata).unwrap();
    let second = a_rdata(&msg, &response.answers[1].rdata).unwrap();
    assert_eq!(first.octets(), [172, 20, 14, 55]);
    assert_eq!(second.octets(), [172, 20, 14, 56]);
}

#[test]
fn test_parse_response_rcode() {
    let msg = ResponseBuilder::new(7, 3).build(); // NXDOMAIN
    let response = Response::parse(&msg).unwrap();
    assert_eq!(response.header.rcode(), 3);
    assert!(response.answers.is_empty());
}

#[test]
fn test_parse_truncated_message() {
    let msg = ResponseBuilder::new(7, 0)
        .a_answer("pgw1.example.com", [1, 2, 3, 4])
        .build();
    assert!(Response::parse(&msg[..msg.len() - 2]).is_err());
    assert_eq!(Header::parse(&msg[..4]).unwrap_err(), WireError::Truncated);
}

#[test]
fn test_srv_target_extraction() {
    let msg = ResponseBuilder::new(7, 0)
        .srv_answer("_gtp._udp.example.com", "host1.example.com")
        .build();
    let response = Response::parse(&msg).unwrap();
    let target = srv_target(&msg, &response.answers[0].rdata).unwrap();
    assert_eq!(target, "host1.example.com");
}

#[test]
fn test_a_rdata_rejects_wrong_length() {
    let msg = ResponseBuilder::new(7, 0)
        .answer_raw("short.example.com", RecordType::A as u16, &[1, 2, 3])
        .build();
    let response = Response::parse(&msg).unwrap();
    assert!(a_rdata(&msg, &response.answers[0].rdata).is_none());
}
