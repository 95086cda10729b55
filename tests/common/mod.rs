//! Shared test helpers: a wire-level response builder and an in-memory
//! transport serving canned messages.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use epcdns::transport::DnsTransport;
use epcdns::wire::{pack_domain_name, RecordType};

const FLAG_RESPONSE: u16 = 0x8000;

/// Hand-builds DNS response messages for the mock transport.
pub struct ResponseBuilder {
    msg: Vec<u8>,
    ancount: u16,
}

impl ResponseBuilder {
    pub fn new(id: u16, rcode: u8) -> Self {
        let mut msg = Vec::new();
        msg.extend_from_slice(&id.to_be_bytes());
        msg.extend_from_slice(&(FLAG_RESPONSE | rcode as u16).to_be_bytes());
        msg.extend_from_slice(&0u16.to_be_bytes()); // qdcount
        msg.extend_from_slice(&0u16.to_be_bytes()); // ancount, patched in build()
        msg.extend_from_slice(&0u16.to_be_bytes()); // nscount
        msg.extend_from_slice(&0u16.to_be_bytes()); // arcount
        Self { msg, ancount: 0 }
    }

    /// Appends one answer with arbitrary rdata bytes.
    pub fn answer_raw(mut self, name: &str, rtype: u16, rdata: &[u8]) -> Self {
        pack_domain_name(&mut self.msg, name).expect("test names are valid");
        self.msg.extend_from_slice(&rtype.to_be_bytes());
        self.msg.extend_from_slice(&1u16.to_be_bytes()); // class IN
        self.msg.extend_from_slice(&300u32.to_be_bytes()); // ttl
        self.msg.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        self.msg.extend_from_slice(rdata);
        self.ancount += 1;
        self
    }

    pub fn a_answer(self, name: &str, addr: [u8; 4]) -> Self {
        self.answer_raw(name, RecordType::A as u16, &addr)
    }

    pub fn srv_answer(self, name: &str, target: &str) -> Self {
        let mut rdata = Vec::new();
        rdata.extend_from_slice(&10u16.to_be_bytes()); // priority
        rdata.extend_from_slice(&5u16.to_be_bytes()); // weight
        rdata.extend_from_slice(&2123u16.to_be_bytes()); // port
        pack_domain_name(&mut rdata, target).expect("test names are valid");
        self.answer_raw(name, RecordType::Srv as u16, &rdata)
    }

    pub fn naptr_answer(
        self,
        name: &str,
        order: u16,
        preference: u16,
        flags: &str,
        service: &str,
        regexp: &str,
        replacement: &str,
    ) -> Self {
        let rdata = naptr_rdata(order, preference, flags, service, regexp, replacement);
        self.answer_raw(name, RecordType::Naptr as u16, &rdata)
    }

    pub fn build(self) -> Vec<u8> {
        let mut msg = self.msg;
        msg[6..8].copy_from_slice(&self.ancount.to_be_bytes());
        msg
    }
}

/// NAPTR rdata with the replacement packed uncompressed.
pub fn naptr_rdata(
    order: u16,
    preference: u16,
    flags: &str,
    service: &str,
    regexp: &str,
    replacement: &str,
) -> Vec<u8> {
    let mut rdata = Vec::new();
    rdata.extend_from_slice(&order.to_be_bytes());
    rdata.extend_from_slice(&preference.to_be_bytes());
    rdata.push(flags.len() as u8);
    rdata.extend_from_slice(flags.as_bytes());
    rdata.push(service.len() as u8);
    rdata.extend_from_slice(service.as_bytes());
    rdata.push(regexp.len() as u8);
    rdata.extend_from_slice(regexp.as_bytes());
    pack_domain_name(&mut rdata, replacement).expect("test names are valid");
    rdata
}

/// In-memory transport: canned responses per (name, type), recorded queries.
///
/// A lookup with no canned response fails the way a dead nameserver does.
#[derive(Default)]
pub struct MockTransport {
    responses: HashMap<(String, u16), Vec<u8>>,
    queries: QueryLog,
}

/// Shared view of the queries a [`MockTransport`] has served, usable after
/// the transport has moved into a resolver.
#[derive(Default, Clone)]
pub struct QueryLog(Arc<Mutex<Vec<(String, u16)>>>);

impl QueryLog {
    /// Every (name, type) pair queried so far, in order.
    pub fn entries(&self) -> Vec<(String, u16)> {
        self.0.lock().expect("query log lock").clone()
    }

    /// Just the names, for order assertions.
    pub fn names(&self) -> Vec<String> {
        self.entries().into_iter().map(|(name, _)| name).collect()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, name: &str, rtype: RecordType, msg: Vec<u8>) -> Self {
        self.responses.insert((name.to_string(), rtype as u16), msg);
        self
    }

    pub fn query_log(&self) -> QueryLog {
        self.queries.clone()
    }
}

impl DnsTransport for MockTransport {
    async fn query(&self, name: &str, rtype: RecordType) -> Result<Vec<u8>> {
        self.queries
            .0
            .lock()
            .expect("query log lock")
            .push((name.to_string(), rtype as u16));
        match self.responses.get(&(name.to_string(), rtype as u16)) {
            Some(msg) => Ok(msg.clone()),
            None => bail!("no response configured for {} {}", rtype, name),
        }
    }
}
