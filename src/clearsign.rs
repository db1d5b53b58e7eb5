//! Cleartext signature framework (RFC 4880 §7): splitting an inline-signed
//! document into its payload and its signature block.

use std::io::Read;

use sequoia_openpgp as openpgp;

use openpgp::armor;
use openpgp::packet::Signature;
use openpgp::parse::Parse;
use openpgp::serialize::Serialize;
use openpgp::{Packet, PacketPile};

use crate::error::Result;

const SIGNED_MESSAGE_HEADER: &[u8] = b"-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_HEADER: &[u8] = b"-----BEGIN PGP SIGNATURE-----";
const SIGNATURE_FOOTER: &[u8] = b"-----END PGP SIGNATURE-----";

/// An inline-signed document, decoded.
#[derive(Debug, Clone)]
pub struct Clearsigned {
    /// The signed text: dash-unescaped, trailing whitespace removed from
    /// each line, and every carriage return stripped.
    pub payload: Vec<u8>,
    signatures: Vec<Signature>,
}

impl Clearsigned {
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// The signature packets as an armored `PGP SIGNATURE` block.
    pub fn armored_signature(&self) -> Result<Vec<u8>> {
        encode_armored(&self.signatures)
    }
}

/// Decode `data` as a cleartext-signed document. Returns `None` when the
/// framing is absent or incomplete, or when the trailing block does not
/// hold at least one signature packet.
pub fn decode(data: &[u8]) -> Option<Clearsigned> {
    let mut lines = data.split(|&b| b == b'\n').map(strip_cr);

    // Anything before the header is ignored.
    lines.by_ref().find(|line| trim_end(line) == SIGNED_MESSAGE_HEADER)?;

    // Armor headers ("Hash: SHA256") run until the first blank line.
    let mut saw_blank = false;
    for line in lines.by_ref() {
        if trim_end(line).is_empty() {
            saw_blank = true;
            break;
        }
    }
    if !saw_blank {
        return None;
    }

    let mut body: Vec<&[u8]> = Vec::new();
    let mut saw_signature = false;
    for line in lines.by_ref() {
        if trim_end(line) == SIGNATURE_HEADER {
            saw_signature = true;
            break;
        }
        body.push(line);
    }
    if !saw_signature {
        return None;
    }

    let mut armored = SIGNATURE_HEADER.to_vec();
    armored.push(b'\n');
    let mut closed = false;
    for line in lines {
        armored.extend_from_slice(line);
        armored.push(b'\n');
        if trim_end(line) == SIGNATURE_FOOTER {
            closed = true;
            break;
        }
    }
    if !closed {
        return None;
    }

    let signatures = read_signatures(&armored)?;

    // Canonical form joins lines with CRLF; the payload keeps no CR at all.
    let mut payload = Vec::with_capacity(data.len());
    for (idx, line) in body.iter().enumerate() {
        if idx > 0 {
            payload.extend_from_slice(b"\r\n");
        }
        payload.extend_from_slice(trim_end(unescape(line)));
    }
    payload.retain(|&b| b != b'\r');

    Some(Clearsigned {
        payload,
        signatures,
    })
}

/// Read the signature packets out of an armored block.
pub fn read_signatures(armored: &[u8]) -> Option<Vec<Signature>> {
    let mut reader = armor::Reader::from_bytes(
        armored,
        armor::ReaderMode::Tolerant(Some(armor::Kind::Signature)),
    );
    let mut binary = Vec::new();
    reader.read_to_end(&mut binary).ok()?;

    let pile = PacketPile::from_bytes(&binary).ok()?;
    let signatures: Vec<Signature> = pile
        .into_children()
        .filter_map(|packet| match packet {
            Packet::Signature(sig) => Some(sig),
            _ => None,
        })
        .collect();

    if signatures.is_empty() {
        None
    } else {
        Some(signatures)
    }
}

/// Armor signature packets as a `PGP SIGNATURE` block.
pub fn encode_armored(signatures: &[Signature]) -> Result<Vec<u8>> {
    let mut sink = Vec::new();
    let mut writer = armor::Writer::new(&mut sink, armor::Kind::Signature)?;
    for sig in signatures {
        Packet::from(sig.clone()).serialize(&mut writer)?;
    }
    writer.finalize()?;
    Ok(sink)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t' && b != b'\r')
        .map_or(0, |i| i + 1);
    &line[..end]
}

fn unescape(line: &[u8]) -> &[u8] {
    line.strip_prefix(b"- ").unwrap_or(line)
}
