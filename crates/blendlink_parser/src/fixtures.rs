//! Shared test fixtures: synthetic schema blobs and chunk streams
//!
//! Everything here emits the exact wire layout the parser consumes, so
//! tests never depend on on-disk assets.

use crate::codec::{ChunkHead, OldAddress, write_chunk};

/// Declarative schema description for tests
pub struct SchemaSpec {
    pub names: Vec<&'static str>,
    /// (type name, declared byte length)
    pub types: Vec<(&'static str, u16)>,
    /// (type index, [(member type index, member name index)])
    pub structs: Vec<(u16, Vec<(u16, u16)>)>,
}

fn put_u32(out: &mut Vec<u8>, value: u32, swap: bool) {
    let mut bytes = value.to_ne_bytes();
    if swap {
        bytes.reverse();
    }
    out.extend_from_slice(&bytes);
}

fn put_u16(out: &mut Vec<u8>, value: u16, swap: bool) {
    let mut bytes = value.to_ne_bytes();
    if swap {
        bytes.reverse();
    }
    out.extend_from_slice(&bytes);
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn emit_blob(spec: &SchemaSpec, swap: bool) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"SDNA");

    out.extend_from_slice(b"NAME");
    put_u32(&mut out, spec.names.len() as u32, swap);
    for name in &spec.names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    pad4(&mut out);

    out.extend_from_slice(b"TYPE");
    put_u32(&mut out, spec.types.len() as u32, swap);
    for (name, _) in &spec.types {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    pad4(&mut out);

    out.extend_from_slice(b"TLEN");
    for (_, size) in &spec.types {
        put_u16(&mut out, *size, swap);
    }
    pad4(&mut out);

    out.extend_from_slice(b"STRC");
    put_u32(&mut out, spec.structs.len() as u32, swap);
    for (type_index, fields) in &spec.structs {
        put_u16(&mut out, *type_index, swap);
        put_u16(&mut out, fields.len() as u16, swap);
        for (field_type, field_name) in fields {
            put_u16(&mut out, *field_type, swap);
            put_u16(&mut out, *field_name, swap);
        }
    }
    out
}

/// Build a schema blob in host byte order.
pub fn build_blob(spec: &SchemaSpec) -> Vec<u8> {
    emit_blob(spec, false)
}

/// Build a schema blob with every 2/4-byte field byte-reversed, as a
/// foreign-endian writer would have produced it.
pub fn build_blob_swapped(spec: &SchemaSpec) -> Vec<u8> {
    emit_blob(spec, true)
}

/// One chunk of a synthetic file
pub struct ChunkSpec {
    pub code: [u8; 4],
    pub old: u64,
    pub sdna_index: u32,
    pub count: u32,
    pub payload: Vec<u8>,
}

/// Declarative file description for tests
pub struct FileSpec {
    pub pointer_size: u8,
    pub version: u32,
    pub chunks: Vec<ChunkSpec>,
    /// Schema blob embedded as the DNA1 chunk
    pub dna: Vec<u8>,
}

impl FileSpec {
    pub fn new(dna: Vec<u8>) -> FileSpec {
        FileSpec {
            pointer_size: 8,
            version: 305,
            chunks: Vec::new(),
            dna,
        }
    }

    pub fn chunk(mut self, code: [u8; 4], old: u64, sdna_index: u32, count: u32, payload: Vec<u8>) -> Self {
        self.chunks.push(ChunkSpec {
            code,
            old,
            sdna_index,
            count,
            payload,
        });
        self
    }
}

/// Assemble a complete file image: header, chunks, DNA1, ENDB. Emitted in
/// host byte order with the matching endian marker.
pub fn build_file(spec: &FileSpec) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"BLENDER");
    out.push(if spec.pointer_size == 8 { b'-' } else { b'_' });
    out.push(if cfg!(target_endian = "little") { b'v' } else { b'V' });
    out.extend_from_slice(format!("{:03}", spec.version).as_bytes());

    let wide = spec.pointer_size == 8;
    for chunk in &spec.chunks {
        let head = ChunkHead {
            code: chunk.code,
            length: chunk.payload.len() as u32,
            old: OldAddress(chunk.old),
            sdna_index: chunk.sdna_index,
            count: chunk.count,
        };
        write_chunk(&mut out, &head, &chunk.payload, wide);
    }

    let dna_head = ChunkHead {
        code: *b"DNA1",
        length: spec.dna.len() as u32,
        old: OldAddress::NULL,
        sdna_index: 0,
        count: 1,
    };
    write_chunk(&mut out, &dna_head, &spec.dna, wide);

    let end_head = ChunkHead {
        code: *b"ENDB",
        length: 0,
        old: OldAddress::NULL,
        sdna_index: 0,
        count: 0,
    };
    write_chunk(&mut out, &end_head, &[], wide);
    out
}
