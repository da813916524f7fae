// blendlink_parser/src/lib.rs

//! # blendlink_parser
//!
//! Schema-reconciling reader/writer engine for Blender .blend files.
//!
//! A .blend file embeds the struct layouts it was written with ("SDNA").
//! This crate parses that schema, compiles it and a caller-supplied
//! reference schema into offset-annotated member trees, matches the two
//! field-by-field, and materializes every loaded chunk in reference layout
//! with all pointer fields rewritten into a fresh, loader-owned address
//! space.
//!
//! ## Key Features
//!
//! - **Schema reconciliation**: renamed-width-compatible fields, array
//!   size differences and numeric type promotions are resolved per member
//! - **Pointer relinking**: file-space addresses become valid handles into
//!   relocated storage, including arrays of pointers
//! - **Cross-platform input**: 32/64-bit files of either endianness
//! - **Memory safety**: all parsing operations are bounds-checked
//!
//! ## Architecture
//!
//! The engine is a synchronous pipeline:
//! 1. **Header parsing**: pointer width, endianness, version
//! 2. **Chunk scanning**: locate every record and the embedded schema
//! 3. **Schema compile + link**: flatten both schemas, build match tables
//! 4. **Relocation**: allocate, copy/convert, and patch every live chunk
//!
//! One [`Relinker`] holds the compiled reference schema and parses one
//! file at a time; each parse returns an independent [`BlendData`].

pub mod buf;
pub mod codec;
pub mod compile;
pub mod compression;
pub mod dense;
pub mod header;
pub mod link;
pub mod relocate;
pub mod report;
pub mod scan;
pub mod sdna;
pub mod writer;

#[cfg(test)]
pub(crate) mod fixtures;

pub use buf::FileBuf;
pub use codec::{ChunkHead, CodecFlags, OldAddress};
pub use compile::{CompiledMember, CompiledSchema, CompiledStruct, KeyChainEntry};
pub use compression::{CompressionKind, ParseOptions};
pub use dense::DenseTable;
pub use header::BlendHeader;
pub use link::{MemberMatch, SchemaLink, StructMatch, link_schemas};
pub use relocate::{AddressMap, Chunk, Relocator, build_address_map};
pub use report::{LogReport, NullReport, Report, Severity};
pub use scan::{RawChunk, scan_chunks};
pub use sdna::{PrimKind, Sdna, SdnaName, SdnaType};
pub use writer::WriteOptions;

use ahash::AHashMap;
use blendlink_error::{BlendLinkError, ParserErrorKind, Result};
use log::{debug, trace};

/// Long-lived loader: owns the compiled reference schema and the
/// diagnostics sink.
///
/// The reference tables are immutable after construction and may be shared
/// read-only; a single `Relinker` instance parses one file at a time.
pub struct Relinker {
    schema: CompiledSchema,
    reference_blob: Vec<u8>,
    report: Box<dyn Report>,
}

impl Relinker {
    /// Build a loader around a reference schema blob (the layout the
    /// calling application was compiled against).
    pub fn new(reference_blob: &[u8]) -> Result<Relinker> {
        Self::with_report(reference_blob, Box::new(LogReport))
    }

    /// Same, with a custom diagnostics sink.
    pub fn with_report(reference_blob: &[u8], report: Box<dyn Report>) -> Result<Relinker> {
        let sdna = Sdna::parse(reference_blob, false)?;
        let pointer_size = std::mem::size_of::<usize>() as u32;
        let schema = CompiledSchema::compile(sdna, pointer_size, report.as_ref())?;
        debug!(
            "reference schema ready: {} structs, {} types",
            schema.structs.len(),
            schema.sdna.types.len()
        );
        Ok(Relinker {
            schema,
            reference_blob: reference_blob.to_vec(),
            report,
        })
    }

    /// The compiled reference schema.
    pub fn schema(&self) -> &CompiledSchema {
        &self.schema
    }

    /// The raw reference blob, re-emitted verbatim by the save path.
    pub fn reference_blob(&self) -> &[u8] {
        &self.reference_blob
    }

    pub fn report(&self) -> &dyn Report {
        self.report.as_ref()
    }

    /// Parse a file from disk, transparently inflating compressed images.
    pub fn parse_from_path<P: AsRef<std::path::Path>>(
        &self,
        path: P,
        options: Option<&ParseOptions>,
    ) -> Result<BlendData> {
        let path = path.as_ref();
        let data = std::fs::read(path)
            .map_err(|err| BlendLinkError::from(err).with_file_path(path))?;
        self.parse_from_bytes(data, options)
            .map_err(|err| err.with_file_path(path))
    }

    /// Parse a file through a memory mapping, falling back to in-memory
    /// decompression when the image is compressed.
    #[cfg(feature = "mmap")]
    pub fn parse_from_path_mmap<P: AsRef<std::path::Path>>(
        &self,
        path: P,
        options: Option<&ParseOptions>,
    ) -> Result<BlendData> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|err| BlendLinkError::from(err).with_file_path(path))?;
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|err| BlendLinkError::from(err).with_file_path(path))?;
        if compression::detect(&mmap) != CompressionKind::None {
            return self.parse_from_bytes(mmap.to_vec(), options);
        }
        let default_options = ParseOptions::default();
        let options = options.unwrap_or(&default_options);
        self.parse_buf(FileBuf::from_mmap(mmap), options)
            .map_err(|err| err.with_file_path(path))
    }

    /// Parse a complete in-memory file image.
    pub fn parse_from_bytes(
        &self,
        data: Vec<u8>,
        options: Option<&ParseOptions>,
    ) -> Result<BlendData> {
        let default_options = ParseOptions::default();
        let options = options.unwrap_or(&default_options);
        let data = compression::maybe_decompress(data, options)?;
        self.parse_buf(FileBuf::from_vec(data), options)
    }

    /// Parse a buffer that is already an uncompressed file image.
    pub fn parse_buf(&self, buf: FileBuf, options: &ParseOptions) -> Result<BlendData> {
        let data = buf.as_slice();
        trace!("parsing {} byte image", data.len());

        let file_header = BlendHeader::decode(data)?;
        let swap = file_header.needs_swap();
        debug!(
            "header: version={}, pointer_size={}, {}-endian{}",
            file_header.version,
            file_header.pointer_size,
            if file_header.is_little_endian { "little" } else { "big" },
            if file_header.is_stripped() { " (stripped)" } else { "" },
        );

        let flags = CodecFlags {
            wide_addresses: file_header.pointer_size == 8,
            swap,
            cross_width: false,
        };
        let raw_chunks = scan_chunks(data, header::HEADER_SIZE, flags, options.max_chunk_size)?;

        // Locate and compile the embedded file schema
        let dna_chunk = raw_chunks
            .iter()
            .find(|chunk| chunk.head.code == codec::CODE_DNA1)
            .ok_or_else(|| {
                BlendLinkError::parser("schema chunk not found", ParserErrorKind::NoSchemaFound)
            })?;
        let dna_slice =
            &data[dna_chunk.data_offset..dna_chunk.data_offset + dna_chunk.head.length as usize];
        let file_sdna = Sdna::parse(dna_slice, swap)?;
        let file_schema = CompiledSchema::compile(
            file_sdna,
            file_header.pointer_size as u32,
            self.report.as_ref(),
        )?;

        let schema_link = link_schemas(&self.schema, &file_schema, self.report.as_ref())?;

        // Materialize chunks and relocate
        let mut chunks = Vec::with_capacity(raw_chunks.len());
        for raw in &raw_chunks {
            let payload =
                buf.slice(raw.data_offset..raw.data_offset + raw.head.length as usize)?;
            chunks.push(Chunk::new(raw.head, payload));
        }
        let address_map = build_address_map(&chunks, self.report.as_ref());
        Relocator::new(
            &self.schema,
            &file_schema,
            &schema_link,
            &address_map,
            swap,
            self.report.as_ref(),
        )
        .run(&mut chunks)?;

        // Index the survivors
        let mut by_code: AHashMap<[u8; 4], Vec<usize>> = AHashMap::with_capacity(32);
        let mut by_new_address = AHashMap::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            if !chunk.is_live() {
                continue;
            }
            by_code.entry(chunk.head.code).or_default().push(index);
            by_new_address.insert(chunk.new_address, index);
        }

        debug!(
            "parse complete: {} chunks, {} live",
            chunks.len(),
            by_new_address.len()
        );

        Ok(BlendData {
            header: file_header,
            chunks,
            address_map,
            by_code,
            by_new_address,
        })
    }
}

/// One parsed file: relocated chunks plus the indexes to navigate them.
#[derive(Debug)]
pub struct BlendData {
    header: BlendHeader,
    chunks: Vec<Chunk>,
    address_map: AddressMap,
    by_code: AHashMap<[u8; 4], Vec<usize>>,
    by_new_address: AHashMap<u64, usize>,
}

impl BlendData {
    pub fn header(&self) -> &BlendHeader {
        &self.header
    }

    pub fn chunks_len(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// Relocated bytes of a chunk, if it survived relocation.
    pub fn data(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).and_then(|chunk| chunk.data())
    }

    /// Indices of live chunks with the given record code.
    pub fn blocks_by_code(&self, code: &[u8; 4]) -> Vec<usize> {
        self.by_code.get(code).cloned().unwrap_or_default()
    }

    /// Look up the chunk that owned `address` in the file's address space.
    pub fn resolve_old(&self, address: OldAddress) -> Option<usize> {
        self.address_map.get(&address).map(|&index| index as usize)
    }

    /// Follow a relocated pointer value: returns the owning chunk index and
    /// its bytes. This is how callers chase pointer fields read out of
    /// relocated blocks.
    pub fn follow(&self, address: u64) -> Option<(usize, &[u8])> {
        let &index = self.by_new_address.get(&address)?;
        self.chunks[index].data().map(|data| (index, data))
    }

    /// Deterministic content hash of a relocated chunk (header metadata
    /// plus relocated bytes).
    pub fn content_hash(&self, index: usize) -> Option<u64> {
        use std::hash::Hasher;
        let chunk = self.chunks.get(index)?;
        let data = chunk.data()?;
        let mut hasher = twox_hash::XxHash64::with_seed(0);
        hasher.write(&chunk.head.sdna_index.to_le_bytes());
        hasher.write(&chunk.head.count.to_le_bytes());
        hasher.write(&chunk.head.code);
        hasher.write(data);
        Some(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FileSpec, SchemaSpec, build_blob, build_file};

    /// Scene { int frame; float fps; Scene *next; Object **objects; int count; int pad; }
    /// Object { float loc[3]; int id; }
    /// Link { Link *next; Link *prev; }
    fn reference_spec() -> SchemaSpec {
        SchemaSpec {
            names: vec![
                "frame", "fps", "*next", "**objects", "count", "loc[3]", "id", "*prev", "pad",
            ],
            types: vec![
                ("int", 4),
                ("float", 4),
                ("Scene", 32),
                ("Object", 16),
                ("Link", 16),
                ("void", 0),
            ],
            structs: vec![
                (2, vec![(0, 0), (1, 1), (2, 2), (3, 3), (0, 4), (0, 8)]),
                (3, vec![(1, 5), (0, 6)]),
                (4, vec![(4, 2), (4, 7)]),
            ],
        }
    }

    fn object_payload(loc: [f32; 3], id: i32) -> Vec<u8> {
        let mut out = Vec::new();
        for v in loc {
            out.extend_from_slice(&v.to_ne_bytes());
        }
        out.extend_from_slice(&id.to_ne_bytes());
        out
    }

    fn scene_payload(frame: i32, fps: f32, next: u64, objects: u64, count: i32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&frame.to_ne_bytes());
        out.extend_from_slice(&fps.to_ne_bytes());
        out.extend_from_slice(&next.to_ne_bytes());
        out.extend_from_slice(&objects.to_ne_bytes());
        out.extend_from_slice(&count.to_ne_bytes());
        out.extend_from_slice(&[0u8; 4]); // struct tail padding
        out
    }

    fn sample_file(dna: Vec<u8>) -> Vec<u8> {
        // Two objects, a pointer array over them, and a scene referencing it
        let objects = [
            object_payload([1.0, 2.0, 3.0], 7),
            object_payload([-1.0, 0.5, 8.25], 9),
        ];
        let mut array = Vec::new();
        array.extend_from_slice(&0x100u64.to_ne_bytes());
        array.extend_from_slice(&0x200u64.to_ne_bytes());

        let spec = FileSpec::new(dna)
            .chunk(*b"SC\0\0", 0x500, 0, 1, scene_payload(42, 24.0, 0, 0x300, 2))
            .chunk(*b"DATA", 0x300, 2, 1, array)
            .chunk(*b"OB\0\0", 0x100, 1, 1, objects[0].clone())
            .chunk(*b"OB\0\0", 0x200, 1, 1, objects[1].clone());
        build_file(&spec)
    }

    #[test]
    fn test_full_parse_pipeline() {
        let blob = build_blob(&reference_spec());
        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();
        let data = relinker
            .parse_from_bytes(sample_file(blob.clone()), None)
            .unwrap();

        assert_eq!(data.header().version, 305);
        let scenes = data.blocks_by_code(b"SC\0\0");
        assert_eq!(scenes.len(), 1);

        let scene = data.data(scenes[0]).unwrap();
        assert_eq!(i32::from_ne_bytes(scene[0..4].try_into().unwrap()), 42);
        assert_eq!(f32::from_ne_bytes(scene[4..8].try_into().unwrap()), 24.0);

        // next is null, objects points at the translated pointer array
        assert_eq!(u64::from_ne_bytes(scene[8..16].try_into().unwrap()), 0);
        let array_ptr = u64::from_ne_bytes(scene[16..24].try_into().unwrap());
        let (_, array) = data.follow(array_ptr).unwrap();
        assert_eq!(array.len(), 16);

        // Each array entry leads to the right relocated object
        for (slot, expected_id) in [(0usize, 7i32), (1, 9)] {
            let entry = u64::from_ne_bytes(array[slot * 8..slot * 8 + 8].try_into().unwrap());
            let (_, object) = data.follow(entry).unwrap();
            assert_eq!(
                i32::from_ne_bytes(object[12..16].try_into().unwrap()),
                expected_id
            );
        }
    }

    #[test]
    fn test_round_trip_through_writer() {
        let blob = build_blob(&reference_spec());
        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();
        let first = relinker
            .parse_from_bytes(sample_file(blob.clone()), None)
            .unwrap();

        let written = writer::to_bytes(&relinker, &first, &WriteOptions::default()).unwrap();
        let second = relinker.parse_from_bytes(written, None).unwrap();

        // Non-pointer content survives bit-identically; pointer identity is
        // preserved structurally (the scene still reaches both objects).
        let scene = second.data(second.blocks_by_code(b"SC\0\0")[0]).unwrap();
        assert_eq!(i32::from_ne_bytes(scene[0..4].try_into().unwrap()), 42);
        assert_eq!(f32::from_ne_bytes(scene[4..8].try_into().unwrap()), 24.0);

        let array_ptr = u64::from_ne_bytes(scene[16..24].try_into().unwrap());
        let (_, array) = second.follow(array_ptr).unwrap();
        let mut ids = Vec::new();
        for slot in 0..2 {
            let entry = u64::from_ne_bytes(array[slot * 8..slot * 8 + 8].try_into().unwrap());
            let (_, object) = second.follow(entry).unwrap();
            ids.push(i32::from_ne_bytes(object[12..16].try_into().unwrap()));
        }
        assert_eq!(ids, vec![7, 9]);

        // Object payloads are bit-identical across the round trip
        let firsts: Vec<&[u8]> = first
            .blocks_by_code(b"OB\0\0")
            .into_iter()
            .map(|i| first.data(i).unwrap())
            .collect();
        let seconds: Vec<&[u8]> = second
            .blocks_by_code(b"OB\0\0")
            .into_iter()
            .map(|i| second.data(i).unwrap())
            .collect();
        assert_eq!(firsts, seconds);
    }

    #[test]
    fn test_gzip_image() {
        use std::io::Write;
        let blob = build_blob(&reference_spec());
        let image = sample_file(blob.clone());
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&image).unwrap();
        let compressed = encoder.finish().unwrap();

        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();
        let data = relinker.parse_from_bytes(compressed, None).unwrap();
        assert_eq!(data.blocks_by_code(b"OB\0\0").len(), 2);
    }

    #[test]
    fn test_missing_schema_chunk() {
        let blob = build_blob(&reference_spec());
        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();

        // A file whose only content is the end sentinel
        let mut image = Vec::new();
        image.extend_from_slice(b"BLENDER-");
        image.push(if cfg!(target_endian = "little") { b'v' } else { b'V' });
        image.extend_from_slice(b"305");
        let end = ChunkHead {
            code: *b"ENDB",
            length: 0,
            old: OldAddress::NULL,
            sdna_index: 0,
            count: 0,
        };
        codec::write_chunk(&mut image, &end, &[], true);

        let err = relinker.parse_from_bytes(image, None).unwrap_err();
        assert_eq!(err.parser_kind(), Some(&ParserErrorKind::NoSchemaFound));
    }

    #[test]
    fn test_unknown_chunk_type_dropped_from_collections() {
        // File schema carries an extra struct the reference lacks
        let mut file_side = reference_spec();
        file_side.names.push("legacy");
        file_side.types.push(("Gone", 4));
        file_side.structs.push((6, vec![(0, 9)]));

        let reference_blob = build_blob(&reference_spec());
        let file_blob = build_blob(&file_side);

        let spec = FileSpec::new(file_blob)
            .chunk(*b"GO\0\0", 0x900, 3, 1, 5i32.to_ne_bytes().to_vec())
            .chunk(*b"OB\0\0", 0x100, 1, 1, object_payload([0.0; 3], 1));
        let image = build_file(&spec);

        let relinker = Relinker::with_report(&reference_blob, Box::new(NullReport)).unwrap();
        let data = relinker.parse_from_bytes(image, None).unwrap();

        assert!(data.blocks_by_code(b"GO\0\0").is_empty());
        assert_eq!(data.blocks_by_code(b"OB\0\0").len(), 1);
        // The dropped chunk is still enumerable, just not materialized
        assert!(data.chunk(0).is_some_and(|c| !c.is_live()));
    }

    #[test]
    fn test_stripped_magic_accepted() {
        let blob = build_blob(&reference_spec());
        let mut image = sample_file(blob.clone());
        image[0..7].copy_from_slice(&header::MAGIC_STRIPPED);

        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();
        let data = relinker.parse_from_bytes(image, None).unwrap();
        assert!(data.header().is_stripped());
        assert_eq!(data.blocks_by_code(b"OB\0\0").len(), 2);
    }

    #[test]
    fn test_resolve_old_addresses() {
        let blob = build_blob(&reference_spec());
        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();
        let data = relinker
            .parse_from_bytes(sample_file(blob.clone()), None)
            .unwrap();

        let index = data.resolve_old(OldAddress(0x100)).unwrap();
        assert_eq!(&data.chunk(index).unwrap().head.code, b"OB\0\0");
        assert_eq!(data.resolve_old(OldAddress(0xF00)), None);
    }

    #[test]
    fn test_content_hash_stable() {
        let blob = build_blob(&reference_spec());
        let relinker = Relinker::with_report(&blob, Box::new(NullReport)).unwrap();
        let a = relinker
            .parse_from_bytes(sample_file(blob.clone()), None)
            .unwrap();
        let b = relinker
            .parse_from_bytes(sample_file(blob.clone()), None)
            .unwrap();

        let index_a = a.blocks_by_code(b"OB\0\0")[0];
        let index_b = b.blocks_by_code(b"OB\0\0")[0];
        assert_eq!(a.content_hash(index_a), b.content_hash(index_b));
    }
}
