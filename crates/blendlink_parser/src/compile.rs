//! Struct compilation: flattened, offset-annotated member trees
//!
//! Schema struct records embed other structs by value. Before two schemas
//! can be matched member-by-member, every struct is compiled into a flat
//! member list: embedded struct members are expanded recursively (once per
//! array repetition), each emitted member carrying its byte offset, element
//! count, embedding depth, repetition index and the chain of
//! (type-hash, name-hash) pairs of its embedding ancestors. That key chain
//! is what later disambiguates same-named members at different depths.

use crate::dense::DenseTable;
use crate::report::Report;
use crate::sdna::{Sdna, hash_name};
use blendlink_error::{BlendLinkError, ParserErrorKind, Result};

/// Embedding deeper than this indicates a cyclic or hostile schema
const MAX_EMBED_DEPTH: usize = 16;

/// One element of a member's embedding ancestry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyChainEntry {
    /// Hash of the embedded struct's type name
    pub type_hash: u64,
    /// Hash of the embedding member's base name
    pub name_hash: u64,
}

/// One flattened member of a compiled struct
#[derive(Debug, Clone)]
pub struct CompiledMember {
    pub type_index: u16,
    pub name_index: u16,
    pub type_hash: u64,
    /// Hash of the base name, decorations stripped
    pub name_hash: u64,
    /// Byte offset within the owning struct
    pub offset: u32,
    /// Total byte length: element size times element count
    pub length: u32,
    /// Array element count of this member itself
    pub elem_count: u32,
    /// Embedding depth; 0 for direct members
    pub depth: u8,
    /// Which repetition of the embedding expansion this member belongs to
    pub rep_index: u32,
    pub ptr_count: u8,
    pub is_function_pointer: bool,
    /// Embedding ancestry; its length always equals `depth`
    pub key_chain: Vec<KeyChainEntry>,
}

impl CompiledMember {
    pub fn is_pointer(&self) -> bool {
        self.ptr_count > 0 || self.is_function_pointer
    }

    /// Byte size of one array element.
    pub fn elem_size(&self) -> u32 {
        self.length / self.elem_count.max(1)
    }
}

/// A struct with its fully flattened member list
#[derive(Debug, Clone)]
pub struct CompiledStruct {
    pub type_index: u16,
    pub type_hash: u64,
    /// Declared byte size of the struct type
    pub size: u32,
    pub members: Vec<CompiledMember>,
    /// Flattened member sizes did not sum to the declared size
    pub misaligned: bool,
}

/// A fully compiled schema: the parsed tables plus one compiled struct per
/// STRC record, in record order (so chunk `sdna_index` values index
/// directly into `structs`).
#[derive(Debug)]
pub struct CompiledSchema {
    pub sdna: Sdna,
    pub structs: Vec<CompiledStruct>,
    pub pointer_size: u32,
    struct_by_hash: DenseTable<u64, u32>,
}

impl CompiledSchema {
    /// Compile every struct of a parsed schema. `pointer_size` is the byte
    /// width pointers had on the machine that produced the schema.
    pub fn compile(sdna: Sdna, pointer_size: u32, report: &dyn Report) -> Result<CompiledSchema> {
        let mut structs = Vec::with_capacity(sdna.structs.len());
        let mut struct_by_hash = DenseTable::with_capacity(sdna.structs.len());

        for (struct_index, record) in sdna.structs.iter().enumerate() {
            let ty = &sdna.types[record.type_index as usize];
            let mut members = Vec::new();
            let mut offset = 0u32;
            let mut chain = Vec::new();

            expand_members(
                &sdna,
                record,
                pointer_size,
                0,
                0,
                &mut chain,
                &mut offset,
                &mut members,
            )?;

            let declared = ty.size as u32;
            let misaligned = offset != declared;
            if misaligned {
                report.warn(&format!(
                    "struct '{}' compiles to {offset} bytes but declares {declared}",
                    ty.name
                ));
            }

            struct_by_hash.insert(ty.hash, struct_index as u32);
            structs.push(CompiledStruct {
                type_index: record.type_index,
                type_hash: ty.hash,
                size: declared,
                members,
                misaligned,
            });
        }

        log::debug!(
            "compiled {} structs ({}-byte pointers)",
            structs.len(),
            pointer_size
        );

        Ok(CompiledSchema {
            sdna,
            structs,
            pointer_size,
            struct_by_hash,
        })
    }

    pub fn find_struct_by_hash(&self, hash: u64) -> Option<usize> {
        self.struct_by_hash.get(&hash).map(|&index| index as usize)
    }

    pub fn find_struct_by_name(&self, name: &str) -> Option<usize> {
        self.find_struct_by_hash(hash_name(name.as_bytes()))
    }

    pub fn type_name(&self, type_index: u16) -> &str {
        &self.sdna.types[type_index as usize].name
    }

    pub fn struct_name(&self, struct_index: usize) -> &str {
        self.type_name(self.structs[struct_index].type_index)
    }
}

/// Recursively emit the flattened members of one struct record.
#[allow(clippy::too_many_arguments)]
fn expand_members(
    sdna: &Sdna,
    record: &crate::sdna::SdnaStruct,
    pointer_size: u32,
    depth: usize,
    rep_index: u32,
    chain: &mut Vec<KeyChainEntry>,
    offset: &mut u32,
    out: &mut Vec<CompiledMember>,
) -> Result<()> {
    if depth > MAX_EMBED_DEPTH {
        let name = &sdna.types[record.type_index as usize].name;
        return Err(BlendLinkError::parser(
            format!("embedding of struct '{name}' exceeds depth {MAX_EMBED_DEPTH}"),
            ParserErrorKind::SchemaError,
        ));
    }

    for field in &record.fields {
        let name = &sdna.names[field.name_index as usize];
        let ty = &sdna.types[field.type_index as usize];

        let embedded = ty.struct_index.and_then(|index| {
            // Embedded by value only: pointers to structs stay members
            (name.ptr_count == 0 && !name.is_function_pointer)
                .then_some(&sdna.structs[index as usize])
        });

        if let Some(inner) = embedded {
            for rep in 0..name.array_total {
                chain.push(KeyChainEntry {
                    type_hash: ty.hash,
                    name_hash: name.base_hash,
                });
                expand_members(
                    sdna,
                    inner,
                    pointer_size,
                    depth + 1,
                    rep_index * name.array_total + rep,
                    chain,
                    offset,
                    out,
                )?;
                chain.pop();
            }
        } else {
            let elem_size = if name.ptr_count > 0 || name.is_function_pointer {
                pointer_size
            } else {
                ty.size as u32
            };
            let length = elem_size * name.array_total;
            out.push(CompiledMember {
                type_index: field.type_index,
                name_index: field.name_index,
                type_hash: ty.hash,
                name_hash: name.base_hash,
                offset: *offset,
                length,
                elem_count: name.array_total,
                depth: depth as u8,
                rep_index,
                ptr_count: name.ptr_count,
                is_function_pointer: name.is_function_pointer,
                key_chain: chain.clone(),
            });
            *offset += length;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{SchemaSpec, build_blob};
    use crate::report::NullReport;

    /// vec2 { float x; float y; }  (8 bytes)
    /// Transform { vec2 pos[2]; int pad; }  (20 bytes)
    /// Object { Transform tf; float weight; Object *parent; }  (32 bytes, 8-byte ptrs)
    fn nested_spec() -> SchemaSpec {
        SchemaSpec {
            names: vec!["x", "y", "pos[2]", "pad", "tf", "weight", "*parent"],
            types: vec![
                ("float", 4),
                ("int", 4),
                ("vec2", 8),
                ("Transform", 20),
                ("Object", 32),
            ],
            structs: vec![
                (2, vec![(0, 0), (0, 1)]),
                (3, vec![(2, 2), (1, 3)]),
                (4, vec![(3, 4), (0, 5), (4, 6)]),
            ],
        }
    }

    fn compile_nested() -> CompiledSchema {
        let sdna = Sdna::parse(&build_blob(&nested_spec()), false).unwrap();
        CompiledSchema::compile(sdna, 8, &NullReport).unwrap()
    }

    #[test]
    fn test_flat_struct_offsets() {
        let schema = compile_nested();
        let vec2 = &schema.structs[0];
        assert_eq!(vec2.members.len(), 2);
        assert_eq!(vec2.members[0].offset, 0);
        assert_eq!(vec2.members[1].offset, 4);
        assert!(!vec2.misaligned);
    }

    #[test]
    fn test_embedded_expansion() {
        let schema = compile_nested();
        let object = &schema.structs[2];

        // Object flattens to: x,y (pos rep 0), x,y (pos rep 1), pad, weight, *parent
        assert_eq!(object.members.len(), 7);
        let offsets: Vec<u32> = object.members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 12, 16, 20, 24]);
        assert!(!object.misaligned);

        // Depth equals key-chain length for every member
        for member in &object.members {
            assert_eq!(member.depth as usize, member.key_chain.len());
        }
        assert_eq!(object.members[0].depth, 2); // x inside vec2 inside Transform
        assert_eq!(object.members[4].depth, 1); // pad inside Transform
        assert_eq!(object.members[5].depth, 0); // weight
    }

    #[test]
    fn test_array_repetition_indices() {
        let schema = compile_nested();
        let object = &schema.structs[2];

        // The two pos repetitions produce distinct rep indices
        assert_eq!(object.members[0].rep_index, 0); // pos[0].x
        assert_eq!(object.members[2].rep_index, 1); // pos[1].x
        assert_eq!(object.members[0].name_hash, object.members[2].name_hash);
        assert_eq!(object.members[0].key_chain, object.members[2].key_chain);
    }

    #[test]
    fn test_pointer_member_size() {
        let schema = compile_nested();
        let object = &schema.structs[2];
        let parent = object.members.last().unwrap();
        assert_eq!(parent.ptr_count, 1);
        assert_eq!(parent.length, 8);
        assert_eq!(parent.elem_size(), 8);
    }

    #[test]
    fn test_misaligned_struct_flagged() {
        let mut spec = nested_spec();
        // Declare Transform as 24 bytes; its members still sum to 20
        spec.types[3].1 = 24;
        let sdna = Sdna::parse(&build_blob(&spec), false).unwrap();
        let schema = CompiledSchema::compile(sdna, 8, &NullReport).unwrap();
        assert!(schema.structs[1].misaligned);
        // Advisory only: the struct still compiles with its members
        assert_eq!(schema.structs[1].members.len(), 3);
    }

    #[test]
    fn test_struct_lookup() {
        let schema = compile_nested();
        assert_eq!(schema.find_struct_by_name("Object"), Some(2));
        assert_eq!(schema.find_struct_by_name("float"), None);
        assert_eq!(schema.struct_name(1), "Transform");
    }

    #[test]
    fn test_pointer_width_differences() {
        let sdna = Sdna::parse(&build_blob(&nested_spec()), false).unwrap();
        let schema32 = CompiledSchema::compile(sdna, 4, &NullReport).unwrap();
        let parent = schema32.structs[2].members.last().unwrap();
        assert_eq!(parent.length, 4);
        // 4-byte pointers shrink Object below its declared 64-bit size
        assert!(schema32.structs[2].misaligned);
    }
}
