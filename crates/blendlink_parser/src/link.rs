//! Schema matching: reconcile a file schema against the reference schema
//!
//! For every struct of the reference ("memory") schema, find the file
//! struct of the same type name, then pair up members by identity: same
//! repetition index, same embedding depth, same base-name hash and an
//! element-wise equal key chain. Identity alone is not enough to copy:
//! members additionally need compatible types, accepted in three tiers
//! (exact, integer-widening, numeric-with-cast). Pointer members only ever
//! match other pointer members of equal indirection.
//!
//! The result is a pair of parallel match tables; compiled trees are never
//! mutated.

use crate::compile::{CompiledMember, CompiledSchema};
use crate::report::Report;
use crate::sdna::PrimKind;
use blendlink_error::{BlendLinkError, LinkErrorKind, Result};

/// The universal list-node type whose layout never changes across schema
/// versions; its blocks are copied verbatim instead of field-matched.
pub const SENTINEL_TYPE: &str = "Link";

/// A member of the reference schema paired with its file counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberMatch {
    /// Index into the file struct's member list
    pub file_member: u32,
    /// Copying requires a numeric conversion (float/int or float/double)
    pub cast: bool,
}

/// A reference struct paired with its file counterpart
#[derive(Debug, Clone)]
pub struct StructMatch {
    /// Index into the file schema's struct list
    pub file_struct: u32,
    /// Byte-for-byte bypass for the sentinel list-node type
    pub sentinel: bool,
    /// One entry per reference member; `None` means missing in the file
    /// (the member stays zero-filled after relocation)
    pub members: Vec<Option<MemberMatch>>,
}

/// Match tables produced by [`link_schemas`]
#[derive(Debug)]
pub struct SchemaLink {
    /// Indexed by reference struct; `None` when the file lacks the type
    pub per_struct: Vec<Option<StructMatch>>,
    /// Indexed by file struct; the reference struct it corresponds to
    pub file_to_memory: Vec<Option<u32>>,
}

impl SchemaLink {
    pub fn memory_struct_for(&self, file_struct: usize) -> Option<usize> {
        self.file_to_memory
            .get(file_struct)
            .copied()
            .flatten()
            .map(|index| index as usize)
    }
}

/// True when the two members denote the same field: same repetition, same
/// embedding depth, same base name, same embedding ancestry.
fn same_identity(memory: &CompiledMember, file: &CompiledMember) -> bool {
    memory.rep_index == file.rep_index
        && memory.depth == file.depth
        && memory.name_hash == file.name_hash
        && memory.key_chain == file.key_chain
}

fn match_member(
    memory_schema: &CompiledSchema,
    file_schema: &CompiledSchema,
    member: &CompiledMember,
    file_members: &[CompiledMember],
) -> Option<MemberMatch> {
    let memory_kind = memory_schema.sdna.prim_kind(member.type_index);

    let mut integer_candidate = None;
    let mut numeric_candidate = None;

    for (index, candidate) in file_members.iter().enumerate() {
        if !same_identity(member, candidate) {
            continue;
        }

        // Exact: same type, same indirection
        if candidate.type_hash == member.type_hash && candidate.ptr_count == member.ptr_count {
            return Some(MemberMatch {
                file_member: index as u32,
                cast: false,
            });
        }

        if member.is_pointer() {
            // Pointers are address-only patch targets: the declared element
            // type may differ, the indirection may not. Numeric tiers never
            // apply.
            if candidate.is_pointer() && candidate.ptr_count == member.ptr_count {
                return Some(MemberMatch {
                    file_member: index as u32,
                    cast: false,
                });
            }
            continue;
        }
        if candidate.is_pointer() {
            continue;
        }

        let (Some(mk), Some(fk)) = (
            memory_kind,
            file_schema.sdna.prim_kind(candidate.type_index),
        ) else {
            continue;
        };

        if mk.is_integer() && fk.is_integer() {
            // Width-coercing integer match; the copy path widens/narrows
            // sign-correctly without a cast flag
            integer_candidate.get_or_insert(index as u32);
        } else {
            numeric_candidate.get_or_insert(index as u32);
        }
    }

    if let Some(index) = integer_candidate {
        return Some(MemberMatch {
            file_member: index,
            cast: false,
        });
    }
    numeric_candidate.map(|index| MemberMatch {
        file_member: index,
        cast: true,
    })
}

/// Build the struct- and member-level correspondence between the reference
/// schema and a file schema.
pub fn link_schemas(
    memory: &CompiledSchema,
    file: &CompiledSchema,
    report: &dyn Report,
) -> Result<SchemaLink> {
    if file.structs.is_empty() {
        return Err(BlendLinkError::link(
            "file schema contains no structs",
            LinkErrorKind::StructMatchFailed,
        ));
    }

    let sentinel_index = memory.find_struct_by_name(SENTINEL_TYPE);
    let mut per_struct = Vec::with_capacity(memory.structs.len());
    let mut file_to_memory = vec![None; file.structs.len()];
    let mut missing_structs = 0usize;
    let mut missing_members = 0usize;

    for (memory_index, memory_struct) in memory.structs.iter().enumerate() {
        let Some(file_index) = file.find_struct_by_hash(memory_struct.type_hash) else {
            missing_structs += 1;
            report.trace(&format!(
                "struct '{}' not present in file schema",
                memory.struct_name(memory_index)
            ));
            per_struct.push(None);
            continue;
        };
        file_to_memory[file_index] = Some(memory_index as u32);

        let file_members = &file.structs[file_index].members;
        let mut members = Vec::with_capacity(memory_struct.members.len());
        for member in &memory_struct.members {
            let matched = match_member(memory, file, member, file_members);
            if matched.is_none() {
                missing_members += 1;
                report.trace(&format!(
                    "member '{}.{}' has no counterpart in the file schema",
                    memory.struct_name(memory_index),
                    memory.sdna.names[member.name_index as usize].base
                ));
            }
            members.push(matched);
        }

        per_struct.push(Some(StructMatch {
            file_struct: file_index as u32,
            sentinel: sentinel_index == Some(memory_index),
            members,
        }));
    }

    log::debug!(
        "linked schemas: {} structs, {missing_structs} unmatched, {missing_members} missing members",
        memory.structs.len()
    );

    Ok(SchemaLink {
        per_struct,
        file_to_memory,
    })
}
