//! Block relocation: materialize chunks in reference layout
//!
//! Every loaded chunk still carries its bytes in file layout, with pointer
//! fields holding addresses from the writing process. Relocation runs two
//! passes over the chunk list:
//!
//! 1. **Allocate**: chunks whose file struct matched a reference struct get
//!    a zero-filled new block (reference struct size × element count) and a
//!    synthetic new-space address. Unmatched chunk types are dropped here.
//! 2. **Patch**: every matched member is transferred: bulk byte copy on an
//!    exact type match, per-slot numeric conversion otherwise, byte-swap
//!    first when the file is foreign-endian. Single pointers are rewritten
//!    through the address map; pointer-array targets are converted in place
//!    to arrays of new-space addresses (translated once, cached via a flag).
//!
//! Because allocation finishes before any pointer is resolved, the address
//! map is total over live chunks during the patch pass; a miss means the
//! target was never loaded and the pointer becomes null, which callers must
//! tolerate.

use crate::codec::{CODE_DNA1, ChunkHead, OldAddress};
use crate::compile::{CompiledMember, CompiledSchema};
use crate::dense::DenseTable;
use crate::link::SchemaLink;
use crate::report::Report;
use crate::sdna::PrimKind;
use blendlink_error::Result;
use bytes::Bytes;
use log::debug;

/// First synthetic new-space address handed out
const NEW_SPACE_BASE: u64 = 0x1000;

/// Old file-space address to chunk-list index
pub type AddressMap = DenseTable<OldAddress, u32>;

/// One loaded chunk through its relocation lifecycle
#[derive(Debug)]
pub struct Chunk {
    pub head: ChunkHead,
    /// Bytes in file layout; released once relocation completes
    pub old_data: Option<Bytes>,
    /// Bytes in reference layout; `None` for dropped chunks
    pub new_data: Option<Vec<u8>>,
    /// Synthetic new-space address; 0 while unallocated
    pub new_address: u64,
    /// Matched reference struct, set during the allocate pass
    pub memory_struct: Option<u32>,
    /// The new block holds translated pointer-array entries
    pub ptr_array_converted: bool,
}

impl Chunk {
    pub fn new(head: ChunkHead, payload: Bytes) -> Chunk {
        Chunk {
            head,
            old_data: Some(payload),
            new_data: None,
            new_address: 0,
            memory_struct: None,
            ptr_array_converted: false,
        }
    }

    /// Relocated bytes, if this chunk survived relocation.
    pub fn data(&self) -> Option<&[u8]> {
        self.new_data.as_deref()
    }

    pub fn is_live(&self) -> bool {
        self.new_data.is_some()
    }
}

/// Build the old-address map over the chunk list.
///
/// Duplicate policy (relaxed): the first chunk owns the address. An exact
/// duplicate is coalesced silently; a conflicting one is reported and left
/// unmapped, so nothing ever points at it.
pub fn build_address_map(chunks: &[Chunk], report: &dyn Report) -> AddressMap {
    let mut map = AddressMap::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.head.old.is_null() {
            continue;
        }
        if !map.insert(chunk.head.old, index as u32) {
            let prior = *map.get(&chunk.head.old).unwrap() as usize;
            if chunks[prior].head == chunk.head {
                report.trace(&format!(
                    "coalesced duplicate chunk at address {}",
                    chunk.head.old
                ));
            } else {
                report.warn(&format!(
                    "conflicting chunks at address {}: keeping chunk {prior}, dropping {index}",
                    chunk.head.old
                ));
            }
        }
    }
    map
}

pub struct Relocator<'a> {
    memory: &'a CompiledSchema,
    file: &'a CompiledSchema,
    link: &'a SchemaLink,
    map: &'a AddressMap,
    /// File bytes are foreign-endian and need swapping
    swap: bool,
    report: &'a dyn Report,
}

impl<'a> Relocator<'a> {
    pub fn new(
        memory: &'a CompiledSchema,
        file: &'a CompiledSchema,
        link: &'a SchemaLink,
        map: &'a AddressMap,
        swap: bool,
        report: &'a dyn Report,
    ) -> Relocator<'a> {
        Relocator {
            memory,
            file,
            link,
            map,
            swap,
            report,
        }
    }

    /// Run both passes and release the old payloads.
    pub fn run(&self, chunks: &mut [Chunk]) -> Result<()> {
        let mut cursor = NEW_SPACE_BASE;
        self.allocate(chunks, &mut cursor);
        self.patch(chunks, &mut cursor)?;

        let mut live = 0usize;
        for chunk in chunks.iter_mut() {
            if chunk.new_data.is_some() {
                live += 1;
                self.report.trace(&format!(
                    "materialized {} chunk at {:#x}",
                    chunk.head.code_string(),
                    chunk.new_address
                ));
            }
            chunk.old_data = None;
        }
        debug!("relocated {live} of {} chunks", chunks.len());
        Ok(())
    }

    fn take_address(cursor: &mut u64, length: usize) -> u64 {
        let address = *cursor;
        *cursor += ((length.max(1) as u64) + 15) & !15;
        address
    }

    /// Pass 1: resolve types, allocate zero-filled new blocks.
    fn allocate(&self, chunks: &mut [Chunk], cursor: &mut u64) {
        for index in 0..chunks.len() {
            let head = chunks[index].head;
            if head.code == CODE_DNA1 {
                continue;
            }
            // A duplicate address belongs to the first chunk that claimed it
            if !head.old.is_null()
                && self.map.get(&head.old) != Some(&(index as u32))
            {
                continue;
            }
            let file_struct = head.sdna_index as usize;
            if file_struct >= self.file.structs.len() {
                self.report.warn(&format!(
                    "chunk {index} declares unknown struct index {file_struct}"
                ));
                continue;
            }
            let Some(memory_index) = self.link.memory_struct_for(file_struct) else {
                self.report.trace(&format!(
                    "dropping chunk {index}: struct '{}' not in reference schema",
                    self.file.struct_name(file_struct)
                ));
                continue;
            };

            let sentinel = self.link.per_struct[memory_index]
                .as_ref()
                .is_some_and(|m| m.sentinel);
            let new_length = if sentinel {
                // Sentinel blocks keep their original extent
                chunks[index].old_data.as_ref().map_or(0, |d| d.len())
            } else {
                self.memory.structs[memory_index].size as usize * head.count.max(1) as usize
            };

            chunks[index].memory_struct = Some(memory_index as u32);
            chunks[index].new_data = Some(vec![0u8; new_length]);
            chunks[index].new_address = Self::take_address(cursor, new_length);
        }
    }

    /// Pass 2: transfer members and rewrite pointers.
    fn patch(&self, chunks: &mut [Chunk], cursor: &mut u64) -> Result<()> {
        for index in 0..chunks.len() {
            if chunks[index].ptr_array_converted {
                continue;
            }
            let Some(memory_index) = chunks[index].memory_struct.map(|i| i as usize) else {
                continue;
            };
            let Some(old) = chunks[index].old_data.clone() else {
                continue;
            };
            let Some(mut new_data) = chunks[index].new_data.take() else {
                continue;
            };
            let head = chunks[index].head;

            let matched = self.link.per_struct[memory_index]
                .as_ref()
                .expect("allocated chunk always has a struct match");

            if matched.sentinel {
                let n = old.len().min(new_data.len());
                new_data[..n].copy_from_slice(&old[..n]);
                chunks[index].new_data = Some(new_data);
                continue;
            }

            let memory_struct = &self.memory.structs[memory_index];
            let file_struct = &self.file.structs[matched.file_struct as usize];

            for elem in 0..head.count.max(1) as usize {
                let src_base = elem * file_struct.size as usize;
                let dst_base = elem * memory_struct.size as usize;
                if src_base + file_struct.size as usize > old.len()
                    || dst_base + memory_struct.size as usize > new_data.len()
                {
                    break;
                }

                for (member_index, member_match) in matched.members.iter().enumerate() {
                    let Some(mm) = member_match else { continue };
                    let member = &memory_struct.members[member_index];
                    let file_member = &file_struct.members[mm.file_member as usize];
                    let src = src_base + file_member.offset as usize;
                    let dst = dst_base + member.offset as usize;

                    if member.ptr_count >= 2 {
                        self.patch_pointer_array_member(
                            chunks,
                            cursor,
                            &old,
                            &mut new_data,
                            member,
                            file_member,
                            src,
                            dst,
                        );
                    } else if member.is_pointer() {
                        self.patch_pointer_member(
                            chunks,
                            &old,
                            &mut new_data,
                            member,
                            file_member,
                            src,
                            dst,
                        );
                    } else {
                        self.copy_data_member(
                            &old,
                            &mut new_data,
                            member,
                            file_member,
                            mm.cast,
                            src,
                            dst,
                        );
                    }
                }
            }

            chunks[index].new_data = Some(new_data);
        }
        Ok(())
    }

    fn file_ptr_size(&self) -> usize {
        self.file.pointer_size as usize
    }

    fn memory_ptr_size(&self) -> usize {
        self.memory.pointer_size as usize
    }

    /// Read one file-space pointer out of old-layout bytes.
    fn read_old_ptr(&self, data: &[u8], offset: usize) -> Option<OldAddress> {
        let size = self.file_ptr_size();
        if offset + size > data.len() {
            return None;
        }
        let value = match size {
            4 => {
                let bytes: [u8; 4] = data[offset..offset + 4].try_into().unwrap();
                let v = u32::from_ne_bytes(bytes);
                (if self.swap { v.swap_bytes() } else { v }) as u64
            }
            _ => {
                let bytes: [u8; 8] = data[offset..offset + 8].try_into().unwrap();
                let v = u64::from_ne_bytes(bytes);
                if self.swap { v.swap_bytes() } else { v }
            }
        };
        Some(OldAddress(value))
    }

    /// Write one new-space address into reference-layout bytes.
    fn write_new_ptr(&self, data: &mut [u8], offset: usize, address: u64) {
        match self.memory_ptr_size() {
            4 => data[offset..offset + 4].copy_from_slice(&(address as u32).to_ne_bytes()),
            _ => data[offset..offset + 8].copy_from_slice(&address.to_ne_bytes()),
        }
    }

    /// Look up the new-space address an old address maps to; 0 when the
    /// target was never loaded or was dropped.
    fn resolve(&self, chunks: &[Chunk], old: OldAddress) -> u64 {
        if old.is_null() {
            return 0;
        }
        match self.map.get(&old) {
            Some(&index) => chunks[index as usize].new_address,
            None => 0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn patch_pointer_member(
        &self,
        chunks: &[Chunk],
        old: &[u8],
        new_data: &mut [u8],
        member: &CompiledMember,
        file_member: &CompiledMember,
        src: usize,
        dst: usize,
    ) {
        let slots = member.elem_count.min(file_member.elem_count) as usize;
        for slot in 0..slots {
            let Some(old_ptr) = self.read_old_ptr(old, src + slot * self.file_ptr_size()) else {
                break;
            };
            let address = self.resolve(chunks, old_ptr);
            self.write_new_ptr(new_data, dst + slot * self.memory_ptr_size(), address);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn patch_pointer_array_member(
        &self,
        chunks: &mut [Chunk],
        cursor: &mut u64,
        old: &[u8],
        new_data: &mut [u8],
        member: &CompiledMember,
        file_member: &CompiledMember,
        src: usize,
        dst: usize,
    ) {
        let slots = member.elem_count.min(file_member.elem_count) as usize;
        for slot in 0..slots {
            let Some(old_ptr) = self.read_old_ptr(old, src + slot * self.file_ptr_size()) else {
                break;
            };
            let mut address = 0u64;
            if let Some(&target) = self.map.get(&old_ptr) {
                self.convert_ptr_array(chunks, cursor, target as usize);
                address = chunks[target as usize].new_address;
            }
            self.write_new_ptr(new_data, dst + slot * self.memory_ptr_size(), address);
        }
    }

    /// Turn the target block of a pointer-to-pointer member into an array
    /// of new-space addresses. Runs once per block; later references reuse
    /// the translated array.
    fn convert_ptr_array(&self, chunks: &mut [Chunk], cursor: &mut u64, target: usize) {
        if chunks[target].ptr_array_converted {
            return;
        }
        let Some(old) = chunks[target].old_data.clone() else {
            return;
        };
        let count = old.len() / self.file_ptr_size();
        let mut array = vec![0u8; count * self.memory_ptr_size()];
        for entry in 0..count {
            let Some(old_ptr) = self.read_old_ptr(&old, entry * self.file_ptr_size()) else {
                break;
            };
            let address = self.resolve(chunks, old_ptr);
            self.write_new_ptr(&mut array, entry * self.memory_ptr_size(), address);
        }
        if chunks[target].new_address == 0 {
            chunks[target].new_address = Self::take_address(cursor, array.len());
        }
        chunks[target].new_data = Some(array);
        chunks[target].ptr_array_converted = true;
    }

    #[allow(clippy::too_many_arguments)]
    fn copy_data_member(
        &self,
        old: &[u8],
        new_data: &mut [u8],
        member: &CompiledMember,
        file_member: &CompiledMember,
        cast: bool,
        src: usize,
        dst: usize,
    ) {
        let src_elem = file_member.elem_size() as usize;
        let dst_elem = member.elem_size() as usize;
        if src_elem == 0 || dst_elem == 0 {
            return;
        }

        let same_type = member.type_hash == file_member.type_hash && src_elem == dst_elem;
        if same_type && !self.swap && !cast {
            let n = (member.length as usize).min(file_member.length as usize);
            if src + n <= old.len() && dst + n <= new_data.len() {
                new_data[dst..dst + n].copy_from_slice(&old[src..src + n]);
            }
            return;
        }

        let src_kind = self.file.sdna.prim_kind(file_member.type_index);
        let dst_kind = self.memory.sdna.prim_kind(member.type_index);
        let slots = member.elem_count.min(file_member.elem_count) as usize;
        let mut scratch = [0u8; 8];

        for slot in 0..slots {
            let src_off = src + slot * src_elem;
            let dst_off = dst + slot * dst_elem;
            if src_off + src_elem > old.len() || dst_off + dst_elem > new_data.len() {
                break;
            }

            let n = src_elem.min(8);
            scratch[..n].copy_from_slice(&old[src_off..src_off + n]);
            if self.swap {
                match n {
                    1 => {}
                    2 | 4 | 8 => scratch[..n].reverse(),
                    // Unknown widths cannot be swapped meaningfully
                    _ => scratch = [0u8; 8],
                }
            }

            match (src_kind, dst_kind) {
                (Some(sk), Some(dk)) if sk != dk || src_elem != dst_elem => {
                    convert_scalar(&scratch[..n], sk, &mut new_data[dst_off..dst_off + dst_elem], dk);
                }
                _ => {
                    let m = n.min(dst_elem);
                    new_data[dst_off..dst_off + m].copy_from_slice(&scratch[..m]);
                }
            }
        }
    }
}

/// Read a host-order scalar as a signed 64-bit intermediate.
fn read_int(bytes: &[u8], signed: bool) -> i64 {
    match (bytes.len(), signed) {
        (1, true) => bytes[0] as i8 as i64,
        (1, false) => bytes[0] as i64,
        (2, true) => i16::from_ne_bytes(bytes.try_into().unwrap()) as i64,
        (2, false) => u16::from_ne_bytes(bytes.try_into().unwrap()) as i64,
        (4, true) => i32::from_ne_bytes(bytes.try_into().unwrap()) as i64,
        (4, false) => u32::from_ne_bytes(bytes.try_into().unwrap()) as i64,
        (8, _) => i64::from_ne_bytes(bytes.try_into().unwrap()),
        _ => 0,
    }
}

fn write_int(bytes: &mut [u8], value: i64) {
    match bytes.len() {
        1 => bytes[0] = value as u8,
        2 => bytes.copy_from_slice(&(value as u16).to_ne_bytes()),
        4 => bytes.copy_from_slice(&(value as u32).to_ne_bytes()),
        8 => bytes.copy_from_slice(&(value as u64).to_ne_bytes()),
        _ => {}
    }
}

fn read_float(bytes: &[u8]) -> f64 {
    match bytes.len() {
        4 => f32::from_ne_bytes(bytes.try_into().unwrap()) as f64,
        8 => f64::from_ne_bytes(bytes.try_into().unwrap()),
        _ => 0.0,
    }
}

fn write_float(bytes: &mut [u8], value: f64) {
    match bytes.len() {
        4 => bytes.copy_from_slice(&(value as f32).to_ne_bytes()),
        8 => bytes.copy_from_slice(&value.to_ne_bytes()),
        _ => {}
    }
}

/// Convert one scalar between primitive kinds. Integer-to-integer goes
/// through a signed 64-bit intermediate (sign-correct for every width);
/// anything involving a float goes through f64.
fn convert_scalar(src: &[u8], src_kind: PrimKind, dst: &mut [u8], dst_kind: PrimKind) {
    if src_kind.is_float() || dst_kind.is_float() {
        let value = if src_kind.is_float() {
            read_float(src)
        } else {
            let int = read_int(src, src_kind.is_signed());
            if src_kind.is_signed() { int as f64 } else { int as u64 as f64 }
        };
        if dst_kind.is_float() {
            write_float(dst, value);
        } else {
            write_int(dst, value as i64);
        }
    } else {
        write_int(dst, read_int(src, src_kind.is_signed()));
    }
}
