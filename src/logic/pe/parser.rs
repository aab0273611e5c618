//! PE Structural Parser
//!
//! Minimal DOS/COFF/optional-header walk over an untrusted byte buffer.
//! Only what the entry-point disassembly needs: bitness, entry RVA and the
//! section table used for RVA → file offset mapping.

use serde::Serialize;
use std::io::Read;
use std::path::Path;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Smallest buffer accepted as a candidate image
pub const MIN_PE_SIZE: usize = 0x100;

/// Location of `e_lfanew` in the DOS header
const PE_OFFSET_FIELD: usize = 0x3C;

/// Signature + COFF header
const PE_HEADER_REQUIRED: usize = 0x18;

const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE32_PLUS_MAGIC: u16 = 0x20B;
const SECTION_ENTRY_SIZE: usize = 40;

/// Bytes read first when probing whether a file is PE
const PROBE_HEADER_BYTES: u64 = 4096;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeHeaderInfo {
    pub entry_rva: u32,
    pub is64: bool,
    pub sections: Vec<Section>,
}

#[derive(Debug, thiserror::Error)]
pub enum PeError {
    #[error("Malformed PE header: {0}")]
    Malformed(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// PARSING
// ============================================================================

fn read_u16(buf: &[u8], at: usize) -> Result<u16, PeError> {
    buf.get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(PeError::Malformed("field out of range"))
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32, PeError> {
    buf.get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(PeError::Malformed("field out of range"))
}

/// Parse DOS/PE headers and the section table.
///
/// A section table cut short by the end of the buffer yields the sections
/// that fit rather than an error.
pub fn parse_headers(buffer: &[u8]) -> Result<PeHeaderInfo, PeError> {
    if buffer.len() < MIN_PE_SIZE {
        return Err(PeError::Malformed("file too small to be a valid PE"));
    }

    let pe_offset = read_u32(buffer, PE_OFFSET_FIELD)? as usize;
    if pe_offset.saturating_add(PE_HEADER_REQUIRED) > buffer.len() {
        return Err(PeError::Malformed("invalid PE header offset"));
    }

    if &buffer[pe_offset..pe_offset + 4] != PE_SIGNATURE {
        return Err(PeError::Malformed("not a PE file"));
    }

    let number_of_sections = read_u16(buffer, pe_offset + 6)? as usize;
    let size_of_optional_header = read_u16(buffer, pe_offset + 20)? as usize;
    let optional_header_offset = pe_offset + 24;

    let magic = read_u16(buffer, optional_header_offset)?;
    let is64 = magic == PE32_PLUS_MAGIC;
    let entry_rva = read_u32(buffer, optional_header_offset + 16)?;

    let section_table_offset = optional_header_offset + size_of_optional_header;
    let mut sections = Vec::with_capacity(number_of_sections.min(96));

    for i in 0..number_of_sections {
        let offset = section_table_offset + i * SECTION_ENTRY_SIZE;
        let Some(entry) = buffer.get(offset..offset + SECTION_ENTRY_SIZE) else {
            break;
        };

        let raw_name = &entry[0..8];
        let name_len = raw_name.iter().rposition(|&b| b != 0).map(|p| p + 1).unwrap_or(0);
        let name = String::from_utf8_lossy(&raw_name[..name_len]).to_string();

        sections.push(Section {
            name,
            virtual_size: read_u32(entry, 8)?,
            virtual_address: read_u32(entry, 12)?,
            size_of_raw_data: read_u32(entry, 16)?,
            pointer_to_raw_data: read_u32(entry, 20)?,
        });
    }

    Ok(PeHeaderInfo { entry_rva, is64, sections })
}

/// Map an RVA to a file offset through the first section that spans it.
pub fn rva_to_offset(rva: u32, sections: &[Section]) -> Option<u32> {
    sections.iter().find_map(|section| {
        let start = u64::from(section.virtual_address);
        let span = u64::from(section.virtual_size.max(section.size_of_raw_data));
        let rva = u64::from(rva);

        if rva >= start && rva < start + span {
            let offset = u64::from(section.pointer_to_raw_data) + (rva - start);
            u32::try_from(offset).ok()
        } else {
            None
        }
    })
}

// ============================================================================
// FILE PROBE
// ============================================================================

/// Whether the file at `path` carries valid PE headers.
///
/// Only the first 4 KiB are read unless those fail to parse, in which case
/// the whole file gets a second chance.
pub fn is_pe_file(path: &Path) -> Result<bool, PeError> {
    let mut head = Vec::with_capacity(PROBE_HEADER_BYTES as usize);
    std::fs::File::open(path)?
        .take(PROBE_HEADER_BYTES)
        .read_to_end(&mut head)?;

    if parse_headers(&head).is_ok() {
        return Ok(true);
    }

    let metadata = std::fs::metadata(path)?;
    if metadata.len() <= PROBE_HEADER_BYTES {
        return Ok(false);
    }

    let full = std::fs::read(path)?;
    Ok(parse_headers(&full).is_ok())
}

// ============================================================================
// TESTS
// ============================================================================
