//! Scenario script files (`scena/*.bin`).
//!
//! Layout, all fields little-endian:
//!
//! ```text
//! 0x00  magic               "SCN\x01"
//! 0x04  entry_count         u32
//! 0x08  entry_table_offset  u32  absolute
//! 0x0C  code_offset         u32  absolute
//! 0x10  code_length         u32
//! 0x14  string_table_offset u32  absolute
//! 0x18  string_count        u32
//! ```
//!
//! The entry table holds code-relative offsets of the script's entry points.
//! Code is a flat run of instructions, each an opcode byte, an operand count
//! byte and that many tagged operands. The string table is a sequence of
//! NUL-terminated strings referenced by index from `StringRef` operands.
//!
//! Jump targets and entry points are resolved to instruction indices on
//! parse, so strings may change length freely; [`ScenarioFile::fix`]
//! recomputes every byte offset and header field from the current contents.

use std::collections::HashMap;

use crossbell_core::{ByteCursor, Endian, RepackError, Result, TextEncoding, TextItem};

pub const MAGIC: &[u8; 4] = b"SCN\x01";

/// Size of the fixed header.
pub const HEADER_SIZE: usize = 0x1C;

const TAG_BYTE: u8 = 0x01;
const TAG_INT16: u8 = 0x02;
const TAG_INT32: u8 = 0x03;
const TAG_STRING: u8 = 0x04;
const TAG_STRING_REF: u8 = 0x05;
const TAG_JUMP: u8 = 0x06;

/// Operand kind, without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandType {
    Byte,
    Int16,
    Int32,
    String,
    StringRef,
    Jump,
}

/// A tagged instruction operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Byte(u8),
    Int16(i16),
    Int32(i32),
    /// Inline text, stored as a u16 byte length and encoded bytes.
    String(String),
    /// Index into the string table.
    StringRef(u16),
    /// Target instruction, by index into the instruction list.
    Jump(usize),
}

impl Operand {
    pub fn kind(&self) -> OperandType {
        match self {
            Self::Byte(_) => OperandType::Byte,
            Self::Int16(_) => OperandType::Int16,
            Self::Int32(_) => OperandType::Int32,
            Self::String(_) => OperandType::String,
            Self::StringRef(_) => OperandType::StringRef,
            Self::Jump(_) => OperandType::Jump,
        }
    }

    /// Encoded size including the tag byte.
    fn encoded_size(&self, encoding: TextEncoding) -> Result<usize> {
        Ok(1 + match self {
            Self::Byte(_) => 1,
            Self::Int16(_) | Self::StringRef(_) => 2,
            Self::Int32(_) | Self::Jump(_) => 4,
            Self::String(s) => 2 + encoded_string(s, encoding)?.len(),
        })
    }
}

/// Encode inline operand text, checking it fits the u16 length prefix.
fn encoded_string(text: &str, encoding: TextEncoding) -> Result<Vec<u8>> {
    let bytes = encoding.encode(text);
    if bytes.len() > u16::MAX as usize {
        return Err(RepackError::format(format!(
            "inline string of {} bytes exceeds the u16 length prefix",
            bytes.len()
        )));
    }
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub operands: Vec<Operand>,
    /// Code-relative byte offset, valid after parse or [`ScenarioFile::fix`].
    offset: u32,
}

impl Instruction {
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// Header fields derived from the file contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenarioHeader {
    pub entry_count: u32,
    pub entry_table_offset: u32,
    pub code_offset: u32,
    pub code_length: u32,
    pub string_table_offset: u32,
    pub string_count: u32,
}

#[derive(Debug, Clone)]
pub struct ScenarioFile {
    header: ScenarioHeader,
    /// Bytes before the code, including header and entry table.
    preamble: Vec<u8>,
    entry_points: Vec<usize>,
    instructions: Vec<Instruction>,
    /// Bytes between the end of code and the string table.
    gap: Vec<u8>,
    strings: Vec<String>,
    /// Bytes after the last string.
    trailer: Vec<u8>,
    encoding: TextEncoding,
}

/// A jump or entry offset before it is resolved to an instruction index.
enum RawOperand {
    Ready(Operand),
    Jump(u32),
}

impl ScenarioFile {
    /// Parse a scenario file from a cursor positioned anywhere; reading
    /// starts at offset 0 and uses the cursor's encoding.
    pub fn parse(cursor: &mut ByteCursor) -> Result<Self> {
        let encoding = cursor.encoding();
        cursor.seek(0);
        let magic = cursor.read_bytes(4)?;
        if magic != MAGIC {
            return Err(RepackError::format(format!(
                "bad scenario magic {:02X?}",
                magic
            )));
        }
        let header = ScenarioHeader {
            entry_count: cursor.read_u32(Endian::Little)?,
            entry_table_offset: cursor.read_u32(Endian::Little)?,
            code_offset: cursor.read_u32(Endian::Little)?,
            code_length: cursor.read_u32(Endian::Little)?,
            string_table_offset: cursor.read_u32(Endian::Little)?,
            string_count: cursor.read_u32(Endian::Little)?,
        };

        let entry_table_end = header.entry_table_offset as u64 + header.entry_count as u64 * 4;
        let code_end = header.code_offset as u64 + header.code_length as u64;
        if (header.entry_table_offset as usize) < HEADER_SIZE
            || entry_table_end > header.code_offset as u64
            || code_end > header.string_table_offset as u64
            || header.string_table_offset as usize > cursor.len()
        {
            return Err(RepackError::format(format!(
                "inconsistent scenario header: {:?} for a {}-byte file",
                header,
                cursor.len()
            )));
        }

        cursor.seek(0);
        let preamble = cursor.read_bytes(header.code_offset as usize)?;

        cursor.seek(header.entry_table_offset as usize);
        let mut raw_entries = Vec::with_capacity(header.entry_count as usize);
        for _ in 0..header.entry_count {
            raw_entries.push(cursor.read_u32(Endian::Little)?);
        }

        // Instructions, with jumps still as byte offsets
        cursor.seek(header.code_offset as usize);
        let mut raw = Vec::new();
        let mut by_offset = HashMap::new();
        while (cursor.position() as u64) < code_end {
            let offset = (cursor.position() - header.code_offset as usize) as u32;
            by_offset.insert(offset, raw.len());
            let opcode = cursor.read_u8()?;
            let count = cursor.read_u8()?;
            let mut operands = Vec::with_capacity(count as usize);
            for _ in 0..count {
                operands.push(read_operand(cursor, header.string_count)?);
            }
            raw.push((opcode, operands, offset));
        }
        if cursor.position() as u64 != code_end {
            return Err(RepackError::format("last instruction runs past the end of code"));
        }

        let resolve = |target: u32, what: &str| {
            by_offset.get(&target).copied().ok_or_else(|| {
                RepackError::format(format!(
                    "{} target 0x{:X} is not an instruction boundary",
                    what, target
                ))
            })
        };

        let mut instructions = Vec::with_capacity(raw.len());
        for (opcode, operands, offset) in raw {
            let operands = operands
                .into_iter()
                .map(|op| match op {
                    RawOperand::Ready(op) => Ok(op),
                    RawOperand::Jump(target) => Ok(Operand::Jump(resolve(target, "jump")?)),
                })
                .collect::<Result<Vec<_>>>()?;
            instructions.push(Instruction {
                opcode,
                operands,
                offset,
            });
        }
        let entry_points = raw_entries
            .into_iter()
            .map(|target| resolve(target, "entry point"))
            .collect::<Result<Vec<_>>>()?;

        let gap_start = code_end as usize;
        let gap = cursor.bytes()[gap_start..header.string_table_offset as usize].to_vec();

        cursor.seek(header.string_table_offset as usize);
        let mut strings = Vec::with_capacity(header.string_count as usize);
        for _ in 0..header.string_count {
            strings.push(cursor.read_cstring()?);
        }
        let trailer = cursor.bytes()[cursor.position()..].to_vec();

        Ok(Self {
            header,
            preamble,
            entry_points,
            instructions,
            gap,
            strings,
            trailer,
            encoding,
        })
    }

    pub fn header(&self) -> &ScenarioHeader {
        &self.header
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Entry points as instruction indices.
    pub fn entry_points(&self) -> &[usize] {
        &self.entry_points
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn operand_count(&self) -> usize {
        self.instructions.iter().map(|i| i.operands.len()).sum()
    }

    /// Number of operands of the given kind.
    pub fn count_operands(&self, kind: OperandType) -> usize {
        self.instructions
            .iter()
            .flat_map(|i| &i.operands)
            .filter(|op| op.kind() == kind)
            .count()
    }

    /// Replace every operand matching `predicate`, in stream order.
    ///
    /// `replace` must return an operand of the same kind. On any error the
    /// file is left unchanged. Returns the number of operands replaced.
    pub fn visit_operands<P, F>(&mut self, mut predicate: P, mut replace: F) -> Result<usize>
    where
        P: FnMut(u8, &Operand) -> bool,
        F: FnMut(&Operand) -> Result<Operand>,
    {
        let mut instructions = self.instructions.clone();
        let mut replaced = 0;
        for instruction in &mut instructions {
            for operand in &mut instruction.operands {
                if !predicate(instruction.opcode, operand) {
                    continue;
                }
                let new = replace(operand)?;
                if new.kind() != operand.kind() {
                    return Err(RepackError::format(format!(
                        "cannot replace {:?} operand with {:?}",
                        operand.kind(),
                        new.kind()
                    )));
                }
                *operand = new;
                replaced += 1;
            }
        }
        self.instructions = instructions;
        Ok(replaced)
    }

    /// Replace each inline string operand with the next item's best text.
    pub fn replace_strings(&mut self, items: &[TextItem]) -> Result<()> {
        let expected = self.count_operands(OperandType::String);
        if items.len() != expected {
            return Err(RepackError::format(format!(
                "scenario has {} string operands but {} translations were supplied",
                expected,
                items.len()
            )));
        }
        let mut next = items.iter();
        self.visit_operands(
            |_, op| op.kind() == OperandType::String,
            |_| {
                next.next()
                    .map(|item| Operand::String(item.best_text().to_string()))
                    .ok_or_else(|| RepackError::format("ran out of translations"))
            },
        )?;
        Ok(())
    }

    pub fn string_table(&self) -> &[String] {
        &self.strings
    }

    /// Replace string table entries positionally.
    pub fn update_string_table(&mut self, values: Vec<String>) -> Result<()> {
        if values.len() != self.strings.len() {
            return Err(RepackError::format(format!(
                "string table has {} entries but {} values were supplied",
                self.strings.len(),
                values.len()
            )));
        }
        self.strings = values;
        Ok(())
    }

    /// Substitute string table entries with the translation of the first
    /// override whose source text matches exactly. An empty translation on
    /// that first match leaves the entry alone. Returns the number of
    /// entries changed.
    pub fn merge_string_table(&mut self, overrides: &[TextItem]) -> usize {
        let mut lookup: HashMap<&str, &str> = HashMap::new();
        for item in overrides {
            lookup.entry(item.text.as_str()).or_insert(item.translation.as_str());
        }
        let mut merged = 0;
        for entry in &mut self.strings {
            match lookup.get(entry.as_str()) {
                Some(&translation) if !translation.is_empty() && entry.as_str() != translation => {
                    *entry = translation.to_string();
                    merged += 1;
                }
                _ => {}
            }
        }
        merged
    }

    /// Recompute every derived offset and count from the current contents.
    ///
    /// Instruction offsets are laid out back to back from zero, jump targets
    /// and entry points follow their instructions, and the header's code
    /// length, string table offset and counts are refreshed.
    pub fn fix(&mut self) -> Result<()> {
        let mut offset = 0usize;
        for instruction in &mut self.instructions {
            instruction.offset = to_u32(offset)?;
            offset += 2;
            for operand in &instruction.operands {
                offset += operand.encoded_size(self.encoding)?;
            }
        }
        let header = &mut self.header;
        header.code_length = to_u32(offset)?;
        header.string_table_offset =
            to_u32(header.code_offset as usize + offset + self.gap.len())?;
        header.string_count = to_u32(self.strings.len())?;
        header.entry_count = to_u32(self.entry_points.len())?;
        Ok(())
    }

    /// Run [`fix`](Self::fix) and serialise the file.
    pub fn write(&mut self) -> Result<Vec<u8>> {
        self.fix()?;
        let h = self.header;

        let mut out = ByteCursor::new(self.preamble.clone(), self.encoding);
        out.seek(4);
        for field in [
            h.entry_count,
            h.entry_table_offset,
            h.code_offset,
            h.code_length,
            h.string_table_offset,
            h.string_count,
        ] {
            out.write_u32(field, Endian::Little);
        }

        out.seek(h.entry_table_offset as usize);
        for &index in &self.entry_points {
            out.write_u32(self.instructions[index].offset, Endian::Little);
        }

        out.seek(h.code_offset as usize);
        for instruction in &self.instructions {
            out.write_u8(instruction.opcode);
            out.write_u8(instruction.operands.len() as u8);
            for operand in &instruction.operands {
                self.write_operand(&mut out, operand)?;
            }
        }
        out.write_bytes(&self.gap);

        for s in &self.strings {
            out.write_cstring(s);
        }
        out.write_bytes(&self.trailer);
        Ok(out.into_inner())
    }

    fn write_operand(&self, out: &mut ByteCursor, operand: &Operand) -> Result<()> {
        match operand {
            Operand::Byte(v) => {
                out.write_u8(TAG_BYTE);
                out.write_u8(*v);
            }
            Operand::Int16(v) => {
                out.write_u8(TAG_INT16);
                out.write_u16(*v as u16, Endian::Little);
            }
            Operand::Int32(v) => {
                out.write_u8(TAG_INT32);
                out.write_u32(*v as u32, Endian::Little);
            }
            Operand::String(s) => {
                let bytes = encoded_string(s, self.encoding)?;
                out.write_u8(TAG_STRING);
                out.write_u16(bytes.len() as u16, Endian::Little);
                out.write_bytes(&bytes);
            }
            Operand::StringRef(index) => {
                out.write_u8(TAG_STRING_REF);
                out.write_u16(*index, Endian::Little);
            }
            Operand::Jump(target) => {
                let offset = self
                    .instructions
                    .get(*target)
                    .map(|i| i.offset)
                    .ok_or_else(|| {
                        RepackError::format(format!("jump to missing instruction {}", target))
                    })?;
                out.write_u8(TAG_JUMP);
                out.write_u32(offset, Endian::Little);
            }
        }
        Ok(())
    }
}

fn read_operand(cursor: &mut ByteCursor, string_count: u32) -> Result<RawOperand> {
    let at = cursor.position();
    let tag = cursor.read_u8()?;
    let operand = match tag {
        TAG_BYTE => Operand::Byte(cursor.read_u8()?),
        TAG_INT16 => Operand::Int16(cursor.read_i16(Endian::Little)?),
        TAG_INT32 => Operand::Int32(cursor.read_i32(Endian::Little)?),
        TAG_STRING => {
            let len = cursor.read_u16(Endian::Little)? as usize;
            Operand::String(cursor.read_string(len)?)
        }
        TAG_STRING_REF => {
            let index = cursor.read_u16(Endian::Little)?;
            if index as u32 >= string_count {
                return Err(RepackError::format(format!(
                    "string reference {} at 0x{:X} exceeds table of {}",
                    index, at, string_count
                )));
            }
            Operand::StringRef(index)
        }
        TAG_JUMP => return Ok(RawOperand::Jump(cursor.read_u32(Endian::Little)?)),
        other => {
            return Err(RepackError::format(format!(
                "unknown operand tag 0x{:02X} at 0x{:X}",
                other, at
            )));
        }
    };
    Ok(RawOperand::Ready(operand))
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| RepackError::format("scenario exceeds 4 GiB"))
}

#[cfg(test)]
#[path = "tests/scenario_tests.rs"]
mod tests;
