//! Binary codecs for the game's text-bearing record formats.
//!
//! Each codec parses a whole file buffer, accepts replacement strings, and
//! serialises a new buffer with every derived offset and count recomputed.
//!
//! - [`text_table`]: header + (offset, length) pointer table + text blob
//! - [`scenario`]: tagged instruction stream with an embedded string table
//! - [`monster`]: stats block followed by fixed-width string slots
//! - [`monster_note`]: bestiary archive rebuilt from monster files
//! - [`patch`]: declarative byte patches for the executable

pub mod monster;
pub mod monster_note;
pub mod patch;
pub mod scenario;
pub mod text_table;

pub use monster::MonsterFile;
pub use patch::{BinaryPatch, PatchKind, apply_patches};
pub use scenario::{Instruction, Operand, OperandType, ScenarioFile};
pub use text_table::{CountWidth, TextTable, TextTableLayout};
