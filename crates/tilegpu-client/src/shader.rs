//! Shader program binaries.
//!
//! A binary is a little-endian word stream: a header followed by the sections it sizes, in
//! order.
//!
//! | word | field                                  |
//! |------|----------------------------------------|
//! | 0    | magic `b"SBIN"`                        |
//! | 1    | version [`VERSION`]                    |
//! | 2    | header size in bytes (at least 36)     |
//! | 3    | input attribute table, words           |
//! | 4    | output attribute table, words          |
//! | 5    | instructions, words (4 per slot)       |
//! | 6    | float constants, words (4 per vec4)    |
//! | 7    | integer constants, words               |
//! | 8    | boolean constants, words               |
//!
//! The whole binary is validated before anything is kept, so a malformed file never leaves a
//! partially loaded program behind.

use tilegpu_hw::{mmio, RegisterWindow};

use crate::error::ShaderError;

pub const MAGIC: u32 = u32::from_le_bytes(*b"SBIN");
pub const VERSION: u32 = 0xffff_0003;
const HEADER_WORDS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

impl ShaderStage {
    fn instmem(self) -> u32 {
        match self {
            Self::Vertex => mmio::VS_INSTMEM,
            Self::Pixel => mmio::PS_INSTMEM,
        }
    }

    pub(crate) fn const_float(self) -> u32 {
        match self {
            Self::Vertex => mmio::VS_CONST_FLOAT,
            Self::Pixel => mmio::PS_CONST_FLOAT,
        }
    }

    fn const_int(self) -> u32 {
        match self {
            Self::Vertex => mmio::VS_CONST_INT,
            Self::Pixel => mmio::PS_CONST_INT,
        }
    }

    fn const_bool(self) -> u32 {
        match self {
            Self::Vertex => mmio::VS_CONST_BOOL,
            Self::Pixel => mmio::PS_CONST_BOOL,
        }
    }

    fn pc_range(self) -> u32 {
        match self {
            Self::Vertex => mmio::VS_PC_RANGE,
            Self::Pixel => mmio::PS_PC_RANGE,
        }
    }

    fn attrib_num(self) -> u32 {
        match self {
            Self::Vertex => mmio::VS_ATTRIB_NUM,
            Self::Pixel => mmio::PS_ATTRIB_NUM,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderBinary {
    pub inputs: Vec<u32>,
    pub outputs: Vec<u32>,
    pub instructions: Vec<u32>,
    pub const_float: Vec<u32>,
    pub const_int: Vec<u32>,
    pub const_bool: Vec<u32>,
}

impl ShaderBinary {
    pub fn parse(bytes: &[u8]) -> Result<Self, ShaderError> {
        if bytes.len() % 4 != 0 {
            return Err(ShaderError::InvalidBinary("length is not a whole number of words"));
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        if words.len() < HEADER_WORDS {
            return Err(ShaderError::InvalidBinary("truncated header"));
        }
        if words[0] != MAGIC {
            return Err(ShaderError::InvalidBinary("bad magic"));
        }
        if words[1] != VERSION {
            return Err(ShaderError::InvalidBinary("unsupported version"));
        }

        let header_bytes = words[2] as usize;
        if header_bytes % 4 != 0 || header_bytes / 4 < HEADER_WORDS {
            return Err(ShaderError::InvalidBinary("bad header size"));
        }
        let sizes: Vec<usize> = words[3..HEADER_WORDS].iter().map(|&n| n as usize).collect();
        if sizes[2] % 4 != 0 {
            return Err(ShaderError::InvalidBinary("instruction section is not whole slots"));
        }
        if sizes[3] % 4 != 0 {
            return Err(ShaderError::InvalidBinary("float constants are not whole vec4s"));
        }

        let body = sizes
            .iter()
            .try_fold(header_bytes / 4, |acc, &n| acc.checked_add(n))
            .ok_or(ShaderError::InvalidBinary("section sizes overflow"))?;
        if body != words.len() {
            return Err(ShaderError::InvalidBinary("section sizes do not match the file length"));
        }

        let mut cursor = header_bytes / 4;
        let mut section = |len: usize| {
            let out = words[cursor..cursor + len].to_vec();
            cursor += len;
            out
        };
        Ok(Self {
            inputs: section(sizes[0]),
            outputs: section(sizes[1]),
            instructions: section(sizes[2]),
            const_float: section(sizes[3]),
            const_int: section(sizes[4]),
            const_bool: section(sizes[5]),
        })
    }

    /// Check that the program fits the shader unit of `stage`.
    pub fn check_fits(&self, stage: ShaderStage) -> Result<(), ShaderError> {
        let limits = [
            (
                "instruction slots",
                self.instructions.len() / 4,
                mmio::SHADER_INSTRUCTION_SLOTS as usize,
            ),
            (
                "float constants",
                self.const_float.len() / 4,
                mmio::SHADER_CONST_FLOAT_VEC4 as usize,
            ),
            (
                "integer constants",
                self.const_int.len(),
                mmio::SHADER_CONST_INT_REGS as usize,
            ),
            ("boolean constant words", self.const_bool.len(), 1),
        ];
        for (what, needed, available) in limits {
            if needed > available {
                return Err(ShaderError::TooLarge {
                    stage,
                    what,
                    needed,
                    available,
                });
            }
        }
        Ok(())
    }

    pub fn upload(&self, stage: ShaderStage, regs: &dyn RegisterWindow) {
        regs.write_block(stage.instmem(), &self.instructions);
        let last_slot = (self.instructions.len() / 4).saturating_sub(1) as u32;
        regs.write_u32(stage.pc_range(), last_slot << 16);
        regs.write_u32(
            stage.attrib_num(),
            self.inputs.len() as u32 | (self.outputs.len() as u32) << 8,
        );
        regs.write_block(stage.const_float(), &self.const_float);
        regs.write_block(stage.const_int(), &self.const_int);
        regs.write_block(stage.const_bool(), &self.const_bool);
    }
}

#[cfg(test)]
pub(crate) fn encode(binary: &ShaderBinary) -> Vec<u8> {
    let sections = [
        &binary.inputs,
        &binary.outputs,
        &binary.instructions,
        &binary.const_float,
        &binary.const_int,
        &binary.const_bool,
    ];
    let mut words = vec![MAGIC, VERSION, (HEADER_WORDS * 4) as u32];
    words.extend(sections.iter().map(|s| s.len() as u32));
    for section in sections {
        words.extend_from_slice(section);
    }
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
