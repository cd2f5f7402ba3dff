//! Fixed-function matrix state.
//!
//! Contexts that emulate the fixed-function pipeline keep their transform matrices here. The
//! matrices live in the top of vertex-shader float constant memory, so programs written for the
//! compatibility layer must leave registers 240..252 free.

use tilegpu_hw::RegisterWindow;

use crate::shader::ShaderStage;

/// Row-major 4x4 matrix.
pub type Matrix4 = [[f32; 4]; 4];

pub const IDENTITY: Matrix4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    ModelView,
    Projection,
    Texture,
}

impl MatrixKind {
    pub const ALL: [Self; 3] = [Self::ModelView, Self::Projection, Self::Texture];

    /// First vec4 constant register holding the matrix.
    pub const fn constant_register(self) -> u32 {
        match self {
            Self::ModelView => 240,
            Self::Projection => 244,
            Self::Texture => 248,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompatState {
    matrices: [Matrix4; 3],
    dirty: [bool; 3],
}

impl Default for CompatState {
    fn default() -> Self {
        Self {
            matrices: [IDENTITY; 3],
            dirty: [true; 3],
        }
    }
}

impl CompatState {
    pub fn matrix(&self, kind: MatrixKind) -> &Matrix4 {
        &self.matrices[kind.index()]
    }

    pub fn set_matrix(&mut self, kind: MatrixKind, matrix: Matrix4) {
        self.matrices[kind.index()] = matrix;
        self.dirty[kind.index()] = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.contains(&true)
    }

    fn upload(&self, kind: MatrixKind, regs: &dyn RegisterWindow) {
        let words: &[u32] = bytemuck::cast_slice(&self.matrices[kind.index()]);
        let base = ShaderStage::Vertex.const_float() + kind.constant_register() * 16;
        regs.write_block(base, words);
    }

    /// Upload matrices changed since the last upload.
    pub fn flush_dirty(&mut self, regs: &dyn RegisterWindow) {
        for kind in MatrixKind::ALL {
            if std::mem::take(&mut self.dirty[kind.index()]) {
                self.upload(kind, regs);
            }
        }
    }

    /// Upload every matrix.
    pub fn replay(&mut self, regs: &dyn RegisterWindow) {
        for kind in MatrixKind::ALL {
            self.upload(kind, regs);
        }
        self.dirty = [false; 3];
    }
}
