use std::sync::Arc;

use serde::Serialize;
use tilegpu_arbiter::{
    ArbiterError, ContextId, GpuArbiter, LockOutcome, MapRequest, RegisterMapping,
};
use tilegpu_hw::regs::{AttributeControl, HostControl, VertexBufferControl, VertexContext};
use tilegpu_hw::{mmio, ops, PipelineStages, RegisterWindow};

use crate::compat::{CompatState, Matrix4, MatrixKind};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::shader::{ShaderBinary, ShaderStage};
use crate::shadow::ShadowState;

/// Per-context counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClientStats {
    pub draws: u64,
    pub batches: u64,
    pub selective_flushes: u64,
    pub restores: u64,
    pub fifo_stalls: u64,
}

#[derive(Debug, Default)]
struct LoadedShader {
    binary: Option<ShaderBinary>,
    dirty: bool,
}

/// One client's connection to the GPU.
///
/// Register setters are write-through: the value is recorded in the [`ShadowState`] and, while
/// this context holds the GPU, written to hardware immediately. Writes made without the GPU are
/// queued and applied by [`DeviceContext::flush_client_queue`] once the lock is taken.
pub struct DeviceContext {
    arbiter: Arc<GpuArbiter>,
    id: ContextId,
    regs: RegisterMapping,
    pub(crate) config: ClientConfig,
    shadow: ShadowState,
    pending: Vec<(u32, u32)>,
    vertex_shader: LoadedShader,
    pixel_shader: LoadedShader,
    compat: Option<CompatState>,
    held: bool,
    /// The last restore failed; the next acquire must replay even if ownership is unchanged.
    restore_pending: bool,
    /// A buffered draw may still be reading the vertex buffer.
    pub(crate) vb_in_flight: bool,
    pub(crate) stats: ClientStats,
}

impl DeviceContext {
    pub fn open(arbiter: Arc<GpuArbiter>, config: ClientConfig) -> Result<Self, ClientError> {
        let id = arbiter.open_context();
        let regs = match arbiter.map_registers(id, MapRequest::DEVICE) {
            Ok(regs) => regs,
            Err(err) => {
                arbiter.release(id);
                return Err(err.into());
            }
        };
        Ok(Self {
            arbiter,
            id,
            regs,
            config,
            shadow: ShadowState::default(),
            pending: Vec::new(),
            vertex_shader: LoadedShader::default(),
            pixel_shader: LoadedShader::default(),
            compat: config.fixed_function.then(CompatState::default),
            held: false,
            restore_pending: false,
            vb_in_flight: false,
            stats: ClientStats::default(),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn shadow(&self) -> &ShadowState {
        &self.shadow
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub(crate) fn regs(&self) -> &dyn RegisterWindow {
        &self.regs
    }

    /// Take the GPU, restoring this context's state if another context owned it meanwhile.
    pub fn acquire_hardware(&mut self) -> Result<LockOutcome, ClientError> {
        if self.held {
            return Err(ArbiterError::AlreadyHeld(self.id).into());
        }
        let outcome = match self.arbiter.lock(self.id) {
            Ok(outcome) => outcome,
            Err(err) => {
                // A failed power-up still leaves us holding the lock.
                if self.arbiter.holder() == Some(self.id) {
                    let _ = self.arbiter.unlock(self.id);
                }
                return Err(err.into());
            }
        };
        self.held = true;

        if outcome.restore_needed() || self.restore_pending {
            if let Err(err) = self.restore_state() {
                self.restore_pending = true;
                if let Err(unlock_err) = self.release_hardware() {
                    tracing::warn!(ctx = %self.id, %unlock_err, "unlock failed after restore error");
                }
                return Err(err);
            }
        }
        Ok(outcome)
    }

    pub fn release_hardware(&mut self) -> Result<(), ClientError> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        self.arbiter.unlock(self.id)?;
        Ok(())
    }

    /// Run `f` with the GPU held, releasing it afterwards even when `f` fails.
    pub fn with_hardware<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ClientError>,
    ) -> Result<T, ClientError> {
        self.acquire_hardware()?;
        let result = f(self);
        let released = self.release_hardware();
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), released) => {
                if let Err(release_err) = released {
                    tracing::warn!(ctx = %self.id, %release_err, "unlock failed after draw error");
                }
                Err(err)
            }
        }
    }

    /// Bulk-replay everything this context has programmed.
    fn restore_state(&mut self) -> Result<(), ClientError> {
        match self.arbiter.flush(self.id, PipelineStages::ALL) {
            Ok(()) => {}
            Err(err @ ArbiterError::FlushTimeout { .. }) => {
                // The reset left the pipeline idle, which is all the replay needs.
                tracing::warn!(ctx = %self.id, %err, "flush before restore timed out");
            }
            Err(err) => return Err(err.into()),
        }

        let regs: &dyn RegisterWindow = &self.regs;
        self.shadow.replay(regs);
        self.pending.clear();
        for (stage, loaded) in [
            (ShaderStage::Vertex, &mut self.vertex_shader),
            (ShaderStage::Pixel, &mut self.pixel_shader),
        ] {
            if let Some(binary) = &loaded.binary {
                binary.upload(stage, regs);
            }
            loaded.dirty = false;
        }
        if let Some(compat) = &mut self.compat {
            compat.replay(regs);
        }

        let cache_timeout = self.arbiter.config().cache_flush_timeout();
        ops::flush_caches(regs, cache_timeout)?;

        self.vb_in_flight = false;
        self.restore_pending = false;
        self.stats.restores += 1;
        tracing::debug!(ctx = %self.id, "register state restored");
        Ok(())
    }

    /// Apply queued register writes, pending shader uploads and dirty compatibility matrices.
    pub fn flush_client_queue(&mut self) -> Result<(), ClientError> {
        if !self.held {
            return Err(ClientError::NotHeld);
        }
        let regs: &dyn RegisterWindow = &self.regs;
        for (offset, bits) in self.pending.drain(..) {
            regs.write_u32(offset, bits);
        }
        for (stage, loaded) in [
            (ShaderStage::Vertex, &mut self.vertex_shader),
            (ShaderStage::Pixel, &mut self.pixel_shader),
        ] {
            if std::mem::take(&mut loaded.dirty) {
                if let Some(binary) = &loaded.binary {
                    binary.upload(stage, regs);
                }
            }
        }
        if let Some(compat) = &mut self.compat {
            compat.flush_dirty(regs);
        }
        Ok(())
    }

    /// Wait for `mask` stages to drain. Requires the GPU.
    pub fn flush(&mut self, mask: PipelineStages) -> Result<(), ClientError> {
        self.arbiter.flush(self.id, mask)?;
        if mask.contains(PipelineStages::VERTEX_BUFFER_CONSUMERS) {
            self.vb_in_flight = false;
        }
        Ok(())
    }

    pub fn write_register(&mut self, offset: u32, bits: u32) -> Result<(), ClientError> {
        self.shadow.store(offset, bits)?;
        if self.held {
            self.regs.write_u32(offset, bits);
        } else {
            self.pending.push((offset, bits));
        }
        Ok(())
    }

    pub fn write_register_f32(&mut self, offset: u32, value: f32) -> Result<(), ClientError> {
        self.write_register(offset, value.to_bits())
    }

    pub fn set_host_control(&mut self, host: HostControl) -> Result<(), ClientError> {
        self.write_register(mmio::HOST_CTL, host.bits())
    }

    pub fn set_index_offset(&mut self, offset: u32) -> Result<(), ClientError> {
        self.write_register(mmio::INDEX_OFFSET, offset)
    }

    pub fn set_attribute(&mut self, slot: usize, ctl: AttributeControl) -> Result<(), ClientError> {
        self.write_register(mmio::attr_ctl(slot), ctl.bits())
    }

    pub fn set_vertex_buffer(
        &mut self,
        slot: usize,
        ctl: VertexBufferControl,
        base: u32,
    ) -> Result<(), ClientError> {
        self.write_register(mmio::vb_ctl(slot), ctl.bits())?;
        self.write_register(mmio::vb_base(slot), base)
    }

    pub fn set_vertex_context(&mut self, vctx: VertexContext) -> Result<(), ClientError> {
        self.write_register(mmio::VERTEX_CTX, vctx.bits())
    }

    pub fn set_viewport(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), ClientError> {
        let (half_w, half_h) = (width / 2.0, height / 2.0);
        self.write_register_f32(mmio::VIEWPORT_OX, x + half_w)?;
        self.write_register_f32(mmio::VIEWPORT_OY, y + half_h)?;
        self.write_register_f32(mmio::VIEWPORT_HALF_W, half_w)?;
        self.write_register_f32(mmio::VIEWPORT_HALF_H, half_h)
    }

    pub fn set_depth_range(&mut self, near: f32, far: f32) -> Result<(), ClientError> {
        self.write_register_f32(mmio::DEPTH_RANGE_NEAR, near)?;
        self.write_register_f32(mmio::DEPTH_RANGE_FAR, far)
    }

    /// Validate and keep a shader program; it reaches the hardware at the next queue flush.
    pub fn load_shader(&mut self, stage: ShaderStage, bytes: &[u8]) -> Result<(), ClientError> {
        let binary = ShaderBinary::parse(bytes)?;
        binary.check_fits(stage)?;
        let loaded = match stage {
            ShaderStage::Vertex => &mut self.vertex_shader,
            ShaderStage::Pixel => &mut self.pixel_shader,
        };
        loaded.binary = Some(binary);
        loaded.dirty = true;
        Ok(())
    }

    pub fn set_matrix(&mut self, kind: MatrixKind, matrix: Matrix4) -> Result<(), ClientError> {
        let compat = self
            .compat
            .as_mut()
            .ok_or(ClientError::FixedFunctionDisabled)?;
        compat.set_matrix(kind, matrix);
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        // Release force-unlocks a held GPU; nothing here can fail loudly.
        self.arbiter.release(self.id);
    }
}
