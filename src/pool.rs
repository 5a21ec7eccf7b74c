//! Render target pooling.
//!
//! [`RenderTargetPool`] hands out offscreen buffers by stable [`BufferHandle`]s and
//! recycles them: releasing a buffer marks it free, and the next `acquire` with a
//! compatible descriptor gets it back without touching the device. In steady state a
//! frame performs no allocation at all.
//!
//! [`resize_all`](RenderTargetPool::resize_all) is the only path that destroys and
//! recreates storage of buffers in use. It is atomic: either every buffer in use gets
//! its new storage, or nothing changes.

use slotmap::SlotMap;

use crate::device::{RenderDevice, TargetDescriptor, TargetId};
use crate::error::{FxError, Result};

slotmap::new_key_type! {
    /// Stable handle to a pooled buffer. Survives resizes.
    pub struct BufferHandle;
}

#[derive(Debug)]
struct PooledBuffer {
    desc: TargetDescriptor,
    target: TargetId,
    in_use: bool,
}

/// Allocates and recycles render targets.
#[derive(Debug, Default)]
pub struct RenderTargetPool {
    buffers: SlotMap<BufferHandle, PooledBuffer>,
    frame_active: bool,
    allocations: u64,
}

impl RenderTargetPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a buffer matching `desc`, reusing a free one when possible.
    ///
    /// Allocation failure is returned as is; the pool never falls back to a smaller
    /// or different buffer.
    pub fn acquire(&mut self, device: &mut dyn RenderDevice, desc: &TargetDescriptor) -> Result<BufferHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(FxError::config(
                format!("buffer '{}'", desc.label),
                format!("invalid size {}x{}", desc.width, desc.height),
            ));
        }

        let reusable = self
            .buffers
            .iter_mut()
            .find(|(_, b)| !b.in_use && b.desc.is_compatible(desc));
        if let Some((handle, buffer)) = reusable {
            buffer.in_use = true;
            buffer.desc.label = desc.label.clone();
            log::debug!("pool: reusing buffer for '{}'", desc.label);
            return Ok(handle);
        }

        let target = device.create_target(desc)?;
        self.allocations += 1;
        log::debug!(
            "pool: allocated '{}' {}x{} {:?}",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        Ok(self.buffers.insert(PooledBuffer {
            desc: desc.clone(),
            target,
            in_use: true,
        }))
    }

    /// Marks a buffer free for reuse. Its storage is kept.
    pub fn release(&mut self, handle: BufferHandle) {
        if let Some(buffer) = self.buffers.get_mut(handle) {
            buffer.in_use = false;
        }
    }

    /// Device target currently backing `handle`.
    pub fn target(&self, handle: BufferHandle) -> Option<TargetId> {
        self.buffers.get(handle).map(|b| b.target)
    }

    pub fn descriptor(&self, handle: BufferHandle) -> Option<&TargetDescriptor> {
        self.buffers.get(handle).map(|b| &b.desc)
    }

    /// Resizes every buffer in use to `width` x `height` and destroys free buffers.
    ///
    /// Fails with a configuration error during a frame or for a zero size. On
    /// allocation failure the previous buffers stay intact.
    pub fn resize_all(&mut self, device: &mut dyn RenderDevice, width: u32, height: u32) -> Result<()> {
        if self.frame_active {
            return Err(FxError::config("render target pool", "cannot resize while a frame is rendering"));
        }
        if width == 0 || height == 0 {
            return Err(FxError::config(
                "render target pool",
                format!("invalid size {width}x{height}"),
            ));
        }

        self.trim(device);

        let mut replacements: Vec<(BufferHandle, TargetDescriptor, TargetId)> = Vec::new();
        for (handle, buffer) in &self.buffers {
            if buffer.desc.width == width && buffer.desc.height == height {
                continue;
            }
            let mut desc = buffer.desc.clone();
            desc.width = width;
            desc.height = height;
            match device.create_target(&desc) {
                Ok(target) => replacements.push((handle, desc, target)),
                Err(err) => {
                    for (_, _, target) in replacements {
                        device.destroy_target(target);
                    }
                    return Err(err);
                }
            }
        }

        for (handle, desc, target) in replacements {
            if let Some(buffer) = self.buffers.get_mut(handle) {
                device.destroy_target(buffer.target);
                buffer.desc = desc;
                buffer.target = target;
                self.allocations += 1;
            }
        }

        log::info!("pool: resized {} buffer(s) to {width}x{height}", self.buffers.len());
        Ok(())
    }

    /// Destroys all free buffers.
    pub fn trim(&mut self, device: &mut dyn RenderDevice) {
        self.buffers.retain(|_, buffer| {
            if buffer.in_use {
                true
            } else {
                device.destroy_target(buffer.target);
                false
            }
        });
    }

    /// Destroys every buffer, in use or not. Handles become invalid.
    pub fn clear(&mut self, device: &mut dyn RenderDevice) {
        for (_, buffer) in self.buffers.drain() {
            device.destroy_target(buffer.target);
        }
    }

    pub fn begin_frame(&mut self) {
        self.frame_active = true;
    }

    pub fn end_frame(&mut self) {
        self.frame_active = false;
    }

    pub fn is_frame_active(&self) -> bool {
        self.frame_active
    }

    /// Number of buffers holding device storage.
    pub fn live_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn in_use_count(&self) -> usize {
        self.buffers.values().filter(|b| b.in_use).count()
    }

    /// Total device allocations performed by the pool.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    fn color(w: u32, h: u32) -> TargetDescriptor {
        TargetDescriptor::new("buffer", w, h, wgpu::TextureFormat::Rgba16Float)
    }

    #[test]
    fn released_buffers_are_reused() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut device, &color(8, 8)).unwrap();
        let target = pool.target(a);
        pool.release(a);
        let b = pool.acquire(&mut device, &color(8, 8)).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.target(b), target);
        assert_eq!(pool.allocations(), 1);
    }

    #[test]
    fn incompatible_descriptor_allocates() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut device, &color(8, 8)).unwrap();
        pool.release(a);
        let depth = TargetDescriptor::new("depth", 8, 8, wgpu::TextureFormat::Depth24PlusStencil8);
        let b = pool.acquire(&mut device, &depth).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.live_count(), 2);
    }

    #[test]
    fn resize_keeps_handles_and_drops_free_buffers() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut pool = RenderTargetPool::new();
        let kept = pool.acquire(&mut device, &color(8, 8)).unwrap();
        let free = pool.acquire(&mut device, &color(8, 8)).unwrap();
        pool.release(free);

        pool.resize_all(&mut device, 4, 2).unwrap();
        assert_eq!(pool.live_count(), 1);
        let desc = pool.descriptor(kept).unwrap();
        assert_eq!((desc.width, desc.height), (4, 2));
        assert_eq!(device.live_targets(), 1);
    }

    #[test]
    fn resize_is_rejected_during_a_frame() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut pool = RenderTargetPool::new();
        pool.acquire(&mut device, &color(8, 8)).unwrap();
        pool.begin_frame();
        assert!(pool.resize_all(&mut device, 4, 4).unwrap_err().is_configuration());
        pool.end_frame();
        assert!(pool.resize_all(&mut device, 4, 4).is_ok());
    }

    #[test]
    fn failed_resize_leaves_buffers_untouched() {
        let mut device = SoftwareDevice::new(8, 8);
        let mut pool = RenderTargetPool::new();
        let a = pool.acquire(&mut device, &color(8, 8)).unwrap();
        let b = pool.acquire(&mut device, &color(8, 8)).unwrap();
        device.set_target_budget(Some(3));

        let err = pool.resize_all(&mut device, 16, 16).unwrap_err();
        assert!(err.is_resource_exhaustion());
        assert_eq!(pool.descriptor(a).unwrap().width, 8);
        assert_eq!(pool.descriptor(b).unwrap().width, 8);
        assert_eq!(device.live_targets(), 2);
    }
}
