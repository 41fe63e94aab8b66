use super::{render::RenderPassErrorInner, Command};
use crate::{
    binding_model::{BindGroup, BoundResource, PipelineLayout},
    device::DeviceShared,
};
use smallvec::SmallVec;
use std::sync::Arc;
use wgt::{BufferAddress, DynamicOffset};

/// A bind group set on a pass, with its dynamic offsets.
#[derive(Debug)]
struct BoundGroup {
    group: Arc<BindGroup>,
    dynamic_offsets: SmallVec<[DynamicOffset; 4]>,
}

/// Bind groups of a pass, and which of them need to be resolved again.
#[derive(Debug, Default)]
pub(super) struct Binder {
    groups: [Option<BoundGroup>; wgt::MAX_BIND_GROUPS],
    /// Bit `i` is set if group `i` changed since it was last resolved.
    dirty: u8,
}

impl Binder {
    /// Validates `offsets` against the dynamic entries of `group` and stores
    /// the group at `index`.
    pub fn set_group(
        &mut self,
        device: &Arc<DeviceShared>,
        index: u32,
        group: &Arc<BindGroup>,
        offsets: &[DynamicOffset],
    ) -> Result<(), RenderPassErrorInner> {
        let max = device.limits.max_bind_groups;
        if index >= max {
            return Err(RenderPassErrorInner::BindGroupIndexOutOfRange { index, max });
        }
        group.info.check(device)?;

        let expected = group.layout.dynamic_count;
        if offsets.len() != expected {
            return Err(RenderPassErrorInner::InvalidDynamicOffsetCount {
                actual: offsets.len(),
                expected,
            });
        }
        let alignment = device.limits.min_uniform_buffer_offset_alignment;
        let dynamic_entries = group.entries.iter().filter_map(|entry| match entry.resource {
            BoundResource::Buffer {
                ref buffer,
                offset,
                size,
                dynamic: true,
            } => Some((entry.binding, buffer, offset, size)),
            _ => None,
        });
        for ((binding, buffer, offset, size), &dynamic) in dynamic_entries.zip(offsets) {
            if dynamic % alignment != 0 {
                return Err(RenderPassErrorInner::UnalignedDynamicOffset {
                    binding,
                    offset: dynamic,
                    alignment,
                });
            }
            let start = offset + dynamic as BufferAddress;
            let end = match size {
                Some(size) => start + size.get(),
                None => start + (buffer.size - offset),
            };
            if end > buffer.size {
                return Err(RenderPassErrorInner::DynamicOffsetOutOfBounds {
                    binding,
                    offset: dynamic,
                    end,
                    buffer_size: buffer.size,
                });
            }
        }

        self.groups[index as usize] = Some(BoundGroup {
            group: Arc::clone(group),
            dynamic_offsets: SmallVec::from_slice(offsets),
        });
        self.dirty |= 1 << index;
        Ok(())
    }

    /// Marks every group for resolution, e.g. after a pipeline change.
    pub fn invalidate(&mut self) {
        self.dirty = !0;
    }

    /// Checks that every group `layout` expects is set and compatible.
    pub fn check_compatible(&self, layout: &PipelineLayout) -> Result<(), RenderPassErrorInner> {
        for (index, slots) in layout.groups.iter().enumerate() {
            let index = index as u32;
            match self.groups[index as usize] {
                None => return Err(RenderPassErrorInner::MissingBindGroup { index }),
                Some(ref bound) if !slots.layout.is_compatible(&bound.group.layout) => {
                    return Err(RenderPassErrorInner::IncompatibleBindGroup { index })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Appends the binds of every dirty group of `layout` to `commands`.
    ///
    /// Binding `b` of group `g` lands on the flat slot `offset(g) + b`.
    /// Samplers land on the slot of their texture, one below their own.
    pub fn flush(&mut self, layout: &PipelineLayout, commands: &mut Vec<Command>) {
        for (index, slots) in layout.groups.iter().enumerate() {
            if self.dirty & (1 << index) == 0 {
                continue;
            }
            let bound = match self.groups[index] {
                Some(ref bound) => bound,
                None => continue,
            };
            resolve_group(slots.offset, bound, commands);
        }
        self.dirty = 0;
    }
}

fn resolve_group(group_offset: u32, bound: &BoundGroup, commands: &mut Vec<Command>) {
    let mut dynamic_offsets = bound.dynamic_offsets.iter();
    let resolved = bound.group.entries.iter().map(|entry| {
        let slot = group_offset + entry.binding;
        match entry.resource {
            BoundResource::Buffer {
                ref buffer,
                offset,
                size,
                dynamic,
            } => {
                // the bound range keeps the size it was created with
                let size = match size {
                    Some(size) => size.get(),
                    None => buffer.size - offset.min(buffer.size),
                };
                let offset = if dynamic {
                    offset + dynamic_offsets.next().copied().unwrap_or_default() as BufferAddress
                } else {
                    offset
                };
                Command::BindBuffer {
                    slot,
                    buffer: Arc::clone(buffer),
                    offset,
                    size,
                }
            }
            BoundResource::TextureView(ref view) => Command::BindTexture {
                slot,
                view: Arc::clone(view),
            },
            BoundResource::Sampler(ref sampler) => Command::BindSampler {
                slot: slot - 1,
                sampler: Arc::clone(sampler),
            },
        }
    });
    commands.extend(resolved);
}
