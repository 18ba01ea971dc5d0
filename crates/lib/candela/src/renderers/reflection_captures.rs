use bytemuck::{Pod, Zeroable};
use candela_gpu::{Format, ImageDesc, ImageType, SharedImage};
use candela_rg::{self as rg, SimpleComputePass};

use crate::scene::ReflectionCaptureDesc;

pub const CAPTURE_CUBE_WIDTH: u32 = 32;

/// Slot growth granularity; the array never shrinks below this.
const SLOT_GRANULARITY: usize = 4;

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct CaptureSlotConstants {
    pub slot: u32,
    pub src_slot: u32,
    pub width: u32,
    pub _pad: u32,
    pub color: [f32; 3],
    pub _pad1: u32,
}

/// The frame-shared reflection capture cubemap array. When the slot count
/// changes, live captures are carried over with an explicit remap-and-copy
/// derived from which components are still referenced; a full rebuild only
/// happens when no array existed yet.
pub struct ReflectionCaptureArray {
    array: Option<SharedImage>,
    slots: Vec<Option<u64>>,
}

impl Default for ReflectionCaptureArray {
    fn default() -> Self {
        Self {
            array: None,
            slots: Vec::new(),
        }
    }
}

impl ReflectionCaptureArray {
    pub fn slot_of(&self, id: u64) -> Option<u32> {
        self.slots
            .iter()
            .position(|s| *s == Some(id))
            .map(|i| i as u32)
    }

    fn array_desc(slot_count: usize) -> ImageDesc {
        ImageDesc::new(
            Format::Rgba16Float,
            ImageType::Cube,
            [CAPTURE_CUBE_WIDTH, CAPTURE_CUBE_WIDTH, 1],
        )
        .array_elements(6 * slot_count as u32)
    }

    /// Reconciles the array against the captures alive this frame and
    /// returns the graph handle, or `None` when the scene has no captures.
    pub fn update(
        &mut self,
        rg: &mut rg::TemporalRenderGraph,
        captures: &[ReflectionCaptureDesc],
    ) -> Option<rg::Handle<rg::Image>> {
        if captures.is_empty() {
            return None;
        }

        let needed = captures.len().next_multiple_of(SLOT_GRANULARITY);

        let mut handle = match &self.array {
            None => {
                // No array yet: the one case where a full rebuild is
                // expected.
                let array = rg.device().create_image(Self::array_desc(needed)).unwrap();
                self.array = Some(array.clone());
                self.slots = vec![None; needed];
                rg.import_image(array, rg::AccessType::Nothing)
            }
            Some(existing) if self.slots.len() < needed => {
                // Grow: copy still-referenced slots through the remap
                // table, never re-render them.
                let old = rg.import_image(
                    existing.clone(),
                    rg::AccessType::AnyShaderReadSampledImageOrUniformTexelBuffer,
                );
                let new_array = rg.device().create_image(Self::array_desc(needed)).unwrap();
                let mut new_handle = rg.import_image(new_array.clone(), rg::AccessType::Nothing);

                let mut new_slots = vec![None; needed];
                let mut next = 0usize;
                for (old_slot, id) in self.slots.iter().enumerate() {
                    let Some(id) = id else { continue };
                    if !captures.iter().any(|c| c.id == *id) {
                        continue;
                    }
                    new_slots[next] = Some(*id);
                    SimpleComputePass::new_compute(
                        rg.add_pass("capture array remap"),
                        "capture_array_remap_copy",
                    )
                    .read(&old)
                    .write_no_sync(&mut new_handle)
                    .constants(CaptureSlotConstants {
                        slot: next as u32,
                        src_slot: old_slot as u32,
                        width: CAPTURE_CUBE_WIDTH,
                        _pad: 0,
                        color: [0.0; 3],
                        _pad1: 0,
                    })
                    .dispatch([CAPTURE_CUBE_WIDTH, CAPTURE_CUBE_WIDTH, 6]);
                    next += 1;
                }

                self.array = Some(new_array);
                self.slots = new_slots;
                new_handle
            }
            Some(existing) => {
                // Same capacity: drop stale ids in place.
                for slot in &mut self.slots {
                    if let Some(id) = slot {
                        if !captures.iter().any(|c| c.id == *id) {
                            *slot = None;
                        }
                    }
                }
                rg.import_image(existing.clone(), rg::AccessType::Nothing)
            }
        };

        // Render captures that don't have a slot yet.
        for capture in captures {
            if self.slot_of(capture.id).is_some() {
                continue;
            }
            let slot = self
                .slots
                .iter()
                .position(|s| s.is_none())
                .expect("capture slots exhausted after resize");
            self.slots[slot] = Some(capture.id);

            SimpleComputePass::new_compute(rg.add_pass("capture update"), "capture_update_slot")
                .write_no_sync(&mut handle)
                .constants(CaptureSlotConstants {
                    slot: slot as u32,
                    src_slot: 0,
                    width: CAPTURE_CUBE_WIDTH,
                    _pad: 0,
                    color: capture.color,
                    _pad1: 0,
                })
                .dispatch([CAPTURE_CUBE_WIDTH, CAPTURE_CUBE_WIDTH, 6]);
        }

        Some(handle)
    }
}
