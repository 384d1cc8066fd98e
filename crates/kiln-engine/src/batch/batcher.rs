use crate::shader::{RasterMode, Shader};

use super::DrawGroup;

/// Groups closed at the end of a frame.
#[derive(Debug, Default)]
pub struct BakedFrame {
    /// Non-empty groups in enqueue order.
    pub groups: Vec<DrawGroup>,
    /// Instances rejected because the group cap was reached.
    pub dropped: u32,
}

/// Accumulates instances into draw groups.
///
/// A group is closed ("baked") whenever the shader or raster mode changes.
/// Groups are never reordered or merged: `A, A, B, A` yields three groups.
/// Callers get better batching by ordering their draws.
#[derive(Debug)]
pub struct Batcher {
    open: Option<DrawGroup>,
    baked: Vec<DrawGroup>,
    max_groups: usize,
    dropped: u32,
}

impl Batcher {
    pub fn new(max_groups: usize) -> Self {
        assert!(max_groups > 0, "max_groups must be non-zero");
        Self {
            open: None,
            baked: Vec::new(),
            max_groups,
            dropped: 0,
        }
    }

    #[inline]
    pub fn max_groups(&self) -> usize {
        self.max_groups
    }

    /// Groups of the current frame, including the open one.
    #[inline]
    pub fn group_count(&self) -> usize {
        self.baked.len() + usize::from(self.open.is_some())
    }

    /// Queues one instance. Returns `false` if the draw was dropped because
    /// it would open a group beyond the cap.
    ///
    /// # Panics
    /// Panics if `instance` is not `shader.instance_size()` bytes.
    pub fn enqueue(&mut self, shader: &Shader, raster_mode: RasterMode, instance: &[u8]) -> bool {
        let continues = matches!(&self.open, Some(g) if g.accepts(shader.id, raster_mode));

        if !continues {
            if self.group_count() >= self.max_groups {
                if self.dropped == 0 {
                    log::warn!(
                        "draw group cap of {} reached; dropping draws for the rest of the frame",
                        self.max_groups
                    );
                }
                self.dropped += 1;
                return false;
            }
            self.bake();
        }

        self.open
            .get_or_insert_with(|| DrawGroup::new(shader.id, raster_mode, shader.instance_size()))
            .push(instance);
        true
    }

    /// Closes the open group and hands out the frame's groups, leaving the
    /// batcher empty.
    pub fn finish(&mut self) -> BakedFrame {
        self.bake();
        BakedFrame {
            groups: std::mem::take(&mut self.baked),
            dropped: std::mem::take(&mut self.dropped),
        }
    }

    fn bake(&mut self) {
        if let Some(group) = self.open.take() {
            if !group.is_empty() {
                self.baked.push(group);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderRegistry;

    fn instance(shader: &Shader, tag: u8) -> Vec<u8> {
        vec![tag; shader.instance_size()]
    }

    #[test]
    fn adjacent_runs_form_groups_without_reordering() {
        let reg = ShaderRegistry::new();
        let b = reg.builtins();
        let (rect, circle) = (reg.get(b.rect).unwrap(), reg.get(b.circle).unwrap());

        let mut batcher = Batcher::new(16);
        assert!(batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 1)));
        assert!(batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 2)));
        assert!(batcher.enqueue(circle, RasterMode::Fill, &instance(circle, 3)));
        assert!(batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 4)));

        let frame = batcher.finish();
        let shape: Vec<_> = frame.groups.iter().map(|g| (g.shader(), g.instance_count())).collect();
        assert_eq!(shape, vec![(b.rect, 2), (b.circle, 1), (b.rect, 1)]);
        assert_eq!(frame.groups[0].instance_bytes(1..2)[0], 2);
        assert_eq!(frame.dropped, 0);
    }

    #[test]
    fn raster_mode_change_breaks_group() {
        let reg = ShaderRegistry::new();
        let rect = reg.get(reg.builtins().rect).unwrap();

        let mut batcher = Batcher::new(16);
        batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 0));
        batcher.enqueue(rect, RasterMode::Line, &instance(rect, 0));
        batcher.enqueue(rect, RasterMode::Line, &instance(rect, 0));

        let modes: Vec<_> = batcher.finish().groups.iter().map(|g| g.raster_mode()).collect();
        assert_eq!(modes, vec![RasterMode::Fill, RasterMode::Line]);
    }

    #[test]
    fn cap_drops_new_groups_but_extends_open_one() {
        let reg = ShaderRegistry::new();
        let b = reg.builtins();
        let (rect, line) = (reg.get(b.rect).unwrap(), reg.get(b.line).unwrap());

        let mut batcher = Batcher::new(2);
        assert!(batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 0)));
        assert!(batcher.enqueue(line, RasterMode::Fill, &instance(line, 0)));
        assert!(!batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 0)));
        assert!(batcher.enqueue(line, RasterMode::Fill, &instance(line, 0)));
        assert!(!batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 0)));

        let frame = batcher.finish();
        assert_eq!(frame.groups.len(), 2);
        assert_eq!(frame.groups[1].instance_count(), 2);
        assert_eq!(frame.dropped, 2);
    }

    #[test]
    fn finish_resets_for_next_frame() {
        let reg = ShaderRegistry::new();
        let rect = reg.get(reg.builtins().rect).unwrap();

        let mut batcher = Batcher::new(4);
        batcher.enqueue(rect, RasterMode::Fill, &instance(rect, 0));
        assert_eq!(batcher.finish().groups.len(), 1);
        assert_eq!(batcher.group_count(), 0);
        assert!(batcher.finish().groups.is_empty());
    }

    #[test]
    #[should_panic(expected = "must be 144 bytes")]
    fn wrong_instance_size_panics() {
        let reg = ShaderRegistry::new();
        let rect = reg.get(reg.builtins().rect).unwrap();
        Batcher::new(4).enqueue(rect, RasterMode::Fill, &[0; 12]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn group_count_equals_runs(
                seq in proptest::collection::vec((0usize..3, 0usize..2), 0..64),
            ) {
                let reg = ShaderRegistry::new();
                let b = reg.builtins();
                let shaders = [b.rect, b.circle, b.line];
                let modes = [RasterMode::Fill, RasterMode::Line];

                let mut batcher = Batcher::new(usize::MAX);
                for &(s, m) in &seq {
                    let shader = reg.get(shaders[s]).unwrap();
                    batcher.enqueue(shader, modes[m], &vec![0; shader.instance_size()]);
                }

                let runs = if seq.is_empty() {
                    0
                } else {
                    1 + seq.windows(2).filter(|w| w[0] != w[1]).count()
                };
                let frame = batcher.finish();
                prop_assert_eq!(frame.groups.len(), runs);

                let total: u32 = frame.groups.iter().map(|g| g.instance_count()).sum();
                prop_assert_eq!(total as usize, seq.len());
            }
        }
    }
}
