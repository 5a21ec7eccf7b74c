//! Buffer assignment for one frame.
//!
//! Planning is a pure function of the enabled passes' flags and the composer's buffers,
//! so the ping-pong rules can be checked without a device.

use crate::device::{ColorSpace, RenderOutput, TargetId};
use crate::pass::{Attachments, PassIo};

/// The scheduling-relevant view of an enabled pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub needs_swap: bool,
    pub explicit_output: Option<TargetId>,
    pub requirements: Attachments,
}

/// Buffers available to a frame.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleParams {
    /// The ping-pong pair.
    pub buffers: [TargetId; 2],
    /// Index of the buffer holding the current image.
    pub read: usize,
    /// Where the last enabled pass writes, or `None` to keep the result in the buffers.
    pub final_output: Option<RenderOutput>,
    pub depth: Option<TargetId>,
    pub velocity: Option<TargetId>,
}

/// Buffer assignment of every enabled pass, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub steps: Vec<PassIo>,
    /// Index of the buffer holding the current image once all steps ran.
    pub read_after: usize,
}

/// Assigns buffers to `passes`.
///
/// - A pass with an explicit output reads the current buffer and writes its own target.
/// - The last pass writes the final output; it reads the current buffer if it swaps.
/// - A swapping pass reads the current buffer and writes the other one, then the roles
///   flip.
/// - Any other pass works in place on the current buffer.
pub fn plan(
    passes: &[PassSummary],
    params: &ScheduleParams,
    color_space: impl Fn(RenderOutput) -> ColorSpace,
) -> Schedule {
    let mut read = params.read;
    let mut steps = Vec::with_capacity(passes.len());

    for (i, pass) in passes.iter().enumerate() {
        let last = i + 1 == passes.len();
        let current = params.buffers[read];

        let (input, output) = if let Some(target) = pass.explicit_output {
            (Some(current), RenderOutput::Target(target))
        } else if let (true, Some(final_output)) = (last, params.final_output) {
            (pass.needs_swap.then_some(current), final_output)
        } else if pass.needs_swap {
            read = 1 - read;
            (Some(current), RenderOutput::Target(params.buffers[read]))
        } else {
            (None, RenderOutput::Target(current))
        };

        steps.push(PassIo {
            input,
            output,
            output_color_space: color_space(output),
            depth: params
                .depth
                .filter(|_| pass.requirements.contains(Attachments::DEPTH)),
            velocity: params
                .velocity
                .filter(|_| pass.requirements.contains(Attachments::VELOCITY)),
        });
    }

    Schedule {
        steps,
        read_after: read,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    struct Fixture {
        buffers: [TargetId; 2],
        depth: TargetId,
        snapshot: TargetId,
    }

    fn fixture() -> Fixture {
        let mut ids: SlotMap<TargetId, ()> = SlotMap::with_key();
        Fixture {
            buffers: [ids.insert(()), ids.insert(())],
            depth: ids.insert(()),
            snapshot: ids.insert(()),
        }
    }

    fn swap() -> PassSummary {
        PassSummary {
            needs_swap: true,
            explicit_output: None,
            requirements: Attachments::empty(),
        }
    }

    fn in_place() -> PassSummary {
        PassSummary {
            needs_swap: false,
            ..swap()
        }
    }

    fn params(f: &Fixture, final_output: Option<RenderOutput>) -> ScheduleParams {
        ScheduleParams {
            buffers: f.buffers,
            read: 0,
            final_output,
            depth: Some(f.depth),
            velocity: None,
        }
    }

    #[test]
    fn swapping_passes_alternate_buffers() {
        let f = fixture();
        let passes = [in_place(), swap(), swap(), swap()];
        let schedule = plan(&passes, &params(&f, Some(RenderOutput::Screen)), |_| ColorSpace::Linear);
        let [a, b] = f.buffers;

        assert_eq!(schedule.steps[0].input, None);
        assert_eq!(schedule.steps[0].output, RenderOutput::Target(a));
        assert_eq!(schedule.steps[1].input, Some(a));
        assert_eq!(schedule.steps[1].output, RenderOutput::Target(b));
        assert_eq!(schedule.steps[2].input, Some(b));
        assert_eq!(schedule.steps[2].output, RenderOutput::Target(a));
        assert_eq!(schedule.steps[3].input, Some(a));
        assert_eq!(schedule.steps[3].output, RenderOutput::Screen);
        assert_eq!(schedule.read_after, 0);
    }

    #[test]
    fn swapping_pass_never_reads_its_output() {
        let f = fixture();
        let passes = [swap(), in_place(), swap(), swap(), in_place(), swap()];
        let schedule = plan(&passes, &params(&f, None), |_| ColorSpace::Linear);
        for (pass, io) in passes.iter().zip(&schedule.steps) {
            if pass.needs_swap {
                let input = io.input.unwrap();
                assert_ne!(io.output, RenderOutput::Target(input));
            }
        }
        // Four swaps bring the image back to the first buffer.
        assert_eq!(schedule.read_after, 0);
    }

    #[test]
    fn explicit_output_leaves_ping_pong_alone() {
        let f = fixture();
        let snapshot = PassSummary {
            explicit_output: Some(f.snapshot),
            ..in_place()
        };
        let passes = [swap(), snapshot, swap()];
        let schedule = plan(&passes, &params(&f, Some(RenderOutput::Screen)), |_| ColorSpace::Linear);
        let [a, b] = f.buffers;
        assert_eq!(schedule.steps[1].input, Some(b));
        assert_eq!(schedule.steps[1].output, RenderOutput::Target(f.snapshot));
        assert_eq!(schedule.steps[2].input, Some(b));
        assert_eq!(schedule.steps[2].output, RenderOutput::Screen);
        assert_eq!(schedule.steps[0].output, RenderOutput::Target(b));
        assert_ne!(schedule.steps[0].input, Some(b));
        assert_eq!(schedule.steps[0].input, Some(a));
    }

    #[test]
    fn without_final_output_the_last_pass_swaps_normally() {
        let f = fixture();
        let schedule = plan(&[swap()], &params(&f, None), |_| ColorSpace::Linear);
        assert_eq!(schedule.steps[0].output, RenderOutput::Target(f.buffers[1]));
        assert_eq!(schedule.read_after, 1);
    }

    #[test]
    fn depth_is_bound_only_when_required() {
        let f = fixture();
        let depth = PassSummary {
            requirements: Attachments::DEPTH,
            ..swap()
        };
        let schedule = plan(&[swap(), depth], &params(&f, Some(RenderOutput::Screen)), |_| ColorSpace::Linear);
        assert_eq!(schedule.steps[0].depth, None);
        assert_eq!(schedule.steps[1].depth, Some(f.depth));
    }

    #[test]
    fn output_color_space_comes_from_the_output() {
        let f = fixture();
        let schedule = plan(&[swap(), swap()], &params(&f, Some(RenderOutput::Screen)), |out| match out {
            RenderOutput::Screen => ColorSpace::Srgb,
            RenderOutput::Target(_) => ColorSpace::Linear,
        });
        assert_eq!(schedule.steps[0].output_color_space, ColorSpace::Linear);
        assert_eq!(schedule.steps[1].output_color_space, ColorSpace::Srgb);
    }
}
