// Frame orchestration
//
// One call to `Engine::render` is one loop iteration:
//
//   update chain -> rebuild targets -> wait slot fence -> acquire
//     -> record -> submit -> present -> staleness handling
//
// Staleness is never handled twice in one iteration: anything that goes stale
// is marked and picked up by the next `update`.

use anyhow::Result;
use ash::vk;

use crate::backend::{AvailableImage, ChainChange, ChainUpdate};

/// The Vulkan side of a frame. `Renderer` is the real one.
pub trait FrameBackend {
    /// Build or rebuild the chain if stale
    fn update_chain(&mut self) -> Result<ChainUpdate>;
    /// Recreate whatever depends on the chain (command buffers, render pass,
    /// framebuffers)
    fn rebuild_targets(&mut self, change: &ChainChange) -> Result<()>;
    fn wait_for_next_frame(&mut self) -> Result<()>;
    fn acquire_image(&mut self) -> Result<AvailableImage>;
    /// Record the scene into the image's command buffer
    fn record(&mut self, image: &AvailableImage, out_of_date: bool) -> Result<vk::CommandBuffer>;
    fn submit(&mut self, command_buffer: vk::CommandBuffer, image: &AvailableImage) -> Result<()>;
    fn present(&mut self, image: &AvailableImage) -> Result<bool>;
    fn mark_out_of_date(&mut self);
    fn wait_idle(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// No drawable area; nothing was acquired
    Skipped,
    /// Chain went stale during the frame; rebuilt next iteration
    OutOfDate,
}

pub struct Engine<B: FrameBackend> {
    backend: B,
    frames_presented: u64,
}

impl<B: FrameBackend> Engine<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            frames_presented: 0,
        }
    }

    pub fn render(&mut self) -> Result<FrameStatus> {
        // ── Chain ────────────────────────────────────────────────────────────
        let rebuilt = match self.backend.update_chain()? {
            ChainUpdate::Deferred => return Ok(FrameStatus::Skipped),
            ChainUpdate::Rebuilt(change) => {
                log::debug!(
                    "Chain rebuilt: {} images ({}), {:?} ({}), {}x{}",
                    change.image_count,
                    if change.image_count_changed { "changed" } else { "same" },
                    change.format,
                    if change.format_changed { "changed" } else { "same" },
                    change.extent.width,
                    change.extent.height
                );
                self.backend.rebuild_targets(&change)?;
                true
            }
            ChainUpdate::Unchanged => false,
        };

        // ── Acquire ──────────────────────────────────────────────────────────
        self.backend.wait_for_next_frame()?;
        let image = self.backend.acquire_image()?;
        if !image.is_valid() {
            self.backend.mark_out_of_date();
            return Ok(FrameStatus::OutOfDate);
        }

        // ── Record + submit ──────────────────────────────────────────────────
        let command_buffer = self.backend.record(&image, rebuilt)?;
        self.backend.submit(command_buffer, &image)?;

        // ── Present ──────────────────────────────────────────────────────────
        if !self.backend.present(&image)? {
            self.backend.mark_out_of_date();
            return Ok(FrameStatus::OutOfDate);
        }
        if image.suboptimal {
            self.backend.mark_out_of_date();
        }

        self.frames_presented += 1;
        Ok(FrameStatus::Presented)
    }

    /// The window changed size; rebuild on the next frame
    pub fn on_resize(&mut self) {
        self.backend.mark_out_of_date();
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.backend.wait_idle()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Update,
        Rebuild,
        Wait,
        Acquire,
        Record { out_of_date: bool },
        Submit,
        Present,
        MarkStale,
    }

    #[derive(Clone, Copy)]
    enum Acquire {
        Ok,
        Suboptimal,
        OutOfDate,
    }

    /// Scripted backend with a minimal Valid/Stale chain
    struct FakeBackend {
        calls: Vec<Call>,
        stale: bool,
        zero_area: bool,
        image_count: usize,
        acquires: VecDeque<Acquire>,
        presents: VecDeque<bool>,
        next_image: u32,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                calls: Vec::new(),
                stale: true,
                zero_area: false,
                image_count: 3,
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                next_image: 0,
            }
        }

        fn count(&self, call: Call) -> usize {
            self.calls.iter().filter(|c| **c == call).count()
        }
    }

    impl FrameBackend for FakeBackend {
        fn update_chain(&mut self) -> Result<ChainUpdate> {
            self.calls.push(Call::Update);
            if !self.stale {
                return Ok(ChainUpdate::Unchanged);
            }
            if self.zero_area {
                return Ok(ChainUpdate::Deferred);
            }
            self.stale = false;
            Ok(ChainUpdate::Rebuilt(ChainChange::between(
                vk::Format::UNDEFINED,
                0,
                vk::Format::B8G8R8A8_SRGB,
                self.image_count,
                vk::Extent2D {
                    width: 800,
                    height: 600,
                },
            )))
        }

        fn rebuild_targets(&mut self, _change: &ChainChange) -> Result<()> {
            self.calls.push(Call::Rebuild);
            Ok(())
        }

        fn wait_for_next_frame(&mut self) -> Result<()> {
            self.calls.push(Call::Wait);
            Ok(())
        }

        fn acquire_image(&mut self) -> Result<AvailableImage> {
            self.calls.push(Call::Acquire);
            let outcome = self.acquires.pop_front().unwrap_or(Acquire::Ok);
            if let Acquire::OutOfDate = outcome {
                return Ok(AvailableImage::out_of_date());
            }

            let image_index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count as u32;
            Ok(AvailableImage {
                image_index,
                image_available: vk::Semaphore::from_raw(1),
                render_finished: vk::Semaphore::from_raw(2),
                in_flight_fence: vk::Fence::from_raw(3),
                suboptimal: matches!(outcome, Acquire::Suboptimal),
            })
        }

        fn record(&mut self, _image: &AvailableImage, out_of_date: bool) -> Result<vk::CommandBuffer> {
            self.calls.push(Call::Record { out_of_date });
            Ok(vk::CommandBuffer::from_raw(4))
        }

        fn submit(&mut self, _command_buffer: vk::CommandBuffer, _image: &AvailableImage) -> Result<()> {
            self.calls.push(Call::Submit);
            Ok(())
        }

        fn present(&mut self, _image: &AvailableImage) -> Result<bool> {
            self.calls.push(Call::Present);
            Ok(self.presents.pop_front().unwrap_or(true))
        }

        fn mark_out_of_date(&mut self) {
            self.calls.push(Call::MarkStale);
            self.stale = true;
        }

        fn wait_idle(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn first_frame_builds_then_runs_the_full_sequence() {
        let mut engine = Engine::new(FakeBackend::new());

        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(
            engine.backend.calls,
            vec![
                Call::Update,
                Call::Rebuild,
                Call::Wait,
                Call::Acquire,
                Call::Record { out_of_date: true },
                Call::Submit,
                Call::Present,
            ]
        );
        assert_eq!(engine.frames_presented(), 1);
    }

    #[test]
    fn steady_state_frames_skip_the_rebuild() {
        let mut engine = Engine::new(FakeBackend::new());
        engine.render().unwrap();
        engine.backend.calls.clear();

        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend.count(Call::Rebuild), 0);
        assert_eq!(engine.backend.count(Call::Record { out_of_date: false }), 1);
    }

    #[test]
    fn invalid_acquire_never_submits_or_presents() {
        let mut backend = FakeBackend::new();
        backend.acquires.push_back(Acquire::OutOfDate);
        let mut engine = Engine::new(backend);

        assert_eq!(engine.render().unwrap(), FrameStatus::OutOfDate);

        let backend = &engine.backend;
        assert_eq!(backend.count(Call::Submit), 0);
        assert_eq!(backend.count(Call::Present), 0);
        assert_eq!(backend.count(Call::MarkStale), 1);
        assert!(backend.stale);
        assert_eq!(engine.frames_presented(), 0);
    }

    #[test]
    fn failed_present_marks_stale_and_next_frame_rebuilds() {
        let mut backend = FakeBackend::new();
        backend.presents.push_back(false);
        let mut engine = Engine::new(backend);

        assert_eq!(engine.render().unwrap(), FrameStatus::OutOfDate);
        assert!(engine.backend.stale);

        engine.backend.calls.clear();
        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend.calls[..2], [Call::Update, Call::Rebuild]);
    }

    #[test]
    fn consecutive_failed_presents_each_mark_stale_once_and_rebuild_next() {
        let mut backend = FakeBackend::new();
        backend.presents.push_back(false);
        backend.presents.push_back(false);
        let mut engine = Engine::new(backend);

        for _ in 0..2 {
            engine.backend.calls.clear();
            assert_eq!(engine.render().unwrap(), FrameStatus::OutOfDate);
            assert_eq!(engine.backend.count(Call::Rebuild), 1);
            assert_eq!(engine.backend.count(Call::MarkStale), 1);
            assert_eq!(engine.backend.calls.last(), Some(&Call::MarkStale));
        }

        engine.backend.calls.clear();
        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend.calls[..2], [Call::Update, Call::Rebuild]);
        assert_eq!(engine.backend.count(Call::MarkStale), 0);
        assert_eq!(engine.frames_presented(), 1);
    }

    #[test]
    fn consecutive_suboptimal_frames_each_mark_stale_and_rebuild_next() {
        let mut backend = FakeBackend::new();
        backend.acquires.push_back(Acquire::Ok);
        backend.acquires.push_back(Acquire::Suboptimal);
        backend.acquires.push_back(Acquire::Suboptimal);
        let mut engine = Engine::new(backend);

        // Initial build
        engine.render().unwrap();

        // First suboptimal frame is still presented, then marked
        engine.backend.calls.clear();
        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend.count(Call::Rebuild), 0);
        assert_eq!(engine.backend.count(Call::MarkStale), 1);
        assert_eq!(engine.backend.calls.last(), Some(&Call::MarkStale));

        // Second one rebuilds first, then is marked again
        engine.backend.calls.clear();
        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend.count(Call::Rebuild), 1);
        assert_eq!(engine.backend.count(Call::MarkStale), 1);

        // And the frame after that rebuilds once more
        engine.backend.calls.clear();
        engine.render().unwrap();
        assert_eq!(engine.backend.count(Call::Rebuild), 1);
        assert_eq!(engine.backend.count(Call::MarkStale), 0);
        assert_eq!(engine.frames_presented(), 4);
    }

    #[test]
    fn rebuild_happens_before_the_fence_wait() {
        let mut engine = Engine::new(FakeBackend::new());
        engine.render().unwrap();
        engine.on_resize();
        engine.backend.calls.clear();

        engine.render().unwrap();

        let calls = &engine.backend.calls;
        let rebuild = calls.iter().position(|c| *c == Call::Rebuild).unwrap();
        let wait = calls.iter().position(|c| *c == Call::Wait).unwrap();
        assert!(rebuild < wait);
    }

    #[test]
    fn zero_area_surface_skips_the_frame_until_it_has_area() {
        let mut backend = FakeBackend::new();
        backend.zero_area = true;
        let mut engine = Engine::new(backend);

        assert_eq!(engine.render().unwrap(), FrameStatus::Skipped);
        assert_eq!(engine.render().unwrap(), FrameStatus::Skipped);
        assert_eq!(engine.backend.count(Call::Acquire), 0);
        assert_eq!(engine.backend.count(Call::Wait), 0);

        engine.backend.zero_area = false;
        assert_eq!(engine.render().unwrap(), FrameStatus::Presented);
        assert_eq!(engine.backend.count(Call::Rebuild), 1);
    }

    #[test]
    fn resize_marks_stale_without_touching_the_gpu() {
        let mut engine = Engine::new(FakeBackend::new());
        engine.on_resize();
        assert_eq!(engine.backend.calls, vec![Call::MarkStale]);
    }
}
