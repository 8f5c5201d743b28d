//! # Frame pipeline
//!
//! [`Pipeline`] owns everything that lives across frames: the previous grayscale raster, the
//! last solved field, scratch gradient buffers and the instantaneous frame rate. Each call to
//! [`Pipeline::process_frame`] either commits a complete new state or leaves the old one intact.

use crate::capture::{negotiate_size, CapturedFrame, FrameSource};
use crate::config::PipelineConfig;
use crate::error::{FlowError, Result};
use crate::executor::{Executor, ExecutorKind};
use crate::frame::decode;
use crate::gradient::{compute_gradients_into, GradientTriple};
use crate::properties::{Properties, PropertyMut};
use crate::raster::Raster;
use crate::sampler::FlowSample;
use crate::solver::{FlowField, RelaxScratch};
use anyhow::anyhow;
use log::*;
use std::time::{Duration, Instant};

/// Running timing of one pipeline stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTime {
    pub last: Duration,
    pub total: Duration,
    pub count: u32,
}

impl StageTime {
    fn record(&mut self, elapsed: Duration) {
        self.last = elapsed;
        self.total += elapsed;
        self.count += 1;
    }

    /// Average duration of the stage.
    pub fn mean(&self) -> Duration {
        self.total.checked_div(self.count).unwrap_or_default()
    }
}

/// Frame counters and per-stage timings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames that were processed successfully.
    pub frames: usize,
    /// Frames rejected with an error.
    pub skipped: usize,
    /// Frames the source was asked to drop because they went stale.
    pub dropped: usize,
    pub decode: StageTime,
    pub gradients: StageTime,
    pub solve: StageTime,
    pub sample: StageTime,
}

struct FrameState {
    gray: Raster<u8>,
    timestamp: Duration,
    flow: Option<FlowField>,
}

/// Working buffers of a solve, reused while the frame size stays the same.
struct FlowBuffers {
    gradients: GradientTriple,
    scratch: RelaxScratch,
    flow: FlowField,
}

impl FlowBuffers {
    fn new(width: usize, height: usize) -> Self {
        Self {
            gradients: GradientTriple::for_input(width, height),
            scratch: RelaxScratch::new(width - 1, height - 1),
            flow: FlowField::new(width - 1, height - 1),
        }
    }
}

/// Streaming Horn–Schunck pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    executor_kind: ExecutorKind,
    executor: Box<dyn Executor>,
    downscale: usize,
    state: Option<FrameState>,
    buffers: Option<FlowBuffers>,
    fps: Option<f32>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let executor = config.executor.create();
        debug!("using {} executor", executor.name());

        Ok(Self {
            config,
            executor_kind: config.executor,
            executor,
            downscale: config.downscale_factor,
            state: None,
            buffers: None,
            fps: None,
            stats: Default::default(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Grayscale raster of the last accepted frame.
    pub fn grayscale(&self) -> Option<&Raster<u8>> {
        self.state.as_ref().map(|s| &s.gray)
    }

    /// Most recently solved field.
    pub fn flow(&self) -> Option<&FlowField> {
        self.state.as_ref().and_then(|s| s.flow.as_ref())
    }

    /// Capture time of the last accepted frame.
    pub fn timestamp(&self) -> Option<Duration> {
        self.state.as_ref().map(|s| s.timestamp)
    }

    /// Instantaneous frame rate between the last two accepted frames.
    pub fn fps(&self) -> Option<f32> {
        self.fps
    }

    /// Sample the latest field at arbitrary points.
    ///
    /// Returns no samples until a field has been solved.
    pub fn sample(&self, points: &[(f32, f32)]) -> Result<Vec<FlowSample>> {
        match self.flow() {
            Some(flow) => self.config.sampler().sample(flow, points),
            None => Ok(vec![]),
        }
    }

    /// Forget all cross-frame state. The next frame is treated as the first one.
    pub fn reset(&mut self) {
        self.state = None;
        self.fps = None;
    }

    /// Pick up configuration changes made through [`Properties`].
    fn apply_config(&mut self) {
        if self.config.executor != self.executor_kind {
            self.executor = self.config.executor.create();
            self.executor_kind = self.config.executor;
            debug!("switched to {} executor", self.executor.name());
        }

        if self.config.downscale_factor != self.downscale {
            info!(
                "downscale factor changed from {} to {}, restarting",
                self.downscale, self.config.downscale_factor
            );
            self.downscale = self.config.downscale_factor;
            self.reset();
        }
    }

    /// Process a single frame.
    ///
    /// Returns the configured grid of samples over the new field. The first frame only primes
    /// the pipeline and yields no samples.
    ///
    /// On error the frame is dropped and the previous state is kept, so the next frame is
    /// compared against the last one that was accepted.
    pub fn process_frame(&mut self, frame: &CapturedFrame) -> Result<Vec<FlowSample>> {
        self.apply_config();

        let timer = Instant::now();
        let gray = decode(&frame.data, frame.width, frame.height, self.downscale)?;
        self.stats.decode.record(timer.elapsed());

        let state = match &self.state {
            Some(state) => state,
            None => {
                let (w, h) = gray.dim();
                info!("first frame, decoded to {}x{}", w, h);
                self.state = Some(FrameState {
                    gray,
                    timestamp: frame.timestamp,
                    flow: None,
                });
                self.stats.frames += 1;
                return Ok(vec![]);
            }
        };

        state.gray.ensure_same_dim(&gray)?;

        let (w, h) = gray.dim();
        if w < 2 || h < 2 {
            return Err(FlowError::RasterTooSmall(w, h));
        }

        let elapsed = frame.timestamp.as_secs_f64() - state.timestamp.as_secs_f64();
        if elapsed <= 0.0 {
            return Err(FlowError::DegenerateTiming(elapsed));
        }
        let fps = (1.0 / elapsed) as f32;

        let buffers = match self.buffers.take() {
            Some(buffers) if buffers.gradients.dim() == (w - 1, h - 1) => buffers,
            _ => {
                info!("allocating {}x{} flow buffers", w - 1, h - 1);
                FlowBuffers::new(w, h)
            }
        };
        let FlowBuffers {
            gradients,
            scratch,
            flow,
        } = self.buffers.insert(buffers);

        let timer = Instant::now();
        compute_gradients_into(self.executor.as_ref(), &state.gray, &gray, fps, gradients)?;
        self.stats.gradients.record(timer.elapsed());

        match &state.flow {
            Some(prev) if self.config.warm_start => flow.copy_from(prev),
            _ => flow.clear(),
        }

        let timer = Instant::now();
        let solver = self.config.solver();
        solver.relax_with(self.executor.as_ref(), gradients, flow, scratch)?;
        self.stats.solve.record(timer.elapsed());

        let timer = Instant::now();
        let points = self.config.grid().points(w, h);
        let samples = self.config.sampler().sample(flow, &points)?;
        self.stats.sample.record(timer.elapsed());

        trace!(
            "frame {:?}: {:.1} fps, gradients {:?}, solve {:?}",
            frame.timestamp,
            fps,
            self.stats.gradients.last,
            self.stats.solve.last
        );

        // The previous field becomes the working buffer of the next frame.
        let mut flow = match self.state.take().and_then(|state| state.flow) {
            Some(prev) => prev,
            None => FlowField::new(w - 1, h - 1),
        };
        if let Some(buffers) = &mut self.buffers {
            std::mem::swap(&mut buffers.flow, &mut flow);
        }

        self.state = Some(FrameState {
            gray,
            timestamp: frame.timestamp,
            flow: Some(flow),
        });
        self.fps = Some(fps);
        self.stats.frames += 1;

        Ok(samples)
    }

    /// Drive the pipeline from a frame source until the stream ends.
    ///
    /// Negotiates the capture size, then feeds every frame through
    /// [`process_frame`](Self::process_frame) and hands the samples to `sink`. Frames that fail
    /// to process are logged and skipped. When processing falls behind the source framerate, the
    /// source is asked to drop the frames that went stale in the meantime.
    ///
    /// # Arguments
    ///
    /// * `source` - frame source to read from.
    /// * `sink` - receives the pipeline and the samples of every processed frame.
    pub fn run<F>(&mut self, source: &mut dyn FrameSource, mut sink: F) -> anyhow::Result<()>
    where
        F: FnMut(&Self, &[FlowSample]) -> anyhow::Result<()>,
    {
        let sizes = source.supported_sizes();
        let (width, height) = negotiate_size(&sizes, self.config.target_pixel_count)
            .ok_or_else(|| anyhow!("frame source does not advertise any sizes"))?;

        info!("capturing at {}x{}", width, height);
        source.set_size(width, height)?;

        let mut skip_frames = 0;

        while let Some(frame) = source.next_frame(skip_frames)? {
            self.stats.dropped += skip_frames;

            let timer = Instant::now();

            match self.process_frame(&frame) {
                Ok(samples) => sink(self, &samples)?,
                Err(e) => {
                    warn!("skipping frame at {:?}: {}", frame.timestamp, e);
                    self.stats.skipped += 1;
                }
            }

            let elapsed = timer.elapsed();

            skip_frames = source
                .get_framerate()
                .filter(|f| f.is_finite() && *f > 0.0)
                .map(|f| stale_frames(elapsed, Duration::from_secs_f64(1.0 / f)))
                .unwrap_or(0);

            if skip_frames > 0 {
                debug!("frame took {:?}, dropping {} stale frames", elapsed, skip_frames);
            }
        }

        info!(
            "stream ended after {} frames ({} skipped, {} dropped)",
            self.stats.frames, self.stats.skipped, self.stats.dropped
        );

        Ok(())
    }
}

/// Number of frames to drop after spending `elapsed` on one frame.
///
/// Every frame that arrived during processing is stale except the newest one.
fn stale_frames(elapsed: Duration, budget: Duration) -> usize {
    if budget.is_zero() {
        return 0;
    }

    ((elapsed.as_secs_f64() / budget.as_secs_f64()) as usize).saturating_sub(1)
}

impl Properties for Pipeline {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut<'_>)> {
        self.config.props_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::frame::FrameBuffer;
    use assert_approx_eq::assert_approx_eq;

    const W: usize = 16;
    const H: usize = 16;

    fn frame(timestamp: Duration, luma: impl Fn(usize, usize) -> u8) -> CapturedFrame {
        frame_sized(W, H, timestamp, luma)
    }

    fn frame_sized(
        width: usize,
        height: usize,
        timestamp: Duration,
        luma: impl Fn(usize, usize) -> u8,
    ) -> CapturedFrame {
        let mut data = vec![128u8; FrameBuffer::expected_len(width, height)];
        for y in 0..height {
            for x in 0..width {
                data[y * width + x] = luma(x, y);
            }
        }
        CapturedFrame {
            data,
            width,
            height,
            timestamp,
        }
    }

    fn at(frame: usize) -> Duration {
        Duration::from_secs_f64(frame as f64 / 30.0)
    }

    fn flat(_: usize, _: usize) -> u8 {
        100
    }

    fn bright_corner(x: usize, y: usize) -> u8 {
        if x == 0 && y == 0 {
            150
        } else {
            100
        }
    }

    #[test]
    fn first_frame_primes() {
        let mut pipeline = Pipeline::new(Default::default()).unwrap();
        let samples = pipeline.process_frame(&frame(at(0), flat)).unwrap();

        assert!(samples.is_empty());
        assert_eq!(pipeline.grayscale().unwrap().dim(), (4, 4));
        assert!(pipeline.flow().is_none());
        assert!(pipeline.fps().is_none());
        assert!(pipeline.sample(&[(0.0, 0.0)]).unwrap().is_empty());
    }

    #[test]
    fn brightening_frame() {
        let mut pipeline = Pipeline::new(Default::default()).unwrap();
        pipeline.process_frame(&frame(at(0), flat)).unwrap();
        let samples = pipeline.process_frame(&frame(at(1), bright_corner)).unwrap();

        assert_eq!(samples.len(), 12);
        assert_approx_eq!(pipeline.fps().unwrap(), 30.0, 1e-3);

        let flow = pipeline.flow().unwrap();
        assert_eq!(flow.dim(), (3, 3));
        assert_approx_eq!(flow.get_motion(0, 0).magnitude(), 5.37076, 1e-3);
        assert_approx_eq!(flow.get_motion(2, 2).magnitude(), 0.0);

        assert_eq!(pipeline.sample(&[(0.0, 0.0)]).unwrap()[0], samples[0]);
        assert_eq!(pipeline.stats().frames, 2);
    }

    #[test]
    fn degenerate_timing_keeps_state() {
        let mut pipeline = Pipeline::new(Default::default()).unwrap();
        pipeline.process_frame(&frame(at(1), flat)).unwrap();

        for t in [at(1), at(0)] {
            let err = pipeline
                .process_frame(&frame(t, bright_corner))
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DegenerateTiming);
        }

        assert!(pipeline.grayscale().unwrap().as_slice().iter().all(|&v| v == 100));
        assert!(pipeline.flow().is_none());

        // Still compares against the first frame.
        pipeline.process_frame(&frame(at(2), bright_corner)).unwrap();
        assert!(pipeline.flow().unwrap().get_motion(0, 0).magnitude() > 1.0);
    }

    #[test]
    fn dimension_change_rejected() {
        let mut pipeline = Pipeline::new(Default::default()).unwrap();
        pipeline.process_frame(&frame(at(0), flat)).unwrap();
        pipeline.process_frame(&frame(at(1), bright_corner)).unwrap();
        let flow = pipeline.flow().cloned();

        let err = pipeline
            .process_frame(&frame_sized(8, 8, at(2), flat))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(pipeline.grayscale().unwrap().dim(), (4, 4));
        assert_eq!(pipeline.flow().cloned(), flow);

        let bad = CapturedFrame {
            data: vec![0; 10],
            ..frame(at(3), flat)
        };
        assert_eq!(
            pipeline.process_frame(&bad).unwrap_err().kind(),
            ErrorKind::Format
        );
    }

    #[test]
    fn warm_start_carries_field() {
        let run = |warm_start| {
            let mut pipeline = Pipeline::new(PipelineConfig {
                warm_start,
                ..Default::default()
            })
            .unwrap();
            pipeline.process_frame(&frame(at(0), flat)).unwrap();
            pipeline.process_frame(&frame(at(1), bright_corner)).unwrap();
            // No temporal change, only the seed can produce motion.
            pipeline.process_frame(&frame(at(2), bright_corner)).unwrap();
            pipeline.flow().unwrap().get_motion(0, 0).magnitude()
        };

        assert_approx_eq!(run(false), 0.0);
        assert!(run(true) > 0.1);
    }

    #[test]
    fn warm_start_matches_seeded_solve() {
        let mut pipeline = Pipeline::new(PipelineConfig {
            warm_start: true,
            ..Default::default()
        })
        .unwrap();
        pipeline.process_frame(&frame(at(0), flat)).unwrap();
        pipeline.process_frame(&frame(at(1), bright_corner)).unwrap();
        let seed = pipeline.flow().cloned();

        // A failed frame leaves the committed field alone.
        pipeline
            .process_frame(&frame(at(1), bright_corner))
            .unwrap_err();
        assert_eq!(pipeline.flow().cloned(), seed);

        pipeline.process_frame(&frame(at(2), flat)).unwrap();

        let prev = Raster::from_fn(4, 4, |x, y| bright_corner(x * 4, y * 4));
        let curr = Raster::from_elem(4, 4, 100u8);
        let gradients = crate::gradient::compute_gradients(&prev, &curr, 30.0).unwrap();
        let expected = pipeline
            .config()
            .solver()
            .solve(&crate::executor::SequentialExecutor, &gradients, seed)
            .unwrap();

        let flow = pipeline.flow().unwrap();
        for ((_, _, a), (_, _, b)) in flow.iter().zip(expected.iter()) {
            assert_approx_eq!(a.x, b.x, 1e-4);
            assert_approx_eq!(a.y, b.y, 1e-4);
        }
    }

    #[test]
    fn grid_spans_decoded_frame() {
        let mut pipeline = Pipeline::new(PipelineConfig {
            downscale_factor: 1,
            ..Default::default()
        })
        .unwrap();
        pipeline.process_frame(&frame_sized(80, 60, at(0), flat)).unwrap();
        let samples = pipeline
            .process_frame(&frame_sized(80, 60, at(1), flat))
            .unwrap();

        let positions = samples
            .iter()
            .map(|s| (s.position.x, s.position.y))
            .collect::<Vec<_>>();

        let expected = [10.0f32, 30.0, 50.0]
            .iter()
            .flat_map(|&y| [10.0, 30.0, 50.0, 70.0].map(|x| (x, y)))
            .collect::<Vec<_>>();

        assert_eq!(positions, expected);
    }

    #[test]
    fn tuned_at_runtime() {
        let mut pipeline = Pipeline::new(Default::default()).unwrap();
        pipeline.process_frame(&frame(at(0), flat)).unwrap();

        pipeline.set_property("Iterations", "0").unwrap();
        pipeline.process_frame(&frame(at(1), bright_corner)).unwrap();
        assert_approx_eq!(pipeline.flow().unwrap().get_motion(0, 0).magnitude(), 0.0);

        // Changing the decimation restarts the stream.
        pipeline.set_property("Downscale", "2").unwrap();
        assert!(pipeline
            .process_frame(&frame(at(2), flat))
            .unwrap()
            .is_empty());
        assert_eq!(pipeline.grayscale().unwrap().dim(), (8, 8));
        assert!(pipeline.flow().is_none());
    }

    #[test]
    fn stale_frame_count() {
        let budget = Duration::from_millis(33);
        assert_eq!(stale_frames(Duration::from_millis(10), budget), 0);
        assert_eq!(stale_frames(Duration::from_millis(50), budget), 0);
        assert_eq!(stale_frames(Duration::from_millis(100), budget), 2);
        assert_eq!(stale_frames(Duration::from_millis(100), Duration::ZERO), 0);
    }

    struct MockSource {
        frames: Vec<CapturedFrame>,
        size: Option<(usize, usize)>,
        fail_at_end: bool,
    }

    impl FrameSource for MockSource {
        fn supported_sizes(&self) -> Vec<(usize, usize)> {
            vec![(64, 48), (W, H), (8, 8)]
        }

        fn set_size(&mut self, width: usize, height: usize) -> anyhow::Result<()> {
            self.size = Some((width, height));
            Ok(())
        }

        fn next_frame(&mut self, skip_frames: usize) -> anyhow::Result<Option<CapturedFrame>> {
            assert_eq!(skip_frames, 0);
            if self.frames.is_empty() {
                if self.fail_at_end {
                    return Err(anyhow!("device lost"));
                }
                return Ok(None);
            }
            Ok(Some(self.frames.remove(0)))
        }

        fn get_framerate(&self) -> Option<f64> {
            None
        }
    }

    #[test]
    fn run_until_end() {
        let mut source = MockSource {
            frames: vec![
                frame(at(0), flat),
                frame(at(1), bright_corner),
                frame(at(1), flat),
                frame(at(2), flat),
            ],
            size: None,
            fail_at_end: false,
        };

        let mut pipeline = Pipeline::new(PipelineConfig {
            target_pixel_count: 300,
            ..Default::default()
        })
        .unwrap();

        let mut counts = vec![];
        pipeline
            .run(&mut source, |pipeline, samples| {
                assert!(pipeline.grayscale().is_some());
                counts.push(samples.len());
                Ok(())
            })
            .unwrap();

        assert_eq!(source.size, Some((W, H)));
        assert_eq!(counts, vec![0, 12, 12]);
        assert_eq!(pipeline.stats().frames, 3);
        assert_eq!(pipeline.stats().skipped, 1);
    }

    #[test]
    fn source_failure_ends_run() {
        let mut source = MockSource {
            frames: vec![frame(at(0), flat)],
            size: None,
            fail_at_end: true,
        };

        let mut pipeline = Pipeline::new(Default::default()).unwrap();
        let mut calls = 0;
        let res = pipeline.run(&mut source, |_, _| {
            calls += 1;
            Ok(())
        });

        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
