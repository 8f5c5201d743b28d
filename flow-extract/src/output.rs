//! Flow output formats.

use lumaflow::prelude::v1::*;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

/// Receives the result of every accepted frame.
///
/// `frame` counts accepted frames only. `time` is the capture timestamp, so frames that were
/// dropped or failed to process show up as gaps in it.
pub trait FlowWriter {
    fn write_frame(
        &mut self,
        frame: usize,
        time: Duration,
        flow: Option<&FlowField>,
        samples: &[FlowSample],
    ) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

#[derive(Serialize)]
struct SampleRow {
    frame: usize,
    time: f64,
    x: f32,
    y: f32,
    u: f32,
    v: f32,
    magnitude: f32,
    angle: f32,
}

/// Writes sparse samples as CSV rows.
pub struct CsvWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(out),
        }
    }
}

impl<W: Write> FlowWriter for CsvWriter<W> {
    fn write_frame(
        &mut self,
        frame: usize,
        time: Duration,
        _: Option<&FlowField>,
        samples: &[FlowSample],
    ) -> Result<()> {
        for s in samples {
            self.writer.serialize(SampleRow {
                frame,
                time: time.as_secs_f64(),
                x: s.position.x,
                y: s.position.y,
                u: s.velocity.x,
                v: s.velocity.y,
                magnitude: s.magnitude,
                angle: s.angle,
            })?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(Into::into)
    }
}

/// Writes dense fields in the `.mvec` layout.
///
/// Every frame is a 32-bit LE vector count, followed by `[pos.x, pos.y, motion.x, motion.y]`
/// groups of LE `f32`. Positions are normalised to the field size. Frames without a field are
/// written as empty.
pub struct MvecWriter<W: Write> {
    out: W,
}

impl<W: Write> MvecWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> FlowWriter for MvecWriter<W> {
    fn write_frame(
        &mut self,
        _: usize,
        _: Duration,
        flow: Option<&FlowField>,
        _: &[FlowSample],
    ) -> Result<()> {
        let flow = match flow {
            Some(flow) => flow,
            None => {
                self.out.write_all(&0u32.to_le_bytes())?;
                return Ok(());
            }
        };

        let (w, h) = flow.dim();
        self.out.write_all(&((w * h) as u32).to_le_bytes())?;

        for v in flow
            .motion_iter()
            .flat_map(|(a, m)| [a.x, a.y, m.x, m.y])
        {
            self.out.write_all(&v.to_le_bytes())?;
        }

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.out.flush().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> FlowField {
        FlowField::from_components(
            Raster::from_fn(2, 1, |x, _| x as f32),
            Raster::from_elem(2, 1, -1.0),
        )
        .unwrap()
    }

    #[test]
    fn mvec_layout() {
        let mut writer = MvecWriter::new(vec![]);
        writer.write_frame(0, Duration::ZERO, None, &[]).unwrap();
        writer
            .write_frame(1, Duration::from_millis(33), Some(&field()), &[])
            .unwrap();
        writer.finish().unwrap();

        let floats = |bytes: &[u8]| {
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect::<Vec<_>>()
        };

        let out = writer.out;
        assert_eq!(&out[..4], &0u32.to_le_bytes());
        assert_eq!(&out[4..8], &2u32.to_le_bytes());
        assert_eq!(
            floats(&out[8..]),
            vec![0.0, 0.0, 0.0, -1.0, 0.5, 0.0, 1.0, -1.0]
        );
    }

    #[test]
    fn csv_rows() {
        let samples = FlowSampler::new(1.0).sample(&field(), &[(0.0, 0.0)]).unwrap();

        let mut writer = CsvWriter::new(vec![]);
        writer
            .write_frame(3, Duration::from_millis(250), None, &samples)
            .unwrap();
        writer.finish().unwrap();

        let text = String::from_utf8(writer.writer.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("frame,time,x,y,u,v,magnitude,angle"));
        assert!(lines.next().unwrap().starts_with("3,0.25,0.0,0.0,0.5,-1.0,"));
        assert_eq!(lines.next(), None);
    }
}
