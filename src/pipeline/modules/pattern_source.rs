//! PatternSource: generates a moving diagonal gradient.
//!
//! Each frame shifts the gradient by `speed` pixels. With `frames > 0` the
//! module bounds the run to that many frames.

use crate::error::Result;
use crate::image::{Depth, Image};
use crate::pipeline::module::{ModuleContext, ModuleHooks, ModuleInfo};
use crate::pipeline::parameter::{Parameter, ParameterValue};
use crate::pipeline::slot::SlotDescriptor;

static SLOTS: &[SlotDescriptor] = &[SlotDescriptor::output(
    "out",
    "Output",
    "generated RGB gradient",
)];

const CHANNELS: u8 = 3;

pub struct PatternSource {
    max_frames: u64,
}

impl PatternSource {
    pub fn new() -> Self {
        Self { max_frames: 0 }
    }
}

impl Default for PatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleHooks for PatternSource {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "PatternSource",
            display_name: "Pattern source",
            version: "1.0",
            short_description: "Generates a moving gradient",
            long_description: "Produces a diagonal RGB gradient that scrolls by `speed` pixels per frame.",
        }
    }

    fn slots(&self) -> &[SlotDescriptor] {
        SLOTS
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::new("width", ParameterValue::Int(64)).description("image width in pixels"),
            Parameter::new("height", ParameterValue::Int(48)).description("image height in pixels"),
            Parameter::new("speed", ParameterValue::Int(1))
                .description("scroll per frame in pixels")
                .runtime_changeable(),
            Parameter::new("frames", ParameterValue::Int(0))
                .display_name("max frames")
                .description("number of frames to produce, 0 = unbounded"),
        ]
    }

    fn verify_parameter(&self, name: &str, candidate: &ParameterValue) -> Option<String> {
        let value = candidate.as_int()?;
        match name {
            "width" | "height" if value <= 0 || value > u32::MAX as i64 => {
                Some(format!("{} must be a positive pixel count", name))
            }
            "frames" if value < 0 => Some("frames cannot be negative".into()),
            _ => None,
        }
    }

    fn init(&mut self, ctx: &ModuleContext) -> Result<()> {
        let width = ctx.int("width")? as u32;
        let height = ctx.int("height")? as u32;
        let image = Image::new(width, height, Depth::U8, CHANNELS)?;
        ctx.output("out")?.set_image(image)?;
        self.update_parameters(ctx)
    }

    fn update_parameters(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.max_frames = ctx.int("frames")?.max(0) as u64;
        Ok(())
    }

    fn process(&mut self, ctx: &ModuleContext, frame: u64) -> Result<()> {
        let speed = ctx.int("speed")?;
        let offset = (frame as i64).wrapping_mul(speed).rem_euclid(256) as usize;

        let mut guard = ctx.output("out")?.lock()?;
        let image = match guard.as_mut() {
            Some(image) => image,
            None => return Ok(()),
        };
        let width = image.width() as usize;
        let stride = image.row_stride();
        for (y, row) in image.as_bytes_mut().chunks_exact_mut(stride).enumerate() {
            for x in 0..width {
                let v = ((x + y + offset) & 0xff) as u8;
                let px = &mut row[x * CHANNELS as usize..(x + 1) * CHANNELS as usize];
                px[0] = v;
                px[1] = v.wrapping_mul(2);
                px[2] = 255 - v;
            }
        }
        Ok(())
    }

    fn reset(&mut self, _ctx: &ModuleContext) -> Result<()> {
        self.max_frames = 0;
        Ok(())
    }

    fn max_frames(&self) -> u64 {
        self.max_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::ModuleId;
    use crate::pipeline::module::Module;

    #[test]
    fn test_produces_gradient() {
        let m = Module::new(ModuleId(1), "src", Box::new(PatternSource::new())).unwrap();
        m.set_parameter_value("width", ParameterValue::Int(4)).unwrap();
        m.set_parameter_value("height", ParameterValue::Int(2)).unwrap();
        m.init().unwrap();
        m.start().unwrap();
        m.process(0).unwrap();

        let image = m.output("out").unwrap().image_snapshot().unwrap().unwrap();
        assert_eq!((image.width(), image.height()), (4, 2));
        // pixel (1, 1) at frame 0 carries x + y = 2
        let stride = image.row_stride();
        assert_eq!(image.as_bytes()[stride + 3], 2);
    }

    #[test]
    fn test_frames_parameter_bounds_run() {
        let m = Module::new(ModuleId(1), "src", Box::new(PatternSource::new())).unwrap();
        m.set_parameter_value("frames", ParameterValue::Int(5)).unwrap();
        assert_eq!(m.max_frames(), 5);
        assert!(m.set_parameter_value("width", ParameterValue::Int(0)).is_err());
    }
}
