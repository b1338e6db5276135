//! Invert: per-sample inversion of 8-bit images.

use crate::error::{KernelError, Result};
use crate::image::{Depth, Image};
use crate::pipeline::module::{ModuleContext, ModuleHooks, ModuleInfo};
use crate::pipeline::parameter::{Parameter, ParameterValue};
use crate::pipeline::slot::SlotDescriptor;

static SLOTS: &[SlotDescriptor] = &[
    SlotDescriptor::input("in", "Input", "8-bit image to invert"),
    SlotDescriptor::output("out", "Output", "inverted image"),
];

/// Inverts every sample (`255 - v`). With `enabled = false` the input is
/// copied through unchanged.
pub struct Invert {
    enabled: bool,
}

impl Invert {
    pub fn new() -> Self {
        Self { enabled: true }
    }
}

impl Default for Invert {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleHooks for Invert {
    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            name: "Invert",
            display_name: "Invert",
            version: "1.0",
            short_description: "Inverts 8-bit images",
            long_description: "",
        }
    }

    fn slots(&self) -> &[SlotDescriptor] {
        SLOTS
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::new("enabled", ParameterValue::Bool(true))
            .description("invert; when off, pass the input through")
            .runtime_changeable()]
    }

    fn init(&mut self, ctx: &ModuleContext) -> Result<()> {
        let input = ctx.input("in")?;
        if !input.is_connected() {
            return Err(KernelError::NotConnectedSlot(input.qualified_name()));
        }
        self.enabled = ctx.bool("enabled")?;
        Ok(())
    }

    fn update_parameters(&mut self, ctx: &ModuleContext) -> Result<()> {
        self.enabled = ctx.bool("enabled")?;
        Ok(())
    }

    fn process(&mut self, ctx: &ModuleContext, _frame: u64) -> Result<()> {
        let input = ctx.input("in")?;
        let source = input.lock()?;
        let source = source
            .as_ref()
            .ok_or_else(|| KernelError::InvalidImageSlot(format!("{} holds no image", input.qualified_name())))?;
        if source.depth() != Depth::U8 {
            return Err(KernelError::UseModule {
                module: ctx.label().to_string(),
                message: format!("expected an 8-bit image, got {:?}", source.depth()),
            });
        }

        let mut out = ctx.output("out")?.lock()?;
        if !matches!(out.as_ref(), Some(image) if image.same_layout(source)) {
            *out = Some(Image::like(source));
        }
        let Some(target) = out.as_mut() else {
            return Ok(());
        };
        if self.enabled {
            for (dst, src) in target.as_bytes_mut().iter_mut().zip(source.as_bytes()) {
                *dst = 255 - *src;
            }
        } else {
            target.as_bytes_mut().copy_from_slice(source.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::id::ModuleId;
    use crate::pipeline::module::Module;
    use crate::pipeline::modules::PatternSource;
    use crate::pipeline::slot::Slot;

    #[test]
    fn test_init_requires_connected_input() {
        let m = Module::new(ModuleId(1), "inv", Box::new(Invert::new())).unwrap();
        assert_eq!(m.init().unwrap_err().kind(), ErrorKind::NotConnectedSlot);
    }

    #[test]
    fn test_inverts_and_passes_through() {
        let src = Module::new(ModuleId(1), "src", Box::new(PatternSource::new())).unwrap();
        let inv = Module::new(ModuleId(2), "inv", Box::new(Invert::new())).unwrap();
        Slot::connect(src.output("out").unwrap(), inv.input("in").unwrap()).unwrap();

        for m in [&src, &inv] {
            m.init().unwrap();
            m.start().unwrap();
        }
        src.process(0).unwrap();
        inv.process(0).unwrap();
        let original = src.output("out").unwrap().image_snapshot().unwrap().unwrap();
        let inverted = inv.output("out").unwrap().image_snapshot().unwrap().unwrap();
        assert_eq!(inverted.as_bytes()[5], 255 - original.as_bytes()[5]);

        inv.set_parameter_value("enabled", ParameterValue::Bool(false)).unwrap();
        inv.process(1).unwrap();
        let copied = inv.output("out").unwrap().image_snapshot().unwrap().unwrap();
        assert_eq!(copied, original);
    }
}
