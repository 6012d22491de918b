//! Audio platform: where contexts come from

use bw_core::RenderConfig;

use crate::context::AudioContext;
use crate::error::{GraphError, GraphResult};

/// Factory for audio contexts
pub trait AudioPlatform: Send + Sync {
    fn name(&self) -> &str;

    fn create_context(&self) -> GraphResult<AudioContext>;
}

/// In-process software renderer
#[derive(Debug, Clone, Default)]
pub struct SoftwarePlatform {
    render: RenderConfig,
    autoplay_blocked: bool,
}

impl SoftwarePlatform {
    pub fn new(render: RenderConfig) -> Self {
        Self {
            render,
            autoplay_blocked: false,
        }
    }

    /// Contexts from this platform refuse to resume
    pub fn with_autoplay_blocked(mut self) -> Self {
        self.autoplay_blocked = true;
        self
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render
    }
}

impl AudioPlatform for SoftwarePlatform {
    fn name(&self) -> &str {
        "software"
    }

    /// Contexts start suspended
    fn create_context(&self) -> GraphResult<AudioContext> {
        let ctx = AudioContext::new(&self.render);
        if self.autoplay_blocked {
            ctx.block_resume("autoplay blocked");
        }
        Ok(ctx)
    }
}

/// Platform with no audio graph at all
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPlatform;

impl AudioPlatform for UnsupportedPlatform {
    fn name(&self) -> &str {
        "unsupported"
    }

    fn create_context(&self) -> GraphResult<AudioContext> {
        Err(GraphError::Unsupported("no audio graph implementation".into()))
    }
}
