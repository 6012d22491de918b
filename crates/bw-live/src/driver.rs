//! Offline render driver
//!
//! Stands in for the audio device: pulls every registered context one
//! quantum at a time, mixes them into the output, then moves the element's
//! playhead forward so all contexts see the same samples for a quantum.

use bw_core::{RenderConfig, Sample};
use bw_engine::{AudioContext, ContextState, MediaElement};

pub struct RenderDriver {
    quantum: usize,
    contexts: Vec<AudioContext>,
    scratch: Vec<Sample>,
}

impl RenderDriver {
    pub fn new(config: &RenderConfig) -> Self {
        let quantum = config.render_quantum.max(1);
        Self {
            quantum,
            contexts: Vec::new(),
            scratch: vec![0.0; quantum],
        }
    }

    pub fn quantum(&self) -> usize {
        self.quantum
    }

    /// Register a context. `false` if it is already registered.
    pub fn add_context(&mut self, context: &AudioContext) -> bool {
        if self.contexts.iter().any(|c| c.same_context(context)) {
            return false;
        }
        self.contexts.push(context.clone());
        true
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Render `out.len()` frames. Returns how many contexts contributed to
    /// the last quantum.
    pub fn render(&mut self, element: Option<&MediaElement>, out: &mut [Sample]) -> usize {
        out.fill(0.0);
        let mut contributing = 0;
        for chunk in out.chunks_mut(self.quantum) {
            contributing = 0;
            let scratch = &mut self.scratch[..chunk.len()];
            for context in &self.contexts {
                if context.state() == ContextState::Closed {
                    continue;
                }
                if let Err(e) = context.render(scratch) {
                    log::trace!("[Driver] context {} skipped: {}", context.id(), e);
                    continue;
                }
                for (o, s) in chunk.iter_mut().zip(scratch.iter()) {
                    *o += *s;
                }
                contributing += 1;
            }
            if let Some(element) = element {
                element.advance(chunk.len());
            }
        }
        contributing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RenderConfig {
        RenderConfig {
            render_quantum: 128,
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_dedupes_contexts() {
        let mut driver = RenderDriver::new(&config());
        let ctx = AudioContext::new(&config());
        assert!(driver.add_context(&ctx));
        assert!(!driver.add_context(&ctx.clone()));
        assert_eq!(driver.context_count(), 1);
    }

    #[test]
    fn test_element_passthrough_and_advance() {
        let cfg = config();
        let ctx = AudioContext::new(&cfg);
        ctx.resume().unwrap();
        let el = MediaElement::new(vec![0.5; 1000], cfg.sample_rate);
        let src = ctx.create_media_element_source(&el).unwrap();
        ctx.connect(&src, &ctx.destination()).unwrap();
        el.play();

        let mut driver = RenderDriver::new(&cfg);
        driver.add_context(&ctx);
        let mut out = vec![0.0; 256];
        assert_eq!(driver.render(Some(&el), &mut out), 1);
        assert!(out.iter().all(|&s| (s - 0.5).abs() < 1e-12));
        assert!((el.current_time() - 256.0 / cfg.sample_rate).abs() < 1e-12);
    }

    #[test]
    fn test_closed_context_is_skipped() {
        let cfg = config();
        let ctx = AudioContext::new(&cfg);
        ctx.close().unwrap();
        let mut driver = RenderDriver::new(&cfg);
        driver.add_context(&ctx);
        let mut out = vec![1.0; 128];
        assert_eq!(driver.render(None, &mut out), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
