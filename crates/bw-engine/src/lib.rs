//! bw-engine: Software audio graph
//!
//! A small node graph in the shape of a browser audio graph: a context owns
//! nodes, nodes expose parameter ports, sources wrap media elements.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌─────────────┐
//! │ MediaElement │────▶│ SourceNode   │────▶│ Gain/Biquad/ │────▶│ Destination │
//! │              │     │              │     │ Delay/...    │     │             │
//! │ - playhead   │     │ - one per    │     │ - AudioParam │     │ - render()  │
//! │ - capture    │     │   element    │     │   ports      │     │   output    │
//! └──────────────┘     └──────────────┘     └──────────────┘     └─────────────┘
//!                                              ▲        │
//!                                              └─Delay──┘  feedback only via delay
//! ```

mod context;
mod error;
mod media;
mod node;
mod param;
mod platform;

pub use context::*;
pub use error::*;
pub use media::*;
pub use node::{
    AnalyserNode, AudioNode, BiquadFilterNode, DelayNode, DestinationNode, GainNode,
    MediaElementSourceNode, MediaStreamSourceNode, NodeId, NodeKind, NodeRef, SourceNode,
};
pub use param::*;
pub use platform::*;

pub use bw_dsp::FilterKind;
