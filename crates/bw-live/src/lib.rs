//! bw-live: Live metering and effects components
//!
//! Two independent components hang off one playback surface:
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │  PlaybackSurface     │
//!                 │  - media element     │
//!                 │  - context/analyser  │
//!                 └──────────┬───────────┘
//!            poll every 200ms│      ready / play
//!          ┌─────────────────┴───┐   ┌────────────────────┐
//!          │ MeterPanel          │   │ LiveEffects        │
//!          │ - AttachEngine      │   │ - EffectsChain     │
//!          │ - Meter (per frame) │   │   5×EQ → gain →    │
//!          │ - spectrum + VU     │   │   delay ⟲ feedback │
//!          └─────────────────────┘   └────────────────────┘
//! ```
//!
//! Everything runs on a single logical thread driven by [`Scheduler`]:
//! polling timers and display frames are callbacks, never blocking loops.
//! Audio is pulled by [`RenderDriver`].

pub mod attach;
pub mod driver;
pub mod effects;
pub mod error;
pub mod handle;
pub mod meter;
pub mod panel;
pub mod scheduler;
pub mod surface;

pub use attach::{
    AttachDeps, AttachEngine, AttachEvent, AttachState, AttachStep, Attachment, TapOrigin,
};
pub use driver::RenderDriver;
pub use effects::{
    BuildOutcome, DELAY_BUFFER_SECONDS, EQ_BANDS, EffectsChain, Endpoint, EqBand, LiveEffects,
    SkipReason, Stage, TOPOLOGY,
};
pub use error::{LiveError, LiveResult};
pub use handle::{AudioGraphHandle, ContextOwnership};
pub use meter::{Meter, MeterSnapshot, MeterStats, MeterStatus};
pub use panel::MeterPanel;
pub use scheduler::{Scheduler, TaskId};
pub use surface::{
    MediaLocator, PlaybackSurface, SoftwareSurface, SurfaceBackend, SurfaceEvent, SurfaceSlot,
    locate_media, locate_on_surface,
};
