pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod export;
pub mod fixtures;
pub mod graph;
pub mod model;
pub mod parity;
pub mod persistence;
pub mod recipes;
pub mod renderer;
pub mod rng;
pub mod sink;
pub mod time;
pub mod transport;
pub mod voice;
pub mod wav;

pub use config::EngineConfig;
pub use diagnostics::{TelemetryGuard, init_tracing};
pub use engine::{Engine, EngineError};
pub use export::{ExportGate, ExportJob, ExportPermit};
pub use graph::{GraphBuilder, VoiceGraph};
pub use model::{
    INSTRUMENTS, Instrument, PianoNote, PianoRoll, Project, StepGrid, SynthesisKind, Volumes,
};
pub use parity::{ParityReport, generate_parity_report};
pub use persistence::{LoadNotice, LoadedProject, deserialize_project};
pub use renderer::{LiveOptions, RenderOptions};
pub use rng::NoiseRng;
pub use sink::{AudioSink, OfflineSink, RealtimeSink, RenderedBuffer};
pub use transport::{ScheduledStep, Transport, TransportState};
pub use wav::encode_wav;
