//! Run orchestration for wami flows: engines, provenance, the session state
//! machine and activation handling.

pub mod app;
pub mod flow_engine;
pub mod observer;
pub mod provenance;
pub mod resolver;
pub mod session;

pub use app::WamiApp;
pub use flow_engine::{
    default_engine_registry, DryrunEngine, EngineOutput, FlowEngine, FlowEngineRegistry,
    ImageFile, OutputImage, ProcessEngine,
};
pub use observer::{EventObserver, NullObserver, OutputDisplay, SessionObserver};
pub use provenance::{
    can_save_in_place, load, save_in_place, InputImage, SaveOutcome, SaveReport,
    SourceDescriptor, WriteHandle,
};
pub use resolver::{IntentResolver, Resolution};
pub use session::{AutoRunHandle, RunOutcome, Session, SkipReason};
