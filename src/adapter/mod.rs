//! Model adapter layer
//!
//! Adapters wrap one model instance each and are the only way the
//! integration manager talks to a model. `StandardAdapter<S>` covers the
//! built-in QSM, SOM and WEQ models; anything implementing `ModelAdapter`
//! can be registered alongside them.

pub mod knowledge;
pub mod model;
mod traits;

pub use knowledge::{
    EntanglementChannel, ExchangeOutcome, KnowledgeAgent, KnowledgeRequest, KnowledgeState,
};
pub use model::{
    AdapterStatus, ModelState, QsmAdapter, QsmState, SomAdapter, SomState, StandardAdapter,
    WeqAdapter, WeqState,
};
pub use traits::{AdapterError, ModelAdapter};
