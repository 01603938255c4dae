//! An interpreter for HVML documents.
//!
//! The umbrella crate: parse a document, run it on a heap, hand back the
//! outcome. Hosts that need more control (several coroutines, their own
//! renderer transport, request plumbing) use `hvml-core` directly.
//!
//! ```no_run
//! let outcome = hvml::run_document("<hvml/>").unwrap();
//! assert!(outcome.is_clean());
//! ```

use hvml_core::prelude::*;
use hvml_renderer::{RendererRequest, RendererTransport};
use std::rc::Rc;
use std::time::Duration;

pub mod prelude {
    pub use hvml_core::prelude::*;
    pub use hvml_executors::{make_executor, Executor};
    pub use hvml_renderer::{
        ChannelTransport, Operation, RecordingTransport, RendererLink, RendererRequest,
        RendererTransport,
    };
    pub use hvml_vdom::{parse_document, parse_expression, VDocument};

    pub use crate::{run_document, run_document_recording, run_document_with, RunConfig};
}

/// Knobs for a run. The defaults match the embedded test renderer.
pub struct RunConfig {
    /// Transport carrying renderer messages.
    pub transport: Box<dyn RendererTransport>,
    /// Timeout for each synchronous renderer call.
    pub renderer_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            transport: Box::new(RecordingTransport::new()),
            renderer_timeout: Duration::from_secs(5),
        }
    }
}

/// Parse `source` and run it to completion with a silent in-process
/// renderer.
pub fn run_document(source: &str) -> Result<RunOutcome, HvmlError> {
    run_document_with(source, RunConfig::default())
}

/// Parse `source` and run it with the given configuration.
pub fn run_document_with(source: &str, config: RunConfig) -> Result<RunOutcome, HvmlError> {
    let doc = parse_document(source)?;
    let link = RendererLink::new(config.transport).with_timeout(config.renderer_timeout);
    let mut heap = Heap::new(link);
    heap.schedule_document(Rc::new(doc))?;
    Ok(heap.run())
}

/// Run with a recording renderer and return the captured message
/// sequence alongside the outcome.
pub fn run_document_recording(
    source: &str,
) -> Result<(RunOutcome, Vec<RendererRequest>), HvmlError> {
    let transport = RecordingTransport::new();
    let outcome = run_document_with(
        source,
        RunConfig {
            transport: Box::new(transport.clone()),
            renderer_timeout: Duration::from_secs(5),
        },
    )?;
    Ok((outcome, transport.requests()))
}
