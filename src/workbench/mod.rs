//! Observable workbench state: artifacts, actions and the editor/preview
//! slice, plus the binding that feeds it from the streaming parser.

mod binding;
mod state;
mod store;

pub use binding::WorkbenchBinding;
pub use state::{
    ActionId, ActionState, ActionStatus, ArtifactId, ArtifactState, Document, PreviewInfo,
    WorkbenchEvent, WorkbenchState, WorkbenchView,
};
pub use store::WorkbenchStore;
