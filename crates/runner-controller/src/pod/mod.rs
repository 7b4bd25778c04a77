//! Runner pod helpers

pub mod annotations;
pub mod status;

pub use annotations::{
    get_annotation, set_annotation_if_absent, AnnotationWrite, KubePodPatcher, PodPatcher,
    UNREGISTRATION_COMPLETE_TIMESTAMP, UNREGISTRATION_START_TIMESTAMP,
};
pub use status::runner_pod_or_container_is_stopped;
