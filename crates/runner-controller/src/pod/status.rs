use k8s_openapi::api::core::v1::Pod;

/// Whether the runner has stopped on its own with a successful status.
///
/// An ephemeral runner whose container exited with 0 has already
/// unregistered itself, so a missing registration is expected.
#[must_use]
pub fn runner_pod_or_container_is_stopped(pod: &Pod, runner_container: &str) -> bool {
    let Some(status) = pod.status.as_ref() else {
        return false;
    };

    // e.g. docker-in-runner pods complete as a whole once the job is done
    if status.phase.as_deref() == Some("Succeeded") {
        return true;
    }

    status
        .container_statuses
        .iter()
        .flatten()
        .filter(|container| container.name == runner_container)
        .filter_map(|container| container.state.as_ref()?.terminated.as_ref())
        .any(|terminated| terminated.exit_code == 0)
}
