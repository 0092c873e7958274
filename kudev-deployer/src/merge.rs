//! Field-selective merges of rendered objects onto live ones.
//!
//! kudev owns only a handful of fields. Everything else on a live object
//! (sidecars, annotations added by other controllers, server-assigned
//! addresses) must survive an update.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

use kudev_renderer::{LABEL_HASH, LABEL_MANAGED_BY, MANAGED_BY_VALUE};

/// Copy kudev-owned fields from `rendered` onto `live`.
///
/// Owned fields: replica count, image and env of the primary container, the
/// digest label on the Deployment, and the ownership label on the pod
/// template. A live object with no primary container takes the rendered spec
/// wholesale.
pub fn merge_deployment(live: &mut Deployment, rendered: &Deployment) {
    let Some(rendered_spec) = rendered.spec.as_ref() else {
        return;
    };

    if let Some(digest) = rendered
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(LABEL_HASH))
    {
        live.metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(LABEL_HASH.to_string(), digest.clone());
    }

    let rendered_container = rendered_spec
        .template
        .spec
        .as_ref()
        .and_then(|pod| pod.containers.first());

    let live_container = live
        .spec
        .as_mut()
        .and_then(|spec| spec.template.spec.as_mut())
        .and_then(|pod| pod.containers.first_mut());

    match (live_container, rendered_container) {
        (Some(live_container), Some(rendered_container)) => {
            live_container.image = rendered_container.image.clone();
            live_container.env = rendered_container.env.clone();
        }
        _ => {
            live.spec = Some(rendered_spec.clone());
            return;
        }
    }

    if let Some(spec) = live.spec.as_mut() {
        spec.replicas = rendered_spec.replicas;
        spec.template
            .metadata
            .get_or_insert_with(Default::default)
            .labels
            .get_or_insert_with(Default::default)
            .insert(LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string());
    }
}

/// Carry server-assigned and immutable fields from `live` onto `rendered`
/// before a replace.
///
/// The cluster IP (and its dual-stack companions) cannot change once
/// allocated; node ports are kept per port number so a replace does not
/// reallocate them. `resourceVersion` makes the replace conditional.
pub fn preserve_service_fields(rendered: &mut Service, live: &Service) {
    rendered.metadata.resource_version = live.metadata.resource_version.clone();

    let (Some(spec), Some(live_spec)) = (rendered.spec.as_mut(), live.spec.as_ref()) else {
        return;
    };
    spec.cluster_ip = live_spec.cluster_ip.clone();
    spec.cluster_ips = live_spec.cluster_ips.clone();
    spec.ip_families = live_spec.ip_families.clone();
    spec.ip_family_policy = live_spec.ip_family_policy.clone();

    if let (Some(ports), Some(live_ports)) = (spec.ports.as_mut(), live_spec.ports.as_ref()) {
        for port in ports.iter_mut().filter(|p| p.node_port.is_none()) {
            port.node_port = live_ports
                .iter()
                .find(|lp| lp.port == port.port)
                .and_then(|lp| lp.node_port);
        }
    }
}
