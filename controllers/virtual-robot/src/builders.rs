//! Desired state of the objects generated for a VirtualRobot.
//!
//! Every builder is a pure function of the VirtualRobot: the same input
//! always yields the same Pod, Service and Ingress. Owner references are not
//! set here, see `ownership.rs`.

use crate::error::ControllerError;
use crds::VirtualRobot;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Image run by every robot Pod
pub const ROBOT_IMAGE: &str = "ludusrusso/vbot:v2";
/// Container name inside the robot Pod
pub const CONTAINER_NAME: &str = "bot";
/// Websocket port exposed by the robot, the Service and the Ingress backend
pub const ROBOT_PORT: i32 = 9090;
/// Name of [`ROBOT_PORT`] on the container and the Service
pub const ROBOT_PORT_NAME: &str = "ws";
/// Label key binding the Pod to its Service; the value is the VirtualRobot uid
pub const ROBOT_LABEL: &str = "robot";

const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
const CLUSTER_ISSUER_ANNOTATION: &str = "cert-manager.io/cluster-issuer";
const ACME_CHALLENGE_ANNOTATION: &str = "cert-manager.io/acme-challenge-type";

/// Ingress settings that come from controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSettings {
    /// Value of the `kubernetes.io/ingress.class` annotation
    pub ingress_class: String,
    /// cert-manager ClusterIssuer issuing the TLS certificate
    pub cluster_issuer: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            ingress_class: "traefik".to_string(),
            cluster_issuer: "letsencrypt-prod".to_string(),
        }
    }
}

/// The three generated objects plus the host they expose
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub workload: Pod,
    pub endpoint: Service,
    pub route: Ingress,
    pub hostname: String,
}

/// Longest host name accepted in an Ingress rule
const MAX_HOSTNAME_LEN: usize = 253;

/// RFC 1123 label: lowercase alphanumerics and '-', alphanumeric at both ends, max 63
fn is_dns1123_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    !bytes.is_empty()
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
}

/// RFC 1035 label: an RFC 1123 label starting with a letter (Service names)
fn is_dns1035_label(value: &str) -> bool {
    is_dns1123_label(value) && value.as_bytes().first().is_some_and(u8::is_ascii_lowercase)
}

/// RFC 1123 subdomain: dot-separated RFC 1123 labels, max 253
fn is_dns1123_subdomain(value: &str) -> bool {
    value.len() <= MAX_HOSTNAME_LEN && value.split('.').all(is_dns1123_label)
}

fn invalid(robot: &VirtualRobot, reason: String) -> ControllerError {
    ControllerError::Validation(format!("{}: {}", robot.key(), reason))
}

/// Reject VirtualRobots whose spec cannot name or address the dependents.
///
/// `robotName` names a Service, so it must be an RFC 1035 label; the host
/// built from it must be a valid RFC 1123 subdomain.
pub fn validate(robot: &VirtualRobot) -> Result<(), ControllerError> {
    let robot_name = robot.spec.robot_name.as_str();
    let base_domain = robot.spec.base_domain.as_str();
    if robot_name.is_empty() {
        return Err(invalid(robot, "spec.robotName must not be empty".to_string()));
    }
    if !is_dns1035_label(robot_name) {
        return Err(invalid(
            robot,
            format!("spec.robotName {robot_name:?} is not a valid DNS-1035 label"),
        ));
    }
    if base_domain.is_empty() {
        return Err(invalid(robot, "spec.baseDomain must not be empty".to_string()));
    }
    if !is_dns1123_subdomain(base_domain) {
        return Err(invalid(
            robot,
            format!("spec.baseDomain {base_domain:?} is not a valid DNS-1123 subdomain"),
        ));
    }
    let hostname = build_hostname(robot);
    if hostname.len() > MAX_HOSTNAME_LEN {
        return Err(invalid(
            robot,
            format!("host {hostname:?} is longer than {MAX_HOSTNAME_LEN} characters"),
        ));
    }
    if robot.namespace().is_none() {
        return Err(invalid(robot, "VirtualRobot has no namespace".to_string()));
    }
    Ok(())
}

/// Name shared by all dependents.
///
/// This is `spec.robotName` verbatim: two VirtualRobots in one namespace
/// with the same robotName write to the same Pod, Service and Ingress.
pub fn build_name(robot: &VirtualRobot) -> String {
    robot.spec.robot_name.clone()
}

/// External host, `<robotName>.<baseDomain>`
pub fn build_hostname(robot: &VirtualRobot) -> String {
    format!("{}.{}", robot.spec.robot_name, robot.spec.base_domain)
}

fn selector_labels(robot: &VirtualRobot) -> BTreeMap<String, String> {
    BTreeMap::from([(
        ROBOT_LABEL.to_string(),
        robot.uid().unwrap_or_default(),
    )])
}

fn dependent_meta(robot: &VirtualRobot) -> ObjectMeta {
    ObjectMeta {
        name: Some(build_name(robot)),
        namespace: robot.namespace(),
        ..Default::default()
    }
}

/// Robot Pod: one container exposing the websocket port over TCP
pub fn build_workload(robot: &VirtualRobot) -> Result<Pod, ControllerError> {
    validate(robot)?;
    Ok(Pod {
        metadata: ObjectMeta {
            labels: Some(selector_labels(robot)),
            ..dependent_meta(robot)
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(ROBOT_IMAGE.to_string()),
                ports: Some(vec![ContainerPort {
                    name: Some(ROBOT_PORT_NAME.to_string()),
                    container_port: ROBOT_PORT,
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    })
}

/// Service selecting the robot Pod by uid label, forwarding the websocket port
pub fn build_endpoint(robot: &VirtualRobot) -> Result<Service, ControllerError> {
    validate(robot)?;
    Ok(Service {
        metadata: dependent_meta(robot),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(robot)),
            ports: Some(vec![ServicePort {
                name: Some(ROBOT_PORT_NAME.to_string()),
                port: ROBOT_PORT,
                target_port: Some(IntOrString::Int(ROBOT_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// TLS Ingress routing `<robotName>.<baseDomain>/` to the robot Service.
///
/// The certificate is requested from cert-manager and stored in a Secret
/// named after the host.
pub fn build_route(
    robot: &VirtualRobot,
    settings: &RouteSettings,
) -> Result<(Ingress, String), ControllerError> {
    validate(robot)?;
    let name = build_name(robot);
    let host = build_hostname(robot);

    let annotations = BTreeMap::from([
        (
            INGRESS_CLASS_ANNOTATION.to_string(),
            settings.ingress_class.clone(),
        ),
        (
            CLUSTER_ISSUER_ANNOTATION.to_string(),
            settings.cluster_issuer.clone(),
        ),
        (ACME_CHALLENGE_ANNOTATION.to_string(), "http01".to_string()),
    ]);

    let ingress = Ingress {
        metadata: ObjectMeta {
            annotations: Some(annotations),
            ..dependent_meta(robot)
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name,
                                port: Some(ServiceBackendPort {
                                    number: Some(ROBOT_PORT),
                                    name: None,
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: Some(vec![IngressTLS {
                hosts: Some(vec![host.clone()]),
                secret_name: Some(host.clone()),
            }]),
            ..Default::default()
        }),
        status: None,
    };
    Ok((ingress, host))
}

/// Run all builders; fails before anything is written if the spec is invalid
pub fn build_desired_state(
    robot: &VirtualRobot,
    settings: &RouteSettings,
) -> Result<DesiredState, ControllerError> {
    let workload = build_workload(robot)?;
    let endpoint = build_endpoint(robot)?;
    let (route, hostname) = build_route(robot, settings)?;
    Ok(DesiredState {
        workload,
        endpoint,
        route,
        hostname,
    })
}
