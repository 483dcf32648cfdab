use super::apply_metadata;
use crate::crds::monitoring::{Endpoint, ServiceMonitor};
use crate::crds::{AppsodyApplication, LABEL_MONITOR_ENABLED};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;

/// ServiceMonitor scraping the application Service. Endpoints without a port
/// scrape the service port.
pub fn apply_service_monitor(monitor: &mut ServiceMonitor, app: &AppsodyApplication) {
    apply_metadata(&mut monitor.metadata, app);

    let monitoring = app.spec.monitoring.clone().unwrap_or_default();
    if let Some(labels) = monitoring.labels {
        monitor
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels);
    }

    let mut selector = app.selector_labels();
    selector.insert(LABEL_MONITOR_ENABLED.to_string(), "true".to_string());
    monitor.spec.selector = LabelSelector {
        match_labels: Some(selector),
        ..Default::default()
    };

    let mut endpoints = monitoring.endpoints.unwrap_or_default();
    if endpoints.is_empty() {
        endpoints.push(Endpoint::default());
    }
    for endpoint in endpoints.iter_mut() {
        if endpoint.port.is_none() && endpoint.target_port.is_none() {
            endpoint.port = Some(app.service_port_name());
        }
    }
    monitor.spec.endpoints = endpoints;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crds::{AppsodyApplicationSpec, MonitoringSpec, LABEL_INSTANCE};
    use crate::resources::fixtures::application;

    #[test]
    fn test_service_monitor_defaults_endpoint() {
        let app = application(AppsodyApplicationSpec {
            monitoring: Some(MonitoringSpec {
                labels: Some(BTreeMap::from([("k8s-app".to_string(), "frontend".to_string())])),
                endpoints: None,
            }),
            ..Default::default()
        });
        let mut monitor = ServiceMonitor::default();
        apply_service_monitor(&mut monitor, &app);

        let selector = monitor.spec.selector.match_labels.clone().unwrap();
        assert_eq!(selector.get(LABEL_INSTANCE).map(String::as_str), Some("frontend"));
        assert_eq!(selector.get(LABEL_MONITOR_ENABLED).map(String::as_str), Some("true"));
        assert_eq!(monitor.spec.endpoints.len(), 1);
        assert_eq!(monitor.spec.endpoints[0].port.as_deref(), Some("8080-tcp"));
        assert!(monitor.metadata.labels.unwrap().contains_key("k8s-app"));
    }

    #[test]
    fn test_service_monitor_keeps_explicit_endpoints() {
        let app = application(AppsodyApplicationSpec {
            monitoring: Some(MonitoringSpec {
                labels: None,
                endpoints: Some(vec![
                    Endpoint {
                        path: Some("/metrics".to_string()),
                        interval: Some("30s".to_string()),
                        ..Default::default()
                    },
                    Endpoint {
                        port: Some("admin".to_string()),
                        ..Default::default()
                    },
                ]),
            }),
            ..Default::default()
        });
        let mut monitor = ServiceMonitor::default();
        apply_service_monitor(&mut monitor, &app);

        let endpoints = &monitor.spec.endpoints;
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].port.as_deref(), Some("8080-tcp"));
        assert_eq!(endpoints[0].path.as_deref(), Some("/metrics"));
        assert_eq!(endpoints[1].port.as_deref(), Some("admin"));
    }
}
