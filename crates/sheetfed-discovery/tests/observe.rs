use std::sync::{Arc, Mutex};

use sheetfed_core::config::DiscoveryConfig;
use sheetfed_core::{ServiceEndpoint, ServiceName};
use sheetfed_discovery::{Discovery, DiscoveryListener, EndpointRegistry, Observation};

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<ServiceEndpoint>>,
}

impl DiscoveryListener for Recorder {
    fn on_registered(&self, endpoint: &ServiceEndpoint) {
        self.seen.lock().unwrap().push(endpoint.clone());
    }
}

fn discovery_for(domain: &str, service: ServiceName) -> (Discovery, Arc<Recorder>) {
    let local = ServiceEndpoint::new(domain, service, format!("http://{domain}.local:8080/rest"));
    let discovery = Discovery::new(local, DiscoveryConfig::default(), EndpointRegistry::new());
    let recorder = Arc::new(Recorder::default());
    assert!(discovery.set_listener(recorder.clone()));
    (discovery, recorder)
}

#[test]
fn self_announcements_are_never_registered() {
    let (discovery, recorder) = discovery_for("alpha", ServiceName::Users);

    let observed = discovery.observe(b"alpha:users\thttp://elsewhere:9090/soap");

    assert_eq!(observed, Observation::SelfAnnouncement);
    assert!(discovery.known_uris_of("alpha", ServiceName::Users).is_empty());
    assert!(recorder.seen.lock().unwrap().is_empty());
}

#[test]
fn other_services_of_the_local_domain_are_registered() {
    let (discovery, _) = discovery_for("alpha", ServiceName::Users);

    let observed = discovery.observe(b"alpha:sheets\thttp://alpha.local:8081/soap");

    assert!(matches!(observed, Observation::Registered(_)));
    assert_eq!(
        discovery.known_uris_of("alpha", ServiceName::Spreadsheets),
        vec!["http://alpha.local:8081/soap".to_owned()]
    );
}

#[test]
fn first_valid_announcement_wins_and_notifies_once() {
    let (discovery, recorder) = discovery_for("alpha", ServiceName::Spreadsheets);

    assert!(matches!(
        discovery.observe(b"beta:users\tgarbage\textra"),
        Observation::Malformed(_)
    ));
    assert!(matches!(
        discovery.observe(b"beta:users\thttp://beta.local:8080/rest"),
        Observation::Registered(_)
    ));
    assert_eq!(
        discovery.observe(b"beta:users\thttp://beta.other:8080/soap"),
        Observation::AlreadyKnown
    );

    assert_eq!(
        discovery.known_uris_of("beta", ServiceName::Users),
        vec!["http://beta.local:8080/rest".to_owned()]
    );
    let seen = recorder.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].uri, "http://beta.local:8080/rest");
}

#[test]
fn listener_can_only_be_installed_once() {
    let (discovery, _) = discovery_for("alpha", ServiceName::Users);
    assert!(!discovery.set_listener(Arc::new(Recorder::default())));
}
