//! Manager behaviour against a scripted platform that records every call.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use hearth_sw::{
    FetchError, LifecycleState, PendingRegistration, RegisterConfig, RegisterOutcome,
    Registration, RegistrationId, ScriptFetcher, ScriptProbe, ServiceWorkerError,
    ServiceWorkerManager, ServiceWorkerPlatform, ServiceWorkerState, WorkerEvent, WorkerTarget,
};
use http::StatusCode;
use tokio::sync::mpsc;
use url::{Origin, Url};

struct ScriptedPlatform {
    supported: bool,
    page: Url,
    controller: bool,
    existing: RefCell<Option<Registration>>,
    events: Vec<WorkerEvent>,
    calls: RefCell<Vec<&'static str>>,
}

impl ScriptedPlatform {
    fn new(page: &str) -> Self {
        Self {
            supported: true,
            page: Url::parse(page).unwrap(),
            controller: false,
            existing: RefCell::new(None),
            events: vec![
                WorkerEvent::UpdateFound,
                WorkerEvent::StateChange(ServiceWorkerState::Installing),
                WorkerEvent::StateChange(ServiceWorkerState::Installed),
            ],
            calls: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn handle(&self, script_url: &Url, scope: &Url) -> Registration {
        Registration {
            id: RegistrationId::new(),
            scope: scope.clone(),
            script_url: script_url.clone(),
        }
    }
}

impl ServiceWorkerPlatform for ScriptedPlatform {
    fn is_supported(&self) -> bool {
        self.record("is_supported");
        self.supported
    }

    fn hostname(&self) -> String {
        self.page.host_str().unwrap_or_default().to_string()
    }

    fn origin(&self) -> Origin {
        self.page.origin()
    }

    async fn wait_for_load(&self) {
        self.record("wait_for_load");
    }

    async fn register(
        &self,
        script_url: &Url,
        scope: &Url,
    ) -> Result<PendingRegistration, ServiceWorkerError> {
        self.record("register");
        let registration = self.handle(script_url, scope);
        *self.existing.borrow_mut() = Some(registration.clone());

        let (tx, events) = mpsc::unbounded_channel();
        for event in &self.events {
            tx.send(event.clone()).unwrap();
        }
        Ok(PendingRegistration {
            registration,
            events,
        })
    }

    async fn get_registration(&self, _url: &Url) -> Option<Registration> {
        self.record("get_registration");
        self.existing.borrow().clone()
    }

    async fn unregister(&self, registration: &Registration) -> Result<bool, ServiceWorkerError> {
        self.record("unregister");
        let mut existing = self.existing.borrow_mut();
        if existing.as_ref().map(|r| r.id) == Some(registration.id) {
            *existing = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn ready(&self, _url: &Url) -> Option<Registration> {
        self.existing.borrow().clone()
    }

    fn has_controller(&self) -> bool {
        self.record("has_controller");
        self.controller
    }

    fn reload(&self) {
        self.record("reload");
    }
}

struct CountingFetcher {
    probe: Result<ScriptProbe, FetchError>,
    fetches: Cell<u32>,
}

impl CountingFetcher {
    fn responding(status: StatusCode, content_type: Option<&str>) -> Self {
        Self {
            probe: Ok(ScriptProbe {
                status,
                content_type: content_type.map(str::to_string),
            }),
            fetches: Cell::new(0),
        }
    }

    fn script() -> Self {
        Self::responding(StatusCode::OK, Some("application/javascript"))
    }
}

impl ScriptFetcher for CountingFetcher {
    async fn fetch_script(&self, _url: &Url) -> Result<ScriptProbe, FetchError> {
        self.fetches.set(self.fetches.get() + 1);
        self.probe.clone()
    }
}

fn target(page: &str) -> WorkerTarget {
    let public_url = Url::parse(page).unwrap();
    WorkerTarget {
        script_url: public_url.join("service-worker.js").unwrap(),
        scope: public_url.clone(),
        public_url,
    }
}

fn counting_config(success: &Rc<Cell<u32>>, update: &Rc<Cell<u32>>) -> RegisterConfig {
    let success = Rc::clone(success);
    let update = Rc::clone(update);
    RegisterConfig::new()
        .on_success(move |_| success.set(success.get() + 1))
        .on_update(move |_| update.set(update.get() + 1))
}

#[tokio::test]
async fn unsupported_platform_touches_nothing() {
    let page = "https://example.com/";
    let platform = Arc::new(ScriptedPlatform {
        supported: false,
        ..ScriptedPlatform::new(page)
    });
    let fetcher = Arc::new(CountingFetcher::script());
    let manager = ServiceWorkerManager::new(Arc::clone(&platform), Arc::clone(&fetcher), target(page));
    let (success, update) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));

    let report = manager.register(counting_config(&success, &update)).await;

    assert_eq!(report.outcome, RegisterOutcome::Unsupported);
    assert_eq!(platform.calls(), vec!["is_supported"]);
    assert_eq!(fetcher.fetches.get(), 0);
    assert_eq!((success.get(), update.get()), (0, 0));
}

#[tokio::test]
async fn deployed_registers_without_validation() {
    let page = "https://example.com/";
    let platform = Arc::new(ScriptedPlatform::new(page));
    let fetcher = Arc::new(CountingFetcher::script());
    let manager = ServiceWorkerManager::new(Arc::clone(&platform), Arc::clone(&fetcher), target(page));

    let report = manager.register(RegisterConfig::new()).await;

    assert_eq!(fetcher.fetches.get(), 0);
    assert_eq!(
        platform.calls(),
        vec!["is_supported", "wait_for_load", "register", "has_controller"]
    );
    assert_eq!(report.state(), LifecycleState::Installed);
}

#[tokio::test]
async fn local_not_found_unregisters_then_reloads_once() {
    let page = "http://localhost:3000/";
    let platform = Arc::new(ScriptedPlatform::new(page));
    let stale = Registration {
        id: RegistrationId::new(),
        scope: Url::parse(page).unwrap(),
        script_url: Url::parse("http://localhost:3000/old-worker.js").unwrap(),
    };
    *platform.existing.borrow_mut() = Some(stale);

    let fetcher = Arc::new(CountingFetcher::responding(StatusCode::NOT_FOUND, None));
    let manager = ServiceWorkerManager::new(Arc::clone(&platform), Arc::clone(&fetcher), target(page));
    let (success, update) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));

    let report = manager.register(counting_config(&success, &update)).await;

    assert_eq!(report.outcome, RegisterOutcome::Reloaded);
    assert_eq!(fetcher.fetches.get(), 1);
    let calls = platform.calls();
    let unregister_at = calls.iter().position(|c| *c == "unregister").unwrap();
    let reload_at = calls.iter().position(|c| *c == "reload").unwrap();
    assert!(unregister_at < reload_at);
    assert_eq!(calls.iter().filter(|c| **c == "reload").count(), 1);
    assert!(!calls.contains(&"register"));
    assert_eq!((success.get(), update.get()), (0, 0));
}

#[tokio::test]
async fn prior_controller_means_update_only() {
    let page = "https://example.com/";
    let platform = Arc::new(ScriptedPlatform {
        controller: true,
        ..ScriptedPlatform::new(page)
    });
    let manager = ServiceWorkerManager::new(
        Arc::clone(&platform),
        Arc::new(CountingFetcher::script()),
        target(page),
    );
    let (success, update) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));

    let report = manager.register(counting_config(&success, &update)).await;

    assert_eq!(report.state(), LifecycleState::UpdateAvailable);
    assert_eq!((success.get(), update.get()), (0, 1));
    assert!(!platform.calls().contains(&"reload"));
}

#[tokio::test]
async fn platform_error_event_fails_without_callbacks() {
    let page = "https://example.com/";
    let platform = Arc::new(ScriptedPlatform {
        events: vec![
            WorkerEvent::UpdateFound,
            WorkerEvent::Error("quota exceeded".to_string()),
            WorkerEvent::StateChange(ServiceWorkerState::Installed),
        ],
        ..ScriptedPlatform::new(page)
    });
    let manager = ServiceWorkerManager::new(
        Arc::clone(&platform),
        Arc::new(CountingFetcher::script()),
        target(page),
    );
    let (success, update) = (Rc::new(Cell::new(0)), Rc::new(Cell::new(0)));

    let report = manager.register(counting_config(&success, &update)).await;

    assert_eq!(report.state(), LifecycleState::Failed);
    assert_eq!((success.get(), update.get()), (0, 0));
}

#[tokio::test]
async fn unregister_without_registration_is_noop() {
    let page = "https://example.com/";
    let platform = Arc::new(ScriptedPlatform::new(page));
    let manager = ServiceWorkerManager::new(
        Arc::clone(&platform),
        Arc::new(CountingFetcher::script()),
        target(page),
    );

    assert!(!manager.unregister().await);
    assert!(!manager.unregister().await);
    assert!(!platform.calls().contains(&"unregister"));
}
