//! Common utilities for Switchyard integration tests.
#![allow(dead_code)]

use ahash::AHashMap as HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use switchyard::prelude::*;
use switchyard::types::bridge::BridgeAttrs;
use switchyard::types::channel::ChannelAttrs;
use switchyard::types::controller::ControllerAttrs;
use switchyard::types::interface::InterfaceAttrs;
use switchyard::types::port::PortAttrs;

/// One collaborator call: (operation, type, entity name).
pub type Call = (String, String, String);

/// Calls of every mock, in the order they happened.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<Call>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// `"op type name"` strings, handy for assertions.
    pub fn lines(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|(op, type_name, name)| format!("{} {} {}", op, type_name, name))
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

// --- MockCollaborator ---

/// A mock implementation of the `Collaborator` trait for testing purposes.
/// Records every call and fails the ones it was told to.
pub struct MockCollaborator<A> {
    type_name: &'static str,
    log: Arc<CallLog>,
    /// (op, name) -> remaining failures.
    failures: Mutex<HashMap<(String, String), usize>>,
    _attrs: PhantomData<fn(&A)>,
}

impl<A> MockCollaborator<A> {
    pub fn new(type_name: &'static str, log: Arc<CallLog>) -> Self {
        Self {
            type_name,
            log,
            failures: Mutex::new(HashMap::new()),
            _attrs: PhantomData,
        }
    }

    /// Makes the next `times` calls of `op` on `name` fail.
    pub fn fail(&self, op: &str, name: &str, times: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert((op.to_string(), name.to_string()), times);
    }

    pub fn fail_always(&self, op: &str, name: &str) {
        self.fail(op, name, usize::MAX);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    fn record(&self, op: &str, name: &str) -> Result<()> {
        self.log.calls.lock().unwrap().push((
            op.to_string(),
            self.type_name.to_string(),
            name.to_string(),
        ));
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&(op.to_string(), name.to_string())) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DatastoreError::collaborator("", format!("{} refused", op)));
            }
        }
        Ok(())
    }
}

impl<A> Collaborator<A> for MockCollaborator<A> {
    fn create(&self, name: &str, _attrs: &A) -> Result<()> {
        self.record("create", name)
    }

    fn destroy(&self, name: &str, _attrs: &A) -> Result<()> {
        self.record("destroy", name)
    }

    fn start(&self, name: &str, _attrs: &A) -> Result<()> {
        self.record("start", name)
    }

    fn stop(&self, name: &str, _attrs: &A) -> Result<()> {
        self.record("stop", name)
    }
}

/// The mocks wired into a test datastore.
pub struct Mocks {
    pub log: Arc<CallLog>,
    pub interface: Arc<MockCollaborator<InterfaceAttrs>>,
    pub port: Arc<MockCollaborator<PortAttrs>>,
    pub channel: Arc<MockCollaborator<ChannelAttrs>>,
    pub controller: Arc<MockCollaborator<ControllerAttrs>>,
    pub bridge: Arc<MockCollaborator<BridgeAttrs>>,
}

// --- Helper Functions ---

/// Helper function to create a datastore whose collaborators are mocks.
pub fn setup_datastore() -> (Arc<Datastore>, Mocks) {
    setup_datastore_with(DatastoreConfig::default())
}

pub fn setup_datastore_with(config: DatastoreConfig) -> (Arc<Datastore>, Mocks) {
    let log = Arc::new(CallLog::default());
    let mocks = Mocks {
        interface: Arc::new(MockCollaborator::new("interface", log.clone())),
        port: Arc::new(MockCollaborator::new("port", log.clone())),
        channel: Arc::new(MockCollaborator::new("channel", log.clone())),
        controller: Arc::new(MockCollaborator::new("controller", log.clone())),
        bridge: Arc::new(MockCollaborator::new("bridge", log.clone())),
        log,
    };
    let collaborators = Collaborators {
        interface: mocks.interface.clone(),
        port: mocks.port.clone(),
        channel: mocks.channel.clone(),
        controller: mocks.controller.clone(),
        bridge: mocks.bridge.clone(),
    };
    (Arc::new(Datastore::new(config, collaborators)), mocks)
}

/// Creates `interface`, `port` (bound to it), `channel`, `controller` (on the
/// channel) and `bridge` (using both) in the current driver state.
pub fn create_topology(ds: &Datastore, suffix: &str) -> Result<()> {
    use switchyard::types::controller::ControllerRole;
    use switchyard::types::interface::InterfaceType;

    let interface = InterfaceAttrs {
        interface_type: InterfaceType::EthernetRawsock,
        device: format!("eth{}", suffix),
        ..Default::default()
    };
    let if_name = ds.create(ds.interfaces(), &format!("if{}", suffix), interface)?;
    let port_name = ds.create(
        ds.ports(),
        &format!("p{}", suffix),
        PortAttrs { interface: if_name },
    )?;
    let ch_name = ds.create(ds.channels(), &format!("ch{}", suffix), ChannelAttrs::default())?;
    let c_name = ds.create(
        ds.controllers(),
        &format!("c{}", suffix),
        ControllerAttrs::new(ch_name, ControllerRole::Master),
    )?;
    let mut bridge = BridgeAttrs::new(1);
    bridge.add_controller(&c_name)?;
    bridge.add_port(&port_name, 1)?;
    ds.create(ds.bridges(), &format!("br{}", suffix), bridge)?;
    Ok(())
}
