use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ahash::AHashSet as HashSet;
use serde::{Deserialize, Serialize};

use crate::collaborator::Collaborator;
use crate::engine::EntityTable;
use crate::errors::{DatastoreError, Result};
use crate::namespace;
use crate::phase::Phase;
use crate::registration::EntityKind;
use crate::snapshot::{next_arg, parse_arg, NameList, OptionArgs, Snapshot};
use crate::types::controller::ControllerKind;
use crate::types::port::PortKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailMode {
    #[default]
    Unknown,
    Secure,
    Standalone,
}

impl fmt::Display for FailMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailMode::Unknown => "unknown",
            FailMode::Secure => "secure",
            FailMode::Standalone => "standalone",
        })
    }
}

impl FromStr for FailMode {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(FailMode::Unknown),
            "secure" => Ok(FailMode::Secure),
            "standalone" => Ok(FailMode::Standalone),
            other => Err(DatastoreError::InvalidArgs(format!("fail-mode = {}", other))),
        }
    }
}

/// A port attached to a bridge under an OpenFlow port number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgePort {
    pub name: String,
    pub number: u32,
}

/// Attributes of a bridge (an OpenFlow datapath).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeAttrs {
    pub dpid: u64,
    pub fail_mode: FailMode,
    pub controllers: NameList,
    pub ports: Vec<BridgePort>,
}

impl BridgeAttrs {
    pub fn new(dpid: u64) -> Self {
        Self {
            dpid,
            fail_mode: FailMode::Secure,
            ..Default::default()
        }
    }

    pub fn add_controller(&mut self, name: &str) -> Result<()> {
        self.controllers
            .add(name)
            .map_err(|_| DatastoreError::AlreadyExists(format!("controller name = {}.", name)))
    }

    pub fn remove_controller(&mut self, name: &str) -> Result<()> {
        self.controllers
            .remove(name)
            .map_err(|_| DatastoreError::NotFound(format!("controller name = {}.", name)))
    }

    /// Attaches `name` under port `number`.
    ///
    /// # Errors
    ///
    /// * `TooShort` for port number 0.
    /// * `AlreadyExists` if the port or the number is already attached.
    pub fn add_port(&mut self, name: &str, number: u32) -> Result<()> {
        if number == 0 {
            return Err(DatastoreError::TooShort(format!(
                "port number = {} (port name = {}).",
                number, name
            )));
        }
        if self.ports.iter().any(|p| p.name == name) {
            return Err(DatastoreError::AlreadyExists(format!("port name = {}.", name)));
        }
        if self.ports.iter().any(|p| p.number == number) {
            return Err(DatastoreError::AlreadyExists(format!(
                "port number = {}.",
                number
            )));
        }
        self.ports.push(BridgePort {
            name: name.to_string(),
            number,
        });
        Ok(())
    }

    pub fn remove_port(&mut self, name: &str) -> Result<()> {
        let before = self.ports.len();
        self.ports.retain(|p| p.name != name);
        if self.ports.len() == before {
            return Err(DatastoreError::NotFound(format!("port name = {}.", name)));
        }
        Ok(())
    }

    fn check_port_numbers(&self) -> Result<()> {
        let mut numbers = HashSet::new();
        for port in &self.ports {
            if port.number == 0 {
                return Err(DatastoreError::TooShort(format!(
                    "port number = 0 (port name = {}).",
                    port.name
                )));
            }
            if !numbers.insert(port.number) {
                return Err(DatastoreError::AlreadyExists(format!(
                    "port number = {}.",
                    port.number
                )));
            }
        }
        Ok(())
    }
}

impl Snapshot for BridgeAttrs {
    fn with_namespace(&self, ns: &str) -> Result<Self> {
        let ports = self
            .ports
            .iter()
            .map(|p| {
                Ok(BridgePort {
                    name: namespace::replace_namespace(&p.name, ns)?,
                    number: p.number,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            dpid: self.dpid,
            fail_mode: self.fail_mode,
            controllers: self.controllers.with_namespace(ns)?,
            ports,
        })
    }

    fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut options = vec![
            ("-dpid", vec![self.dpid.to_string()]),
            ("-fail-mode", vec![self.fail_mode.to_string()]),
        ];
        for controller in &self.controllers {
            options.push(("-controller", vec![controller.clone()]));
        }
        for port in &self.ports {
            options.push(("-port", vec![port.name.clone(), port.number.to_string()]));
        }
        options
    }

    fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()> {
        match option {
            "-dpid" => self.dpid = parse_arg(option, args)?,
            "-fail-mode" => self.fail_mode = next_arg(option, args)?.parse()?,
            "-controller" => self.add_controller(&next_arg(option, args)?)?,
            "-port" => {
                let name = next_arg(option, args)?;
                let number = parse_arg(option, args)?;
                self.add_port(&name, number)?;
            }
            other => {
                return Err(DatastoreError::InvalidArgs(format!("opt = {}", other)));
            }
        }
        Ok(())
    }
}

/// A bridge claims the controllers and ports it names. It is never claimed
/// itself, so it can be enabled without a user.
pub struct BridgeKind {
    collaborator: Arc<dyn Collaborator<BridgeAttrs>>,
    controllers: Arc<EntityTable<ControllerKind>>,
    ports: Arc<EntityTable<PortKind>>,
}

impl BridgeKind {
    pub fn new(
        collaborator: Arc<dyn Collaborator<BridgeAttrs>>,
        controllers: Arc<EntityTable<ControllerKind>>,
        ports: Arc<EntityTable<PortKind>>,
    ) -> Self {
        Self {
            collaborator,
            controllers,
            ports,
        }
    }
}

impl EntityKind for BridgeKind {
    type Attrs = BridgeAttrs;

    const TYPE_NAME: &'static str = "bridge";

    fn collaborator(&self) -> &dyn Collaborator<BridgeAttrs> {
        self.collaborator.as_ref()
    }

    fn requires_usage_to_enable(&self) -> bool {
        false
    }

    fn validate(
        &self,
        _name: &str,
        attrs: &BridgeAttrs,
        previous: Option<&BridgeAttrs>,
    ) -> Result<()> {
        for controller in &attrs.controllers {
            if previous.is_some_and(|p| p.controllers.contains(controller)) {
                continue;
            }
            if !self.controllers.exists(controller) {
                return Err(DatastoreError::NotFound(format!(
                    "controller name = {}.",
                    controller
                )));
            }
            if self.controllers.is_used(controller)? {
                return Err(DatastoreError::NotOperational(format!(
                    "controller name = {}: is used.",
                    controller
                )));
            }
        }
        attrs.check_port_numbers()?;
        for port in &attrs.ports {
            if previous.is_some_and(|p| p.ports.iter().any(|q| q.name == port.name)) {
                continue;
            }
            if !self.ports.exists(&port.name) {
                return Err(DatastoreError::NotFound(format!(
                    "port name = {}.",
                    port.name
                )));
            }
            if self.ports.is_used(&port.name)? {
                return Err(DatastoreError::NotOperational(format!(
                    "port name = {}: is used.",
                    port.name
                )));
            }
        }
        Ok(())
    }

    fn set_dependents_used(&self, attrs: &BridgeAttrs, used: bool) -> Result<()> {
        for controller in &attrs.controllers {
            self.controllers.claim(controller, used)?;
        }
        for port in &attrs.ports {
            self.ports.claim(&port.name, used)?;
        }
        Ok(())
    }

    fn update_dependents(&self, phase: Phase, attrs: &BridgeAttrs) -> Result<()> {
        for controller in &attrs.controllers {
            self.controllers.update_propagation(phase, controller)?;
        }
        for port in &attrs.ports {
            self.ports.update_propagation(phase, &port.name)?;
        }
        Ok(())
    }

    fn enable_dependents(&self, phase: Phase, attrs: &BridgeAttrs) -> Result<()> {
        for controller in &attrs.controllers {
            self.controllers.enable_propagation(phase, controller, true)?;
        }
        for port in &attrs.ports {
            self.ports.enable_propagation(phase, &port.name, true)?;
        }
        Ok(())
    }

    fn disable_dependents(&self, phase: Phase, attrs: &BridgeAttrs) -> Result<()> {
        for controller in &attrs.controllers {
            self.controllers.enable_propagation(phase, controller, false)?;
        }
        for port in &attrs.ports {
            self.ports.enable_propagation(phase, &port.name, false)?;
        }
        Ok(())
    }
}
