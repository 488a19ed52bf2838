use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collaborator::Collaborator;
use crate::engine::EntityTable;
use crate::errors::{DatastoreError, Result};
use crate::namespace;
use crate::phase::Phase;
use crate::registration::EntityKind;
use crate::snapshot::{next_arg, OptionArgs, Snapshot};
use crate::types::interface::InterfaceKind;

/// Attributes of a switch port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAttrs {
    /// Fully-qualified name of the bound interface, empty when unbound.
    pub interface: String,
}

impl Snapshot for PortAttrs {
    fn with_namespace(&self, ns: &str) -> Result<Self> {
        let interface = if self.interface.is_empty() {
            String::new()
        } else {
            namespace::replace_namespace(&self.interface, ns)?
        };
        Ok(Self { interface })
    }

    fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
        if self.interface.is_empty() {
            Vec::new()
        } else {
            vec![("-interface", vec![self.interface.clone()])]
        }
    }

    fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()> {
        match option {
            "-interface" => {
                self.interface = next_arg(option, args)?;
                Ok(())
            }
            other => Err(DatastoreError::InvalidArgs(format!("opt = {}", other))),
        }
    }
}

/// A port claims the interface it is bound to.
pub struct PortKind {
    collaborator: Arc<dyn Collaborator<PortAttrs>>,
    interfaces: Arc<EntityTable<InterfaceKind>>,
}

impl PortKind {
    pub fn new(
        collaborator: Arc<dyn Collaborator<PortAttrs>>,
        interfaces: Arc<EntityTable<InterfaceKind>>,
    ) -> Self {
        Self {
            collaborator,
            interfaces,
        }
    }

    fn interface_of(attrs: &PortAttrs) -> Option<&str> {
        (!attrs.interface.is_empty()).then_some(attrs.interface.as_str())
    }
}

impl EntityKind for PortKind {
    type Attrs = PortAttrs;

    const TYPE_NAME: &'static str = "port";

    fn collaborator(&self) -> &dyn Collaborator<PortAttrs> {
        self.collaborator.as_ref()
    }

    fn validate(&self, _name: &str, attrs: &PortAttrs, previous: Option<&PortAttrs>) -> Result<()> {
        let Some(interface) = Self::interface_of(attrs) else {
            return Ok(());
        };
        if previous.is_some_and(|p| p.interface == interface) {
            return Ok(());
        }
        if !self.interfaces.exists(interface) {
            return Err(DatastoreError::NotFound(format!(
                "interface name = {}.",
                interface
            )));
        }
        if self.interfaces.is_used(interface)? {
            return Err(DatastoreError::NotOperational(format!(
                "interface name = {}: is used.",
                interface
            )));
        }
        Ok(())
    }

    fn set_dependents_used(&self, attrs: &PortAttrs, used: bool) -> Result<()> {
        match Self::interface_of(attrs) {
            Some(interface) => self.interfaces.claim(interface, used),
            None => Ok(()),
        }
    }

    fn update_dependents(&self, phase: Phase, attrs: &PortAttrs) -> Result<()> {
        match Self::interface_of(attrs) {
            Some(interface) => self.interfaces.update_propagation(phase, interface),
            None => Ok(()),
        }
    }

    fn enable_dependents(&self, phase: Phase, attrs: &PortAttrs) -> Result<()> {
        match Self::interface_of(attrs) {
            Some(interface) => self.interfaces.enable_propagation(phase, interface, true),
            None => Ok(()),
        }
    }

    fn disable_dependents(&self, phase: Phase, attrs: &PortAttrs) -> Result<()> {
        match Self::interface_of(attrs) {
            Some(interface) => self.interfaces.enable_propagation(phase, interface, false),
            None => Ok(()),
        }
    }
}
