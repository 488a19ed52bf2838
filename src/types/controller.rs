use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::collaborator::Collaborator;
use crate::engine::EntityTable;
use crate::errors::{DatastoreError, Result};
use crate::namespace;
use crate::phase::Phase;
use crate::registration::EntityKind;
use crate::snapshot::{next_arg, OptionArgs, Snapshot};
use crate::types::channel::ChannelKind;

/// OpenFlow controller role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ControllerRole {
    #[default]
    Unknown,
    Master,
    Slave,
    Equal,
}

impl fmt::Display for ControllerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ControllerRole::Unknown => "unknown",
            ControllerRole::Master => "master",
            ControllerRole::Slave => "slave",
            ControllerRole::Equal => "equal",
        })
    }
}

impl FromStr for ControllerRole {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(ControllerRole::Unknown),
            "master" => Ok(ControllerRole::Master),
            "slave" => Ok(ControllerRole::Slave),
            "equal" => Ok(ControllerRole::Equal),
            other => Err(DatastoreError::InvalidArgs(format!("role = {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionType {
    #[default]
    Unknown,
    Main,
    Auxiliary,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionType::Unknown => "unknown",
            ConnectionType::Main => "main",
            ConnectionType::Auxiliary => "auxiliary",
        })
    }
}

impl FromStr for ConnectionType {
    type Err = DatastoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unknown" => Ok(ConnectionType::Unknown),
            "main" => Ok(ConnectionType::Main),
            "auxiliary" => Ok(ConnectionType::Auxiliary),
            other => Err(DatastoreError::InvalidArgs(format!(
                "connection-type = {}",
                other
            ))),
        }
    }
}

/// Attributes of a controller: the channel it talks over and its role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerAttrs {
    /// Fully-qualified channel name, empty when unset.
    pub channel: String,
    pub role: ControllerRole,
    pub connection_type: ConnectionType,
}

impl ControllerAttrs {
    pub fn new(channel: impl Into<String>, role: ControllerRole) -> Self {
        Self {
            channel: channel.into(),
            role,
            connection_type: ConnectionType::Main,
        }
    }
}

impl Snapshot for ControllerAttrs {
    fn with_namespace(&self, ns: &str) -> Result<Self> {
        let mut copy = self.clone();
        if !copy.channel.is_empty() {
            copy.channel = namespace::replace_namespace(&self.channel, ns)?;
        }
        Ok(copy)
    }

    fn to_options(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut options = Vec::with_capacity(3);
        if !self.channel.is_empty() {
            options.push(("-channel", vec![self.channel.clone()]));
        }
        options.push(("-role", vec![self.role.to_string()]));
        options.push(("-connection-type", vec![self.connection_type.to_string()]));
        options
    }

    fn set_option(&mut self, option: &str, args: OptionArgs<'_>) -> Result<()> {
        match option {
            "-channel" => self.channel = next_arg(option, args)?,
            "-role" => self.role = next_arg(option, args)?.parse()?,
            "-connection-type" => self.connection_type = next_arg(option, args)?.parse()?,
            other => {
                return Err(DatastoreError::InvalidArgs(format!("opt = {}", other)));
            }
        }
        Ok(())
    }
}

/// A controller claims its channel and, when propagating, drives the
/// channel's commit and enable paths before its own.
pub struct ControllerKind {
    collaborator: Arc<dyn Collaborator<ControllerAttrs>>,
    channels: Arc<EntityTable<ChannelKind>>,
}

impl ControllerKind {
    pub fn new(
        collaborator: Arc<dyn Collaborator<ControllerAttrs>>,
        channels: Arc<EntityTable<ChannelKind>>,
    ) -> Self {
        Self {
            collaborator,
            channels,
        }
    }

    fn channel_of(attrs: &ControllerAttrs) -> Option<&str> {
        (!attrs.channel.is_empty()).then_some(attrs.channel.as_str())
    }
}

impl EntityKind for ControllerKind {
    type Attrs = ControllerAttrs;

    const TYPE_NAME: &'static str = "controller";

    fn collaborator(&self) -> &dyn Collaborator<ControllerAttrs> {
        self.collaborator.as_ref()
    }

    fn validate(
        &self,
        _name: &str,
        attrs: &ControllerAttrs,
        previous: Option<&ControllerAttrs>,
    ) -> Result<()> {
        let Some(channel) = Self::channel_of(attrs) else {
            return Ok(());
        };
        if previous.is_some_and(|p| p.channel == channel) {
            return Ok(());
        }
        if !self.channels.exists(channel) {
            return Err(DatastoreError::NotFound(format!(
                "channel name = {}.",
                channel
            )));
        }
        if self.channels.is_used(channel)? {
            return Err(DatastoreError::NotOperational(format!(
                "channel name = {}: is used.",
                channel
            )));
        }
        Ok(())
    }

    fn set_dependents_used(&self, attrs: &ControllerAttrs, used: bool) -> Result<()> {
        match Self::channel_of(attrs) {
            Some(channel) => self.channels.claim(channel, used),
            None => Ok(()),
        }
    }

    fn update_dependents(&self, phase: Phase, attrs: &ControllerAttrs) -> Result<()> {
        match Self::channel_of(attrs) {
            Some(channel) => self.channels.update_propagation(phase, channel),
            None => Ok(()),
        }
    }

    fn enable_dependents(&self, phase: Phase, attrs: &ControllerAttrs) -> Result<()> {
        match Self::channel_of(attrs) {
            Some(channel) => self.channels.enable_propagation(phase, channel, true),
            None => Ok(()),
        }
    }

    fn disable_dependents(&self, phase: Phase, attrs: &ControllerAttrs) -> Result<()> {
        match Self::channel_of(attrs) {
            Some(channel) => self.channels.enable_propagation(phase, channel, false),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_copy_rewrites_channel() {
        let attrs = ControllerAttrs::new(":ch1", ControllerRole::Master);
        let copy = attrs.with_namespace("ns1").unwrap();
        assert_eq!(copy.channel, "ns1:ch1");
        assert_eq!(copy.role, ControllerRole::Master);
        assert_eq!(attrs.channel, ":ch1");
    }

    #[test]
    fn test_options_rebuild_the_snapshot() {
        let attrs = ControllerAttrs {
            channel: ":ch 1".into(),
            role: ControllerRole::Slave,
            connection_type: ConnectionType::Auxiliary,
        };
        let mut rebuilt = ControllerAttrs::default();
        for (option, values) in attrs.to_options() {
            rebuilt.set_option(option, &mut values.into_iter()).unwrap();
        }
        assert_eq!(rebuilt, attrs);
    }
}
