use log::info;

use crate::errors::Result;

/// Trait for the external side effects of one entity type.
///
/// The transaction engine never touches sockets, protocol channels or the
/// dataplane itself. When a commit has to materialize a snapshot it calls the
/// collaborator registered for the entity's type: `create` and `destroy`
/// instantiate and tear down the object described by a snapshot, `start` and
/// `stop` switch it on and off.
///
/// Calls are synchronous and may block; the engine has no timeout of its own.
/// A failure is surfaced to the caller with the entity name attached.
///
/// Implementations must be `Send` and `Sync` because a datastore is shared
/// between the interpreter thread and query threads.
///
/// # Examples
///
/// ```no_run
/// use switchyard::prelude::*;
/// use switchyard::types::channel::ChannelAttrs;
///
/// struct ChannelManager;
///
/// impl Collaborator<ChannelAttrs> for ChannelManager {
///     fn create(&self, name: &str, attrs: &ChannelAttrs) -> Result<()> {
///         println!("open channel {} to {}:{}", name, attrs.dst_addr, attrs.dst_port);
///         Ok(())
///     }
///     fn destroy(&self, name: &str, _attrs: &ChannelAttrs) -> Result<()> {
///         println!("close channel {}", name);
///         Ok(())
///     }
///     fn start(&self, _name: &str, _attrs: &ChannelAttrs) -> Result<()> {
///         Ok(())
///     }
///     fn stop(&self, _name: &str, _attrs: &ChannelAttrs) -> Result<()> {
///         Ok(())
///     }
/// }
/// ```
pub trait Collaborator<A>: Send + Sync {
    /// Instantiates the object described by `attrs`.
    ///
    /// # Errors
    ///
    /// Returns a `DatastoreError::Collaborator` if the object can't be created.
    fn create(&self, name: &str, attrs: &A) -> Result<()>;

    /// Tears down the object previously created from `attrs`.
    fn destroy(&self, name: &str, attrs: &A) -> Result<()>;

    /// Makes the object operationally active.
    fn start(&self, name: &str, attrs: &A) -> Result<()>;

    /// Makes the object operationally inactive.
    fn stop(&self, name: &str, attrs: &A) -> Result<()>;
}

/// A collaborator that accepts every call and only logs it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCollaborator;

impl<A: std::fmt::Debug> Collaborator<A> for NoopCollaborator {
    fn create(&self, name: &str, attrs: &A) -> Result<()> {
        info!("create {}: {:?}", name, attrs);
        Ok(())
    }

    fn destroy(&self, name: &str, _attrs: &A) -> Result<()> {
        info!("destroy {}", name);
        Ok(())
    }

    fn start(&self, name: &str, _attrs: &A) -> Result<()> {
        info!("start {}", name);
        Ok(())
    }

    fn stop(&self, name: &str, _attrs: &A) -> Result<()> {
        info!("stop {}", name);
        Ok(())
    }
}
