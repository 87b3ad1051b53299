//! Request dispatcher: one command line in, one response line out.

use crate::error::Result;
use crate::registry::TimeseriesRegistry;
use crate::series::OrderedTimeseries;
use crate::server::command::{Command, InstancePath};
use crate::server::response::{self, OK, PONG};
use crate::tree::CacheTree;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Shared handle to the process-wide cache tree.
pub type SharedTree = Arc<RwLock<CacheTree<String>>>;

/// Maps parsed commands onto the registry and the cache tree.
///
/// The dispatcher holds no per-request state. Clones share the same
/// registry and tree, so one instance can be handed to every worker.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<TimeseriesRegistry<String>>,
    tree: SharedTree,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(
            Arc::new(TimeseriesRegistry::new()),
            Arc::new(RwLock::new(CacheTree::new())),
        )
    }
}

impl Dispatcher {
    /// Creates a dispatcher over the given state.
    pub fn new(registry: Arc<TimeseriesRegistry<String>>, tree: SharedTree) -> Self {
        Self { registry, tree }
    }

    /// Returns the registry this dispatcher routes to.
    pub fn registry(&self) -> &Arc<TimeseriesRegistry<String>> {
        &self.registry
    }

    /// Returns the cache tree this dispatcher routes to.
    pub fn tree(&self) -> &SharedTree {
        &self.tree
    }

    /// Handles one request line and returns the response line.
    ///
    /// Errors never escape: they are rendered as `ERR: <message>`.
    pub fn handle(&self, line: &str) -> String {
        match self.execute(line) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("Rejected request '{}': {} ({})", line.trim_end(), err, err.kind());
                response::error(&err)
            }
        }
    }

    /// Parses and runs one request line.
    pub fn execute(&self, line: &str) -> Result<String> {
        let command = Command::parse(line)?;
        self.dispatch(command)
    }

    fn read_tree(&self) -> RwLockReadGuard<'_, CacheTree<String>> {
        self.tree.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, CacheTree<String>> {
        self.tree.write().unwrap_or_else(|err| err.into_inner())
    }

    /// Runs a parsed command.
    pub fn dispatch(&self, command: Command) -> Result<String> {
        let registry = &self.registry;
        match command {
            Command::Ping => Ok(PONG.to_string()),

            Command::Alloc { timestamps, values } => {
                Ok(registry.allocate(&timestamps, values)?.to_string())
            }
            Command::Size { id } => Ok(registry.size(id)?.to_string()),
            Command::GetAll { id } => response::points(&registry.get(id)?),
            Command::GetFrom { id, from } => response::points(&registry.get_from(id, from)?),
            Command::GetTo { id, to } => response::points(&registry.get_to(id, to)?),
            Command::GetRange { id, from, to } => {
                response::points(&registry.get_between(id, from, to)?)
            }
            Command::Add {
                id,
                timestamps,
                values,
            } => {
                registry.add_points(id, &timestamps, values)?;
                Ok(OK.to_string())
            }
            Command::Mod {
                id,
                timestamps,
                values,
            } => {
                registry.modify_points(id, &timestamps, values)?;
                Ok(OK.to_string())
            }
            Command::Del { id, timestamps } => {
                registry.remove_points(id, &timestamps)?;
                Ok(OK.to_string())
            }
            Command::Free { id } => {
                registry.deallocate(id)?;
                Ok(OK.to_string())
            }
            Command::Grid {
                id,
                tick,
                null_value,
            } => response::grid(&registry.grid(id, &tick, null_value)?),

            Command::NsAdd { namespace } => {
                self.write_tree().add_namespace(&namespace)?;
                Ok(OK.to_string())
            }
            Command::NsRename { old, new } => {
                self.write_tree().rename_namespace(&old, &new)?;
                Ok(OK.to_string())
            }
            Command::NsRemove { namespace } => {
                self.write_tree().remove_namespace(&namespace)?;
                Ok(OK.to_string())
            }
            Command::NsList => response::names(&self.read_tree().namespaces()),

            Command::StAdd {
                namespace,
                structure,
                definition,
            } => {
                self.write_tree()
                    .add_structure(&namespace, &structure, &definition)?;
                Ok(OK.to_string())
            }
            Command::StRename {
                namespace,
                old,
                new,
            } => {
                self.write_tree().rename_structure(&namespace, &old, &new)?;
                Ok(OK.to_string())
            }
            Command::StRemove {
                namespace,
                structure,
            } => {
                self.write_tree().remove_structure(&namespace, &structure)?;
                Ok(OK.to_string())
            }
            Command::StList { namespace } => {
                response::structures(&self.read_tree().structures(&namespace)?)
            }

            Command::InAdd { path, points } => {
                let series = points
                    .map(|(timestamps, values)| OrderedTimeseries::new(&timestamps, values))
                    .transpose()?;
                self.write_tree().add_structure_instance(
                    &path.namespace,
                    &path.structure,
                    &path.instance,
                    series,
                )?;
                Ok(OK.to_string())
            }
            Command::InRemove { path } => {
                self.write_tree().remove_structure_instance(
                    &path.namespace,
                    &path.structure,
                    &path.instance,
                )?;
                Ok(OK.to_string())
            }
            Command::InList {
                namespace,
                structure,
            } => response::names(&self.read_tree().instances(&namespace, &structure)?),

            Command::TsGet { path } => {
                let tree = self.read_tree();
                let series = tree.get_timeseries(&path.namespace, &path.structure, &path.instance)?;
                response::points(&series.points())
            }
            Command::TsFrom { path, from } => {
                let points = self.read_tree().get_timeseries_from(
                    &path.namespace,
                    &path.structure,
                    &path.instance,
                    from,
                )?;
                response::points(&points)
            }
            Command::TsTo { path, to } => {
                let points = self.read_tree().get_timeseries_to(
                    &path.namespace,
                    &path.structure,
                    &path.instance,
                    to,
                )?;
                response::points(&points)
            }
            Command::TsRange { path, from, to } => {
                let points = self.read_tree().get_timeseries_between(
                    &path.namespace,
                    &path.structure,
                    &path.instance,
                    from,
                    to,
                )?;
                response::points(&points)
            }
            Command::TsAdd {
                path,
                timestamps,
                values,
            } => self.update_series(&path, |series| series.add_points(&timestamps, values)),
            Command::TsMod {
                path,
                timestamps,
                values,
            } => self.update_series(&path, |series| series.update_points(&timestamps, values)),
            Command::TsDel { path, timestamps } => {
                self.update_series(&path, |series| series.remove_points(&timestamps))
            }
        }
    }

    fn update_series(
        &self,
        path: &InstancePath,
        f: impl FnOnce(&mut OrderedTimeseries<String>) -> Result<()>,
    ) -> Result<String> {
        self.write_tree()
            .update_timeseries(&path.namespace, &path.structure, &path.instance, f)?;
        Ok(OK.to_string())
    }
}
