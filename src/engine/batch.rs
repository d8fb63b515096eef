//! Grouping compiled commands into execution units.

use crate::ast::Command;
use crate::error::RdbResult;
use crate::transpiler::{CommandCompiler, ExecutionUnit, TranslationContext};

/// Statement and parameter counts of a (pending) group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupSize {
    pub statements: usize,
    pub parameters: usize,
}

impl GroupSize {
    pub fn of(unit: &ExecutionUnit) -> Self {
        Self {
            statements: unit.statements.len(),
            parameters: unit.parameters.len(),
        }
    }
}

/// Decides where merged groups are cut.
pub trait BatchPolicy: Send + Sync {
    /// Whether `incoming` may join a non-empty group of size `pending`.
    fn admits(&self, pending: GroupSize, incoming: GroupSize) -> bool;

    /// Whether a group of size `pending` must be flushed now.
    fn is_full(&self, pending: GroupSize) -> bool;
}

/// Flush at a statement count or a parameter count, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    statements: usize,
    parameters: usize,
}

impl ThresholdPolicy {
    /// `None` is unbounded; non-positive thresholds are clamped to 1.
    pub fn new(statements: Option<i64>, parameters: Option<i64>) -> Self {
        Self {
            statements: clamp_threshold(statements),
            parameters: clamp_threshold(parameters),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    pub fn statements(&self) -> usize {
        self.statements
    }

    pub fn parameters(&self) -> usize {
        self.parameters
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

fn clamp_threshold(threshold: Option<i64>) -> usize {
    match threshold {
        None => usize::MAX,
        Some(n) if n < 1 => 1,
        Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
    }
}

impl BatchPolicy for ThresholdPolicy {
    fn admits(&self, pending: GroupSize, incoming: GroupSize) -> bool {
        pending.parameters.saturating_add(incoming.parameters) <= self.parameters
    }

    fn is_full(&self, pending: GroupSize) -> bool {
        pending.statements >= self.statements || pending.parameters >= self.parameters
    }
}

/// Compiles a command list and merges the results under a [`BatchPolicy`].
pub struct BatchPlanner<'a> {
    compiler: &'a CommandCompiler<'a>,
    policy: &'a dyn BatchPolicy,
    trace: bool,
}

impl<'a> BatchPlanner<'a> {
    pub fn new(compiler: &'a CommandCompiler<'a>, policy: &'a dyn BatchPolicy) -> Self {
        Self {
            compiler,
            policy,
            trace: false,
        }
    }

    /// Log every compiled statement at debug level.
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Compile `commands` in order into execution units.
    ///
    /// Perform-alone units flush the pending group and run by themselves.
    /// Compilation is all-or-nothing: the first error aborts the plan.
    pub fn plan(&self, commands: &[Command]) -> RdbResult<Vec<ExecutionUnit>> {
        let mut ctx = TranslationContext::new();
        let mut units = Vec::new();
        let mut pending: Option<ExecutionUnit> = None;

        for command in commands {
            let unit = self.compiler.compile(command, &mut ctx)?;
            if self.trace {
                tracing::debug!(
                    statement = %unit.text(),
                    parameters = ?unit.parameters.names(),
                    "compiled command"
                );
            }

            if unit.perform_alone {
                units.extend(pending.take());
                units.push(unit);
                continue;
            }

            let incoming = GroupSize::of(&unit);
            if let Some(group) = &pending {
                if !self.policy.admits(GroupSize::of(group), incoming) {
                    units.extend(pending.take());
                }
            }
            let group = match pending.take() {
                Some(mut group) => {
                    group.merge(unit);
                    group
                }
                None => unit,
            };
            if self.policy.is_full(GroupSize::of(&group)) {
                units.push(group);
            } else {
                pending = Some(group);
            }
        }
        units.extend(pending);

        tracing::debug!(
            "Planned {} commands into {} execution units",
            commands.len(),
            units.len()
        );
        Ok(units)
    }
}
