//! A small dependency-ordered check runner.
//!
//! Checks are registered by name with the names of the checks they
//! depend on. The scheduler topologically orders them, runs each once,
//! and skips (rather than runs) any check whose dependency failed —
//! there is no point validating the DIE tree of a CU whose header never
//! parsed. A cycle in the dependency graph is a programming error in
//! how checks were registered, not a malformed input, so it is reported
//! distinctly from an ordinary check failure.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::diagnostics::Diagnostics;

/// What a single check returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check ran to completion (it may still have emitted
    /// diagnostics — that's independent of this outcome).
    Ran,
    /// The check could not proceed because a dependency did not reach
    /// [`CheckOutcome::Ran`].
    SkippedDependencyFailed,
    /// The check panicked or returned a fatal internal error; its
    /// dependents are skipped the same as if it failed outright.
    Failed,
}

pub trait Check {
    fn name(&self) -> &'static str;
    fn depends_on(&self) -> &[&'static str] {
        &[]
    }
    fn run(&mut self, diagnostics: &mut Diagnostics) -> CheckOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    DuplicateCheck(&'static str),
    UnknownDependency {
        check: &'static str,
        dependency: &'static str,
    },
    Cycle,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::DuplicateCheck(name) => write!(f, "check {name:?} registered more than once"),
            SchedulerError::UnknownDependency { check, dependency } => {
                write!(f, "check {check:?} depends on unregistered check {dependency:?}")
            }
            SchedulerError::Cycle => write!(f, "check dependency graph contains a cycle"),
        }
    }
}

/// Where checks are registered before the run starts.
#[derive(Default)]
pub struct Registrar {
    checks: Vec<Box<dyn Check>>,
}

impl Registrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    pub fn build(self) -> Result<Scheduler, SchedulerError> {
        let mut by_name = HashMap::new();
        for (index, check) in self.checks.iter().enumerate() {
            if by_name.insert(check.name(), index).is_some() {
                return Err(SchedulerError::DuplicateCheck(check.name()));
            }
        }
        for check in &self.checks {
            for dep in check.depends_on() {
                if !by_name.contains_key(dep) {
                    return Err(SchedulerError::UnknownDependency {
                        check: check.name(),
                        dependency: dep,
                    });
                }
            }
        }

        let order = topological_order(&self.checks, &by_name)?;
        Ok(Scheduler {
            checks: self.checks,
            by_name,
            order,
        })
    }
}

fn topological_order(
    checks: &[Box<dyn Check>],
    by_name: &HashMap<&'static str, usize>,
) -> Result<Vec<usize>, SchedulerError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; checks.len()];
    let mut order = Vec::with_capacity(checks.len());

    fn visit(
        index: usize,
        checks: &[Box<dyn Check>],
        by_name: &HashMap<&'static str, usize>,
        marks: &mut [Mark],
        order: &mut Vec<usize>,
    ) -> Result<(), SchedulerError> {
        match marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(SchedulerError::Cycle),
            Mark::Unvisited => {}
        }
        marks[index] = Mark::InProgress;
        for dep in checks[index].depends_on() {
            let dep_index = by_name[dep];
            visit(dep_index, checks, by_name, marks, order)?;
        }
        marks[index] = Mark::Done;
        order.push(index);
        Ok(())
    }

    for index in 0..checks.len() {
        visit(index, checks, by_name, &mut marks, &mut order)?;
    }
    Ok(order)
}

/// Runs every registered check in dependency order, tracking which
/// checks failed so their dependents are skipped rather than run on top
/// of a check that never produced valid state.
pub struct Scheduler {
    checks: Vec<Box<dyn Check>>,
    by_name: HashMap<&'static str, usize>,
    order: Vec<usize>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("by_name", &self.by_name)
            .field("order", &self.order)
            .finish()
    }
}

impl Scheduler {
    pub fn run(&mut self, diagnostics: &mut Diagnostics) -> HashMap<&'static str, CheckOutcome> {
        let mut outcomes: HashMap<&'static str, CheckOutcome> = HashMap::new();
        let mut unhealthy: HashSet<&'static str> = HashSet::new();

        for &index in &self.order {
            let name = self.checks[index].name();
            let deps_ok = self.checks[index].depends_on().iter().all(|d| !unhealthy.contains(d));

            let outcome = if deps_ok {
                tracing::debug!(check = name, "entering check");
                let before = diagnostics.diagnostics().len();
                let outcome = self.checks[index].run(diagnostics);
                let produced = diagnostics.diagnostics().len() - before;
                match outcome {
                    CheckOutcome::Ran => tracing::debug!(check = name, produced, "check produced diagnostics"),
                    CheckOutcome::Failed => tracing::debug!(check = name, "check failed"),
                    CheckOutcome::SkippedDependencyFailed => {}
                }
                outcome
            } else {
                tracing::debug!(check = name, "skipping check: dependency failed");
                CheckOutcome::SkippedDependencyFailed
            };

            if !matches!(outcome, CheckOutcome::Ran) {
                unhealthy.insert(name);
            }
            outcomes.insert(name, outcome);
        }

        outcomes
    }

    pub fn check_count(&self) -> usize {
        self.checks.len()
    }

    pub fn has_check(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{default_accept, default_error_criteria, default_reject};

    struct Recording {
        name: &'static str,
        deps: Vec<&'static str>,
        outcome: CheckOutcome,
        log: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    }

    impl Check for Recording {
        fn name(&self) -> &'static str {
            self.name
        }
        fn depends_on(&self) -> &[&'static str] {
            &self.deps
        }
        fn run(&mut self, _diagnostics: &mut Diagnostics) -> CheckOutcome {
            self.log.borrow_mut().push(self.name);
            self.outcome
        }
    }

    fn diagnostics() -> Diagnostics {
        Diagnostics::new(default_accept(), default_reject(), default_error_criteria())
    }

    #[test]
    fn runs_dependencies_before_dependents() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut registrar = Registrar::new();
        registrar.register(Box::new(Recording {
            name: "b",
            deps: vec!["a"],
            outcome: CheckOutcome::Ran,
            log: log.clone(),
        }));
        registrar.register(Box::new(Recording {
            name: "a",
            deps: vec![],
            outcome: CheckOutcome::Ran,
            log: log.clone(),
        }));

        let mut scheduler = registrar.build().unwrap();
        let mut diags = diagnostics();
        scheduler.run(&mut diags);

        assert_eq!(*log.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn skips_dependents_of_a_failed_check() {
        let log = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut registrar = Registrar::new();
        registrar.register(Box::new(Recording {
            name: "a",
            deps: vec![],
            outcome: CheckOutcome::Failed,
            log: log.clone(),
        }));
        registrar.register(Box::new(Recording {
            name: "b",
            deps: vec!["a"],
            outcome: CheckOutcome::Ran,
            log: log.clone(),
        }));

        let mut scheduler = registrar.build().unwrap();
        let mut diags = diagnostics();
        let outcomes = scheduler.run(&mut diags);

        assert_eq!(outcomes["b"], CheckOutcome::SkippedDependencyFailed);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn unknown_dependency_is_rejected_at_build_time() {
        let mut registrar = Registrar::new();
        registrar.register(Box::new(Recording {
            name: "a",
            deps: vec!["nonexistent"],
            outcome: CheckOutcome::Ran,
            log: std::rc::Rc::new(std::cell::RefCell::new(Vec::new())),
        }));
        let result = registrar.build();
        assert!(matches!(result, Err(SchedulerError::UnknownDependency { .. })));
    }

    #[test]
    fn cycle_is_rejected_at_build_time() {
        let mut registrar = Registrar::new();
        registrar.register(Box::new(Recording {
            name: "a",
            deps: vec!["b"],
            outcome: CheckOutcome::Ran,
            log: std::rc::Rc::new(std::cell::RefCell::new(Vec::new())),
        }));
        registrar.register(Box::new(Recording {
            name: "b",
            deps: vec!["a"],
            outcome: CheckOutcome::Ran,
            log: std::rc::Rc::new(std::cell::RefCell::new(Vec::new())),
        }));
        let result = registrar.build();
        assert_eq!(result.unwrap_err(), SchedulerError::Cycle);
    }
}
