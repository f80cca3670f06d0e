use miette::Result;

use crate::{air::Program, error};

/// Program indices at which a run pauses to show the machine.
#[derive(Debug, Default)]
pub struct Breakpoints(Vec<Breakpoint>);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Breakpoint {
    pub index: usize,
    /// Label the breakpoint was requested with, if any
    pub label: Option<String>,
}

impl Breakpoint {
    /// Resolve a label, or a plain instruction index, against `program`.
    pub fn resolve(spec: &str, program: &Program) -> Result<Breakpoint> {
        if let Ok(index) = program.resolve(spec) {
            return Ok(Breakpoint {
                index,
                label: Some(spec.to_owned()),
            });
        }
        match spec.parse::<usize>() {
            Ok(index) if index < program.len() => Ok(Breakpoint { index, label: None }),
            _ => Err(error::bad_breakpoint(spec, program.len())),
        }
    }
}

impl Breakpoints {
    pub fn get(&self, index: usize) -> Option<&Breakpoint> {
        self.0.iter().find(|breakpoint| breakpoint.index == index)
    }

    fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Ignores a second breakpoint at the same index.
    fn insert(&mut self, breakpoint: Breakpoint) {
        if !self.contains(breakpoint.index) {
            self.0.push(breakpoint);
        }
    }
}

impl From<Vec<Breakpoint>> for Breakpoints {
    fn from(vec: Vec<Breakpoint>) -> Self {
        let mut breakpoints = Breakpoints::default();
        for breakpoint in vec {
            breakpoints.insert(breakpoint);
        }
        breakpoints
    }
}
