//! The ordered list of assignments layered over a node's value.

use crate::error::TemplateError;
use crate::invert::Assignment;
use crate::path::{self, Path};
use crate::template::AssignmentTemplate;
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrider {
    assignments: Vec<Assignment>,
    template: Option<AssignmentTemplate>,
}

impl Overrider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// Append an assignment, fitted to the template if there is one. An earlier assignment at
    /// the same path is dropped.
    pub fn add(&mut self, assignment: Assignment) -> Result<(), TemplateError> {
        let assignment = self.fit(assignment)?;
        self.push(assignment);
        Ok(())
    }

    /// Append an assignment that was already fitted.
    pub(crate) fn push(&mut self, assignment: Assignment) {
        self.assignments.retain(|a| a.path != assignment.path);
        self.assignments.push(assignment);
    }

    /// The assignment as [`add`](Self::add) would store it.
    pub fn fit(&self, assignment: Assignment) -> Result<Assignment, TemplateError> {
        match &self.template {
            Some(template) => Ok(Assignment {
                value: template.convert(&assignment.value)?,
                path: assignment.path,
            }),
            None => Ok(assignment),
        }
    }

    pub fn template(&self) -> Option<AssignmentTemplate> {
        self.template
    }

    /// Only assignments added from now on are fitted.
    pub fn set_template(&mut self, template: Option<AssignmentTemplate>) {
        self.template = template;
    }

    pub fn insert_at(&mut self, index: usize, assignment: Assignment) {
        let index = index.min(self.assignments.len());
        self.assignments.insert(index, assignment);
    }

    pub fn remove_at(&mut self, path: &Path) -> Option<Value> {
        let position = self.assignments.iter().position(|a| &a.path == path)?;
        Some(self.assignments.remove(position).value)
    }

    pub fn clear(&mut self) {
        self.assignments.clear();
    }

    pub fn replace(&mut self, assignments: Vec<Assignment>) {
        self.assignments = assignments;
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// `base` with every assignment applied in order. Assignments whose path no longer exists
    /// are skipped.
    pub fn apply(&self, base: &Value) -> Value {
        let mut value = base.clone();
        for assignment in &self.assignments {
            match path::set(&value, &assignment.path, assignment.value.clone()) {
                Ok(updated) => value = updated,
                Err(e) if e.is_out_of_range() => {
                    tracing::warn!(path = %assignment.path, "skipping stale override: {e}");
                }
                Err(e) => {
                    tracing::warn!(path = %assignment.path, "skipping override that no longer fits: {e}");
                }
            }
        }
        value
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::path;
    use test_log::test;

    #[test]
    fn later_assignments_win() {
        let mut overrider = Overrider::new();
        overrider.add(Assignment::new(path![1], 10)).unwrap();
        overrider.add(Assignment::new(path![], Value::from(vec![5, 6, 7]))).unwrap();
        overrider.add(Assignment::new(path![2], 70)).unwrap();
        let out = overrider.apply(&Value::from(vec![1, 2, 3]));
        assert_eq!(out, Value::from(vec![5, 6, 70]));
    }

    #[test]
    fn same_path_replaces() {
        let mut overrider = Overrider::new();
        overrider.add(Assignment::new(path![0], 1)).unwrap();
        overrider.add(Assignment::new(path![1], 2)).unwrap();
        overrider.add(Assignment::new(path![0], 3)).unwrap();
        assert_eq!(overrider.len(), 2);
        assert_eq!(overrider.assignments()[1].value, Value::Int(3));
        assert_eq!(overrider.remove_at(&path![1]), Some(Value::Int(2)));
        assert_eq!(overrider.remove_at(&path![1]), None);
    }

    #[test]
    fn out_of_range_is_skipped() {
        let mut overrider = Overrider::new();
        overrider.add(Assignment::new(path![5], 1)).unwrap();
        overrider.add(Assignment::new(path![0], 9)).unwrap();
        assert_eq!(overrider.apply(&Value::from(vec![1, 2])), Value::from(vec![9, 2]));
    }

    #[test]
    fn insert_and_replace() {
        let mut overrider = Overrider::new();
        overrider.add(Assignment::new(path![0], 1)).unwrap();
        overrider.insert_at(0, Assignment::new(path![], Value::from(vec![0, 0])));
        assert_eq!(overrider.apply(&Value::Int(3)), Value::from(vec![1, 0]));
        overrider.replace(vec![]);
        assert!(overrider.is_empty());
    }

    #[test]
    fn templates_fit_new_assignments() {
        let mut overrider = Overrider::new();
        overrider.add(Assignment::new(path![0], 50)).unwrap();
        overrider.set_template(Some(AssignmentTemplate::bound(0, 10).unwrap()));
        overrider.add(Assignment::new(path![1], 50)).unwrap();
        assert_eq!(overrider.apply(&Value::from(vec![1, 2])), Value::from(vec![50, 10]));
        assert_eq!(
            overrider.add(Assignment::new(path![1], "x")),
            Err(TemplateError::InvalidType("str"))
        );
        assert_eq!(overrider.len(), 2);
    }
}
