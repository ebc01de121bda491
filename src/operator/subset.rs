use itertools::Itertools;

use crate::explain::RelWriter;
use crate::operator::OperatorTrait;
use crate::plan::RelId;
use crate::properties::RowType;
use crate::types::TypeFactory;

/// A set of interchangeable expressions computing the same relation.
///
/// Members are not inputs: a subset has no inputs, and members are added after the subset is
/// created, so a member may reach the subset that contains it.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct RelSubset {
    row_type: RowType,
    members: Vec<RelId>,
    best: Option<RelId>,
}

impl RelSubset {
    pub fn new(row_type: RowType) -> Self {
        Self {
            row_type,
            members: vec![],
            best: None,
        }
    }

    pub fn members(&self) -> &[RelId] {
        &self.members
    }

    pub fn best(&self) -> Option<RelId> {
        self.best
    }

    /// The best member if chosen, else the first one added.
    pub fn best_or_original(&self) -> Option<RelId> {
        self.best.or_else(|| self.members.first().copied())
    }

    pub(crate) fn add_member(&mut self, member: RelId) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    pub(crate) fn set_best(&mut self, member: RelId) {
        self.best = Some(member);
    }
}

impl OperatorTrait for RelSubset {
    fn explain_terms(&self, writer: &mut RelWriter) {
        writer.item(
            "members",
            format!("[{}]", self.members.iter().map(|m| format!("#{}", m)).join(", ")),
        );
        if let Some(best) = self.best {
            writer.item("best", format!("#{}", best));
        }
    }

    fn derive_row_type(&self, _type_factory: &TypeFactory, _inputs: &[&RowType]) -> RowType {
        self.row_type.clone()
    }

    fn validate(&self, _inputs: &[&RowType]) -> Result<(), String> {
        Ok(())
    }
}
