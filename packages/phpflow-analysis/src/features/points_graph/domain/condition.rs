//! Assumption conditions attached to assume points

use serde::{Deserialize, Serialize};

use crate::shared::models::ExprId;

/// How the parts of an assumption combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionForm {
    /// At least one part may hold
    Some,
    /// All parts may hold
    All,
    /// No part may hold
    None,
    /// At least one part may fail; negation of `All`
    SomeNot,
    /// Exactly one part may hold
    ExactlyOne,
    /// Any number of parts except exactly one may hold
    NotExactlyOne,
}

impl ConditionForm {
    /// The form asserting the opposite of `self`
    pub fn negation(self) -> ConditionForm {
        match self {
            ConditionForm::Some => ConditionForm::None,
            ConditionForm::None => ConditionForm::Some,
            ConditionForm::All => ConditionForm::SomeNot,
            ConditionForm::SomeNot => ConditionForm::All,
            ConditionForm::ExactlyOne => ConditionForm::NotExactlyOne,
            ConditionForm::NotExactlyOne => ConditionForm::ExactlyOne,
        }
    }
}

/// A composed condition an assume point filters the flow with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumptionCondition {
    /// Combination mode of the parts
    pub form: ConditionForm,
    /// Condition expressions, handles into the owning graph's source CFG
    pub parts: Vec<ExprId>,
}

impl AssumptionCondition {
    pub fn new(form: ConditionForm, parts: Vec<ExprId>) -> Self {
        Self { form, parts }
    }
}
