//! Filter algebra: composable entity predicates.
//!
//! A [`Filter`] pairs a pure predicate over one entity with the list of entity
//! properties its result may change with (`dependent_props`). Filters are cheap to
//! clone (the predicate is shared) and compose with [`and`], [`or`] and [`not`]
//! without losing either part.
//!
//! # Example
//!
//! ```rust
//! use peregrine_ai::ai::entity::PlayerId;
//! use peregrine_ai::ai::filter::{self, builtin};
//!
//! let own_idle_workers = filter::and(
//!     filter::and(builtin::by_owner(PlayerId(1)), builtin::by_class("Worker")),
//!     builtin::is_idle(),
//! );
//! assert_eq!(own_idle_workers.dependent_props(), ["owner", "idle"]);
//! ```

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::ai::entity::EntityView;
use crate::ai::error::FilterError;

pub mod builtin;
pub mod spec;


pub use spec::FilterSpec;

pub type PredicateResult = Result<bool, FilterError>;

/// Ordered multiset of property names a filter result depends on.
pub type DependentProps = SmallVec<[String; 2]>;

type Predicate = dyn Fn(&dyn EntityView) -> PredicateResult + Send + Sync;

#[derive(Clone)]
pub struct Filter {
    predicate: Arc<Predicate>,
    dependent_props: DependentProps,
    label: Arc<str>,
    spec: Option<Arc<FilterSpec>>,
}

impl Filter {
    /// Build a filter from an infallible predicate.
    pub fn new<F>(label: impl Into<String>, dependent_props: &[&str], predicate: F) -> Self
    where
        F: Fn(&dyn EntityView) -> bool + Send + Sync + 'static,
    {
        Self::try_new(label, dependent_props, move |ent| Ok(predicate(ent)))
    }

    /// Build a filter whose predicate can fail. A failure aborts the decision cycle.
    pub fn try_new<F>(label: impl Into<String>, dependent_props: &[&str], predicate: F) -> Self
    where
        F: Fn(&dyn EntityView) -> PredicateResult + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            dependent_props: dependent_props.iter().map(|p| p.to_string()).collect(),
            label: Arc::from(label.into()),
            spec: None,
        }
    }

    pub(crate) fn with_spec(mut self, spec: FilterSpec) -> Self {
        self.spec = Some(Arc::new(spec));
        self
    }

    pub fn test(&self, ent: &dyn EntityView) -> PredicateResult {
        (self.predicate)(ent)
    }

    pub fn dependent_props(&self) -> &[String] {
        &self.dependent_props
    }

    /// Whether a change of `property` may flip this filter's result.
    ///
    /// `metadata.role` and `metadata` are treated as overlapping in both directions.
    pub fn depends_on(&self, property: &str) -> bool {
        self.dependent_props.iter().any(|prop| props_overlap(prop, property))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Serialisable description, present for built-in filters and their compositions.
    pub fn spec(&self) -> Option<&FilterSpec> {
        self.spec.as_deref()
    }

    pub fn and(self, other: Filter) -> Filter {
        let label = format!("({} & {})", self.label, other.label);
        let spec = compose_spec(&self, &other, |a, b| FilterSpec::And(Box::new(a), Box::new(b)));
        let mut dependent_props = self.dependent_props.clone();
        dependent_props.extend(other.dependent_props.iter().cloned());
        let (lhs, rhs) = (self.predicate, other.predicate);
        Filter {
            predicate: Arc::new(move |ent: &dyn EntityView| -> PredicateResult {
                Ok(lhs(ent)? && rhs(ent)?)
            }),
            dependent_props,
            label: Arc::from(label),
            spec,
        }
    }

    pub fn or(self, other: Filter) -> Filter {
        let label = format!("({} | {})", self.label, other.label);
        let spec = compose_spec(&self, &other, |a, b| FilterSpec::Or(Box::new(a), Box::new(b)));
        let mut dependent_props = self.dependent_props.clone();
        dependent_props.extend(other.dependent_props.iter().cloned());
        let (lhs, rhs) = (self.predicate, other.predicate);
        Filter {
            predicate: Arc::new(move |ent: &dyn EntityView| -> PredicateResult {
                Ok(lhs(ent)? || rhs(ent)?)
            }),
            dependent_props,
            label: Arc::from(label),
            spec,
        }
    }

    pub fn negate(self) -> Filter {
        let label = format!("!{}", self.label);
        let spec = self.spec.as_deref().map(|s| Arc::new(FilterSpec::Not(Box::new(s.clone()))));
        let inner = self.predicate;
        Filter {
            predicate: Arc::new(move |ent: &dyn EntityView| -> PredicateResult { Ok(!inner(ent)?) }),
            dependent_props: self.dependent_props,
            label: Arc::from(label),
            spec,
        }
    }
}

impl std::ops::Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        self.negate()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("label", &self.label)
            .field("dependent_props", &self.dependent_props)
            .finish()
    }
}

/// Logical AND, short-circuiting left to right.
pub fn and(lhs: Filter, rhs: Filter) -> Filter {
    lhs.and(rhs)
}

/// Logical OR, short-circuiting left to right.
pub fn or(lhs: Filter, rhs: Filter) -> Filter {
    lhs.or(rhs)
}

pub fn not(filter: Filter) -> Filter {
    filter.negate()
}

fn compose_spec(
    lhs: &Filter,
    rhs: &Filter,
    combine: impl FnOnce(FilterSpec, FilterSpec) -> FilterSpec,
) -> Option<Arc<FilterSpec>> {
    match (lhs.spec(), rhs.spec()) {
        (Some(a), Some(b)) => Some(Arc::new(combine(a.clone(), b.clone()))),
        _ => None,
    }
}

fn props_overlap(declared: &str, changed: &str) -> bool {
    fn is_child(parent: &str, child: &str) -> bool {
        child.len() > parent.len() && child.starts_with(parent) && child.as_bytes()[parent.len()] == b'.'
    }
    declared == changed || is_child(declared, changed) || is_child(changed, declared)
}
