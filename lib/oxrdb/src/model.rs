//! Patterns over the [`oxrdf`] data model.
//!
//! Terms, triples and variables are the ones of [`oxrdf`], re-exported here.

pub use oxrdf::vocab;
pub use oxrdf::{
    BlankNode, Literal, NamedNode, NamedNodeRef, Subject, Term, TermRef, Triple, Variable,
};
use std::fmt;

/// One position of a [`TriplePattern`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum NodePattern {
    /// Matches any node without binding it.
    Any,
    /// Matches exactly this node.
    Node(Term),
    /// Matches any node and binds it to the variable.
    Variable(Variable),
}

impl NodePattern {
    #[inline]
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Self::Variable(v) => Some(v),
            Self::Any | Self::Node(_) => None,
        }
    }
}

impl fmt::Display for NodePattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Node(node) => node.fmt(f),
            Self::Variable(variable) => variable.fmt(f),
        }
    }
}

impl From<Term> for NodePattern {
    #[inline]
    fn from(node: Term) -> Self {
        Self::Node(node)
    }
}

impl From<NamedNode> for NodePattern {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::Node(node.into())
    }
}

impl From<NamedNodeRef<'_>> for NodePattern {
    #[inline]
    fn from(node: NamedNodeRef<'_>) -> Self {
        Self::Node(node.into_owned().into())
    }
}

impl From<BlankNode> for NodePattern {
    #[inline]
    fn from(node: BlankNode) -> Self {
        Self::Node(node.into())
    }
}

impl From<Literal> for NodePattern {
    #[inline]
    fn from(node: Literal) -> Self {
        Self::Node(node.into())
    }
}

impl From<Subject> for NodePattern {
    #[inline]
    fn from(node: Subject) -> Self {
        Self::Node(node.into())
    }
}

impl From<Variable> for NodePattern {
    #[inline]
    fn from(variable: Variable) -> Self {
        Self::Variable(variable)
    }
}

/// A triple pattern, possibly containing variables, as given to the query planner.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TriplePattern {
    pub subject: NodePattern,
    pub predicate: NodePattern,
    pub object: NodePattern,
}

impl TriplePattern {
    #[inline]
    pub fn new(
        subject: impl Into<NodePattern>,
        predicate: impl Into<NodePattern>,
        object: impl Into<NodePattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for TriplePattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A triple filter where `None` matches any node.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct TripleMatch {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
}

impl TripleMatch {
    #[inline]
    pub fn new(subject: Option<Term>, predicate: Option<Term>, object: Option<Term>) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// The filter matching every triple.
    #[inline]
    pub fn any() -> Self {
        Self::default()
    }

    /// Checks if the triple satisfies the filter.
    pub fn matches(&self, triple: &Triple) -> bool {
        self.subject
            .as_ref()
            .is_none_or(|s| term_is_subject(s, &triple.subject))
            && self
                .predicate
                .as_ref()
                .is_none_or(|p| matches!(p, Term::NamedNode(p) if *p == triple.predicate))
            && self.object.as_ref().is_none_or(|o| *o == triple.object)
    }

    /// Checks if the filter can never match a triple: a literal subject or a non-IRI predicate.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self.subject, Some(Term::Literal(_)))
            || self
                .predicate
                .as_ref()
                .is_some_and(|p| !matches!(p, Term::NamedNode(_)))
    }
}

impl fmt::Display for TripleMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, node) in [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .enumerate()
        {
            if i > 0 {
                f.write_str(" ")?;
            }
            match node {
                Some(node) => node.fmt(f)?,
                None => f.write_str("ANY")?,
            }
        }
        Ok(())
    }
}

impl From<&Triple> for TripleMatch {
    #[inline]
    fn from(triple: &Triple) -> Self {
        Self {
            subject: Some(triple.subject.clone().into()),
            predicate: Some(triple.predicate.clone().into()),
            object: Some(triple.object.clone()),
        }
    }
}

fn term_is_subject(term: &Term, subject: &Subject) -> bool {
    match (term, subject) {
        (Term::NamedNode(a), Subject::NamedNode(b)) => a == b,
        (Term::BlankNode(a), Subject::BlankNode(b)) => a == b,
        _ => false,
    }
}

/// Converts a term into a triple subject if it is a named or blank node.
pub(crate) fn term_into_subject(term: Term) -> Option<Subject> {
    match term {
        Term::NamedNode(node) => Some(node.into()),
        Term::BlankNode(node) => Some(node.into()),
        _ => None,
    }
}

/// Builds a triple from three terms if they have valid subject and predicate kinds.
pub(crate) fn triple_from_terms(subject: Term, predicate: Term, object: Term) -> Option<Triple> {
    let Term::NamedNode(predicate) = predicate else {
        return None;
    };
    Some(Triple::new(term_into_subject(subject)?, predicate, object))
}
