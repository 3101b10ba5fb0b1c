use crate::driver::Column;
use crate::model::{NamedNodeRef, Subject, Term, Triple, TripleMatch};
use oxrdf::vocab::rdf;
use std::fmt;
use std::ops::BitOr;

/// Set of the reification fragments present for a reified node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StmtMask(u8);

impl StmtMask {
    pub const EMPTY: Self = Self(0);
    pub const SUBJECT: Self = Self(0b0001);
    pub const PREDICATE: Self = Self(0b0010);
    pub const OBJECT: Self = Self(0b0100);
    pub const TYPE: Self = Self(0b1000);
    /// Subject, predicate, object and type: a complete statement.
    pub const SPOT: Self = Self(0b1111);

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn is_spot(self) -> bool {
        self == Self::SPOT
    }

    #[inline]
    pub fn has_type(self) -> bool {
        self.contains(Self::TYPE)
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Adds the bits of `other`. Bits are never removed.
    #[inline]
    pub fn merge(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for StmtMask {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for StmtMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, c) in [
            (Self::SUBJECT, 'S'),
            (Self::PREDICATE, 'P'),
            (Self::OBJECT, 'O'),
            (Self::TYPE, 'T'),
        ] {
            if self.contains(bit) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// The four reification properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FragmentKind {
    Subject,
    Predicate,
    Object,
    Type,
}

impl FragmentKind {
    pub const ALL: [Self; 4] = [Self::Subject, Self::Predicate, Self::Object, Self::Type];

    /// The kind denoted by a predicate. `rdf:type` is only a fragment with `rdf:Statement` as object.
    pub fn from_predicate(predicate: NamedNodeRef<'_>) -> Option<Self> {
        if predicate == rdf::SUBJECT {
            Some(Self::Subject)
        } else if predicate == rdf::PREDICATE {
            Some(Self::Predicate)
        } else if predicate == rdf::OBJECT {
            Some(Self::Object)
        } else if predicate == rdf::TYPE {
            Some(Self::Type)
        } else {
            None
        }
    }

    #[inline]
    pub fn predicate(self) -> NamedNodeRef<'static> {
        match self {
            Self::Subject => rdf::SUBJECT,
            Self::Predicate => rdf::PREDICATE,
            Self::Object => rdf::OBJECT,
            Self::Type => rdf::TYPE,
        }
    }

    #[inline]
    pub fn mask(self) -> StmtMask {
        match self {
            Self::Subject => StmtMask::SUBJECT,
            Self::Predicate => StmtMask::PREDICATE,
            Self::Object => StmtMask::OBJECT,
            Self::Type => StmtMask::TYPE,
        }
    }

    /// The reification table column holding the fragment value.
    #[inline]
    pub fn column(self) -> Column {
        match self {
            Self::Subject => Column::Subject,
            Self::Predicate => Column::Predicate,
            Self::Object => Column::Object,
            Self::Type => Column::Type,
        }
    }
}

/// One reification fragment of a node: the object of one of its reification triples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fragment {
    Subject(Term),
    Predicate(Term),
    Object(Term),
    /// `rdf:type rdf:Statement`
    Type,
}

impl Fragment {
    /// Splits a reification triple into its reified node and fragment.
    pub fn from_triple(triple: &Triple) -> Option<(Subject, Self)> {
        let fragment = match FragmentKind::from_predicate(triple.predicate.as_ref())? {
            FragmentKind::Subject => Self::Subject(triple.object.clone()),
            FragmentKind::Predicate => Self::Predicate(triple.object.clone()),
            FragmentKind::Object => Self::Object(triple.object.clone()),
            FragmentKind::Type => {
                if !is_statement_class(&triple.object) {
                    return None;
                }
                Self::Type
            }
        };
        Some((triple.subject.clone(), fragment))
    }

    /// The four fragments reifying `triple`.
    pub fn of_statement(triple: &Triple) -> [Self; 4] {
        [
            Self::Subject(triple.subject.clone().into()),
            Self::Predicate(triple.predicate.clone().into()),
            Self::Object(triple.object.clone()),
            Self::Type,
        ]
    }

    #[inline]
    pub fn kind(&self) -> FragmentKind {
        match self {
            Self::Subject(_) => FragmentKind::Subject,
            Self::Predicate(_) => FragmentKind::Predicate,
            Self::Object(_) => FragmentKind::Object,
            Self::Type => FragmentKind::Type,
        }
    }

    #[inline]
    pub fn mask(&self) -> StmtMask {
        self.kind().mask()
    }

    /// The stored value, `None` for the type fragment that is a flag.
    #[inline]
    pub fn value(&self) -> Option<&Term> {
        match self {
            Self::Subject(v) | Self::Predicate(v) | Self::Object(v) => Some(v),
            Self::Type => None,
        }
    }

    /// The reification triple of `node` this fragment stands for.
    pub fn to_triple(&self, node: &Subject) -> Triple {
        let object = match self {
            Self::Subject(v) | Self::Predicate(v) | Self::Object(v) => v.clone(),
            Self::Type => rdf::STATEMENT.into_owned().into(),
        };
        Triple::new(node.clone(), self.kind().predicate().into_owned(), object)
    }
}

/// What a pattern may match from the reification vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FragmentPattern {
    /// Only reification fragments can match.
    Fragment(FragmentKind),
    /// Both fragments and plain triples can match.
    Mixed,
    /// No reification fragment can match.
    Plain,
}

impl FragmentPattern {
    pub(crate) fn of(pattern: &TripleMatch) -> Self {
        let Some(predicate) = &pattern.predicate else {
            return Self::Mixed;
        };
        let Term::NamedNode(predicate) = predicate else {
            return Self::Plain;
        };
        match FragmentKind::from_predicate(predicate.as_ref()) {
            Some(FragmentKind::Type) => match &pattern.object {
                None => Self::Mixed,
                Some(object) if is_statement_class(object) => Self::Fragment(FragmentKind::Type),
                Some(_) => Self::Plain,
            },
            Some(kind) => Self::Fragment(kind),
            None => Self::Plain,
        }
    }
}

pub(crate) fn is_statement_class(term: &Term) -> bool {
    matches!(term, Term::NamedNode(n) if n.as_ref() == rdf::STATEMENT)
}
